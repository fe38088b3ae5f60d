//! CLI binary for edgequake-pdfshrink.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig` / `ConversionOptions`, drives a `Session`, and prints
//! results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfshrink::pipeline::input::default_output_path;
use edgequake_pdfshrink::{
    format_size, inspect, progress, CancellationToken, ConversionConfig, ConversionOptions,
    Engines, InputFile, Outcome, ProgressStream, Session, ShrinkError, TopologyPreference,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Shrink with defaults (quality 0.7, scale 1.5) → report_compressed.pdf
  pdfshrink report.pdf

  # Smaller and blurrier
  pdfshrink --quality 0.4 --scale 1.0 scan.pdf -o scan_small.pdf

  # Large file: skip the confirmation prompt
  pdfshrink --yes big_scan.pdf

  # Page count and size only
  pdfshrink --inspect-only report.pdf

  # Machine-readable summary
  pdfshrink --json report.pdf > summary.json

TOPOLOGIES:
  auto             best available (default)
  full-background  render and assemble on a background worker
  hybrid           render here, assemble on a background worker
  main-thread      do everything on the calling thread

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH  Path to libpdfium (otherwise ./ then the system path)
  RUST_LOG         Override log filtering (e.g. RUST_LOG=edgequake_pdfshrink=debug)
"#;

/// Shrink PDF files by re-rendering every page as a JPEG.
#[derive(Parser, Debug)]
#[command(
    name = "pdfshrink",
    version,
    about = "Shrink PDF files by re-rendering every page as a JPEG",
    long_about = "Rasterise each page of a PDF with pdfium, re-encode it as a JPEG at the \
chosen quality, and assemble the images into a new PDF. Text stops being selectable; \
the file usually gets much smaller.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Output path. Default: `<stem>_compressed.pdf` next to the input.
    #[arg(short, long, env = "PDFSHRINK_OUTPUT")]
    output: Option<PathBuf>,

    /// JPEG quality, (0, 1].
    #[arg(long, env = "PDFSHRINK_QUALITY", default_value_t = 0.7)]
    quality: f32,

    /// Render scale (1.0 = natural page size), (0, 8].
    #[arg(long, env = "PDFSHRINK_SCALE", default_value_t = 1.5)]
    scale: f32,

    /// Proceed with large files without asking.
    #[arg(short, long, env = "PDFSHRINK_YES")]
    yes: bool,

    /// Execution topology.
    #[arg(long, env = "PDFSHRINK_TOPOLOGY", value_enum, default_value = "auto")]
    topology: TopologyArg,

    /// Seconds to wait for the background worker to acknowledge a page.
    #[arg(long, env = "PDFSHRINK_ACK_TIMEOUT", default_value_t = 30)]
    ack_timeout: u64,

    /// Hard page-count limit.
    #[arg(long, env = "PDFSHRINK_MAX_PAGES", default_value_t = 100)]
    max_pages: usize,

    /// Hard file-size limit in MB.
    #[arg(long, env = "PDFSHRINK_MAX_SIZE_MB", default_value_t = 50)]
    max_size_mb: u64,

    /// File size in MB above which confirmation is required.
    #[arg(long, env = "PDFSHRINK_WARN_SIZE_MB", default_value_t = 30)]
    warn_size_mb: u64,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "PDFSHRINK_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSHRINK_NO_PROGRESS")]
    no_progress: bool,

    /// Print page count and size only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSHRINK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSHRINK_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TopologyArg {
    Auto,
    FullBackground,
    Hybrid,
    MainThread,
}

impl From<TopologyArg> for TopologyPreference {
    fn from(v: TopologyArg) -> Self {
        match v {
            TopologyArg::Auto => TopologyPreference::Auto,
            TopologyArg::FullBackground => TopologyPreference::FullBackground,
            TopologyArg::Hybrid => TopologyPreference::Hybrid,
            TopologyArg::MainThread => TopologyPreference::MainThread,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize info")?
            );
        } else {
            println!("File:   {}", info.file_name);
            println!("Type:   {}", info.mime);
            println!("Size:   {}", format_size(info.size));
            println!("Pages:  {}", info.page_count);
        }
        return Ok(());
    }

    let config = ConversionConfig::builder()
        .max_file_size_mb(cli.max_size_mb)
        .warn_file_size_mb(cli.warn_size_mb)
        .max_page_count(cli.max_pages)
        .topology(cli.topology.into())
        .ack_timeout_secs(cli.ack_timeout)
        .build()
        .context("Invalid configuration")?;
    let mut options = ConversionOptions::new(cli.quality, cli.scale)
        .context("Invalid conversion options")?
        .confirmed(cli.yes);

    let input = InputFile::from_path(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    let mut session = Session::new(Engines::pdfium(), config);
    if let Some(notice) = session.degraded_notice() {
        if !cli.quiet {
            eprintln!("{} {}", yellow("⚠"), notice);
        }
    }

    // ── Ctrl-C → cooperative cancel ─────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // ── Run, asking once if the file needs confirmation ─────────────────
    let outcome = loop {
        let (reporter, events) = progress::channel();
        let bar = show_progress.then(new_bar);
        let (outcome, ()) = tokio::join!(
            session.convert(&input, &options, &cancel, reporter),
            drive_bar(events, bar.clone()),
        );
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        match outcome {
            Outcome::Failed(ref e @ ShrinkError::FileTooLargeWarning { .. })
                if !options.is_confirmed() && io::stdin().is_terminal() =>
            {
                if confirm(&e.to_string())? {
                    options = options.confirmed(true);
                    continue;
                }
                eprintln!("{}", dim("Cancelled."));
                return Ok(());
            }
            other => break other,
        }
    };

    let artifact = match outcome {
        Outcome::Done(artifact) => artifact,
        Outcome::Aborted => {
            if !cli.quiet {
                eprintln!("{}", dim("Aborted; no output written."));
            }
            std::process::exit(130);
        }
        Outcome::Failed(e) => return Err(e).context("Compression failed"),
    };

    artifact
        .write_to(&output_path)
        .await
        .context("Failed to write output")?;

    let summary = artifact.summary();
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        let arrow = if summary.reduction_percent >= 0 {
            green("✔")
        } else {
            red("▲")
        };
        eprintln!(
            "{}  {} pages  {} → {}  ({}%)  {}ms  →  {}",
            arrow,
            summary.page_count,
            format_size(summary.original_size),
            format_size(summary.compressed_size),
            summary.reduction_percent,
            summary.duration_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!("   {}", dim(&format!("topology: {}", summary.topology)));
    }

    Ok(())
}

fn new_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix("Preparing");
    bar.set_message("Opening PDF…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Feed progress events into the bar until the conversion drops its reporter.
async fn drive_bar(mut events: ProgressStream, bar: Option<ProgressBar>) {
    let mut activated = false;
    while let Some(p) = events.next().await {
        let Some(bar) = &bar else { continue };
        if !activated {
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {pos:>3}/{len} pages  \
                     ⏱ {elapsed_precise}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            bar.set_length(p.total as u64);
            bar.set_prefix("Shrinking");
            bar.reset_eta();
            activated = true;
        }
        // Progress fires before a page starts, so completed = current - 1.
        bar.set_position(p.current.saturating_sub(1) as u64);
        bar.set_message(format!("page {}", p.current));
    }
}

/// Ask a yes/no question on the terminal.
fn confirm(warning: &str) -> Result<bool> {
    eprintln!("{} {}", yellow("⚠"), warning);
    eprint!("Continue? [y/N] ");
    io::stderr().flush().ok();
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
