//! Session-level behaviour on synthetic engines: ordering, memory bound,
//! cancellation, limits, topology fallback and the hybrid handshake.

mod common;

use common::*;
use edgequake_pdfshrink::pipeline::orchestrator::{drive_pages, open_document, LocalSink};
use edgequake_pdfshrink::pipeline::assemble::{DocumentBuilder, LopdfBuilder};
use edgequake_pdfshrink::pipeline::encode::JpegPageEncoder;
use edgequake_pdfshrink::pipeline::render::RenderBackend;
use edgequake_pdfshrink::protocol::Event;
use edgequake_pdfshrink::{
    progress, CancellationToken, ConversionConfig, ConversionOptions, InputFile, Limits, Outcome,
    Progress, Session, SessionState, ShrinkError, Topology, TopologyPreference,
};
use futures::StreamExt;
use lopdf::{Document, Object};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn config(topology: TopologyPreference) -> ConversionConfig {
    ConversionConfig::builder()
        .topology(topology)
        .ack_timeout_secs(5)
        .build()
        .unwrap()
}

fn thread_session(probe: &Arc<Probe>, topology: TopologyPreference) -> Session {
    let spawner = Arc::new(CountingThreadSpawner {
        probe: probe.clone(),
    });
    Session::new(engines(probe, spawner), config(topology))
}

const ALL_TOPOLOGIES: [TopologyPreference; 3] = [
    TopologyPreference::FullBackground,
    TopologyPreference::Hybrid,
    TopologyPreference::MainThread,
];

/// Run one conversion and collect its progress events.
async fn run(
    session: &mut Session,
    input: &InputFile,
    options: &ConversionOptions,
    cancel: &CancellationToken,
) -> (Outcome, Vec<Progress>) {
    let (reporter, events) = progress::channel();
    let outcome = session.convert(input, options, cancel, reporter).await;
    let seen = events.collect().await;
    (outcome, seen)
}

fn media_boxes(bytes: &[u8]) -> Vec<Vec<f32>> {
    let doc = Document::load_mem(bytes).expect("output must be a valid PDF");
    doc.get_pages()
        .values()
        .map(|&id| {
            doc.get_object(id)
                .and_then(Object::as_dict)
                .and_then(|d| d.get(b"MediaBox"))
                .and_then(Object::as_array)
                .expect("page has a MediaBox")
                .iter()
                .map(|o| o.as_float().expect("numeric MediaBox"))
                .collect()
        })
        .collect()
}

// ── Progress ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_counts_every_page_once_in_order() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let mut session = thread_session(&probe, topology);
        let (outcome, seen) = run(
            &mut session,
            &synthetic_input("five.pdf", 5),
            &ConversionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.is_done(), "{topology:?}: {outcome:?}");
        let expected: Vec<_> = (1..=5).map(|current| Progress { current, total: 5 }).collect();
        assert_eq!(seen, expected, "{topology:?}");
    }
}

#[tokio::test]
async fn progress_is_emitted_before_the_page_renders() {
    let probe = Probe::new();
    let backend = SyntheticBackend {
        probe: probe.clone(),
        background: true,
    };
    let engine = backend.engine().unwrap();
    let bytes = synthetic_pdf(3);
    let mut source = open_document(engine.as_ref(), &bytes, &Limits::default()).unwrap();
    let mut sink = LocalSink::new(LopdfBuilder.begin().unwrap());

    let pages = drive_pages(
        source.as_mut(),
        &JpegPageEncoder,
        &ConversionOptions::default(),
        &CancellationToken::new(),
        |p| probe.push(format!("progress {}", p.current)),
        &mut sink,
    )
    .await
    .unwrap();

    assert_eq!(pages, 3);
    assert_eq!(sink.page_count(), 3);
    assert_eq!(
        probe.log(),
        vec!["progress 1", "render 0", "progress 2", "render 1", "progress 3", "render 2"]
    );
}

// ── Memory bound ─────────────────────────────────────────────────────────

#[tokio::test]
async fn at_most_one_page_buffer_is_alive() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let mut session = thread_session(&probe, topology);
        let (outcome, _) = run(
            &mut session,
            &synthetic_input("eight.pdf", 8),
            &ConversionOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.is_done(), "{topology:?}: {outcome:?}");
        assert_eq!(probe.max_live_pixels.load(Ordering::SeqCst), 1, "{topology:?}");
        assert_eq!(probe.max_unappended.load(Ordering::SeqCst), 1, "{topology:?}");

        // render → encode → append, page by page.
        let expected: Vec<String> = (0..8)
            .flat_map(|i| [format!("render {i}"), format!("encode {i}"), format!("append {i}")])
            .collect();
        assert_eq!(probe.log(), expected, "{topology:?}");
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn abort_before_start_yields_aborted_without_work() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let mut session = thread_session(&probe, topology);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (outcome, seen) = run(
            &mut session,
            &synthetic_input("doc.pdf", 4),
            &ConversionOptions::default(),
            &cancel,
        )
        .await;

        assert!(outcome.is_aborted(), "{topology:?}: {outcome:?}");
        assert!(seen.is_empty(), "{topology:?}");
        assert_eq!(probe.count("render"), 0, "{topology:?}");
        assert_eq!(probe.finished.load(Ordering::SeqCst), 0, "{topology:?}");
        assert_eq!(session.state(), SessionState::Aborted);
    }
}

#[tokio::test]
async fn abort_mid_stream_discards_partial_document() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let mut session = thread_session(&probe, topology);
        let cancel = CancellationToken::new();
        *probe.cancel_after.lock().unwrap() = Some((1, cancel.clone()));

        let (outcome, seen) = run(
            &mut session,
            &synthetic_input("doc.pdf", 6),
            &ConversionOptions::default(),
            &cancel,
        )
        .await;

        assert!(outcome.is_aborted(), "{topology:?}: {outcome:?}");
        // Page 2's render finishes, its append does not happen, page 3 never starts.
        assert_eq!(seen.last().map(|p| p.current), Some(2), "{topology:?}");
        assert_eq!(probe.count("render"), 2, "{topology:?}");
        assert_eq!(probe.count("append"), 1, "{topology:?}");
        assert_eq!(probe.finished.load(Ordering::SeqCst), 0, "{topology:?}");
    }
}

#[tokio::test]
async fn session_is_reusable_after_abort() {
    let probe = Probe::new();
    let mut session = thread_session(&probe, TopologyPreference::Hybrid);
    let cancel = CancellationToken::new();
    *probe.cancel_after.lock().unwrap() = Some((0, cancel.clone()));
    let (first, _) = run(
        &mut session,
        &synthetic_input("a.pdf", 3),
        &ConversionOptions::default(),
        &cancel,
    )
    .await;
    assert!(first.is_aborted());

    *probe.cancel_after.lock().unwrap() = None;
    let (second, seen) = run(
        &mut session,
        &synthetic_input("b.pdf", 2),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    let artifact = second.into_result().unwrap();
    assert_eq!(artifact.page_count(), 2);
    assert_eq!(seen.len(), 2);
    assert_eq!(session.state(), SessionState::Completed);
}

// ── Limits ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn page_limit_is_inclusive() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let spawner = Arc::new(CountingThreadSpawner {
            probe: probe.clone(),
        });
        let config = ConversionConfig::builder()
            .topology(topology)
            .max_page_count(4)
            .warn_page_count(2)
            .build()
            .unwrap();
        let mut session = Session::new(engines(&probe, spawner), config);

        let (at_limit, _) = run(
            &mut session,
            &synthetic_input("four.pdf", 4),
            &ConversionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(at_limit.into_result().unwrap().page_count(), 4, "{topology:?}");

        let renders_before = probe.count("render");
        let (over, seen) = run(
            &mut session,
            &synthetic_input("five.pdf", 5),
            &ConversionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        match over {
            Outcome::Failed(ShrinkError::PageLimitExceeded { pages: 5, limit: 4 }) => {}
            other => panic!("{topology:?}: expected PageLimitExceeded, got {other:?}"),
        }
        assert!(seen.is_empty(), "{topology:?}: no progress before the limit check");
        assert_eq!(probe.count("render"), renders_before, "{topology:?}");
    }
}

#[tokio::test]
async fn non_pdf_is_rejected_before_any_context_work() {
    let probe = Probe::new();
    let spawner = Arc::new(RecordingSpawner {
        probe: probe.clone(),
        append_delay: Duration::ZERO,
    });
    let mut session = Session::new(engines(&probe, spawner), config(TopologyPreference::Hybrid));
    assert_eq!(session.topology(), Topology::Hybrid);

    let jpeg = InputFile::from_bytes("photo.pdf", vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0]);
    let (outcome, seen) = run(
        &mut session,
        &jpeg,
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(outcome, Outcome::Failed(ShrinkError::NotAPdf { .. })));
    assert!(seen.is_empty());
    tokio::task::yield_now().await;
    assert!(probe.log().is_empty(), "no command may reach the worker: {:?}", probe.log());
    assert_eq!(probe.engines_bound.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn large_file_needs_confirmation_and_caps_scale() {
    let probe = Probe::new();
    let spawner = Arc::new(FailingSpawner {
        probe: probe.clone(),
    });
    let config = ConversionConfig::builder()
        .warn_file_size_mb(0)
        .build()
        .unwrap();
    let mut session = Session::new(engines(&probe, spawner), config);
    let input = synthetic_input("big.pdf", 1);
    let options = ConversionOptions::new(0.5, 3.0).unwrap();

    let (warned, _) = run(&mut session, &input, &options, &CancellationToken::new()).await;
    assert!(matches!(
        warned,
        Outcome::Failed(ShrinkError::FileTooLargeWarning { .. })
    ));
    assert_eq!(probe.count("render"), 0);

    let (done, _) = run(
        &mut session,
        &input,
        &options.confirmed(true),
        &CancellationToken::new(),
    )
    .await;
    assert!(done.is_done());
    assert_eq!(*probe.scales.lock().unwrap(), vec![2.0]);
}

// ── Hybrid handshake ─────────────────────────────────────────────────────

#[tokio::test]
async fn hybrid_waits_for_each_acknowledgment() {
    let probe = Probe::new();
    let spawner = Arc::new(RecordingSpawner {
        probe: probe.clone(),
        append_delay: Duration::from_millis(20),
    });
    let mut session = Session::new(engines(&probe, spawner), config(TopologyPreference::Hybrid));

    let (outcome, _) = run(
        &mut session,
        &synthetic_input("three.pdf", 3),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.into_result().unwrap().page_count(), 3);

    let background: Vec<String> = probe
        .log()
        .into_iter()
        .filter(|e| e.starts_with("bg "))
        .collect();
    assert_eq!(
        background,
        vec![
            "bg recv init",
            "bg recv addPage 0",
            "bg send pageAdded 0",
            "bg recv addPage 1",
            "bg send pageAdded 1",
            "bg recv addPage 2",
            "bg send pageAdded 2",
            "bg recv finish",
        ]
    );
}

#[tokio::test]
async fn unacknowledged_page_times_out_and_worker_is_replaced() {
    let probe = Probe::new();
    let spawner = Arc::new(SilentSpawner {
        probe: probe.clone(),
    });
    let config = ConversionConfig::builder()
        .topology(TopologyPreference::Hybrid)
        .ack_timeout_secs(1)
        .build()
        .unwrap();
    let mut session = Session::new(engines(&probe, spawner), config);
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 1);

    let (outcome, seen) = run(
        &mut session,
        &synthetic_input("two.pdf", 2),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        outcome,
        Outcome::Failed(ShrinkError::WorkerTimeout { secs: 1 })
    ));
    assert_eq!(seen.len(), 1, "page 2 is never started");

    // The next conversion gets a fresh worker.
    let _ = run(
        &mut session,
        &InputFile::from_bytes("x.txt", b"plain".to_vec()),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 1, "validation failures do not respawn");
    let _ = tokio::time::timeout(
        Duration::from_secs(3),
        run(
            &mut session,
            &synthetic_input("one.pdf", 1),
            &ConversionOptions::default(),
            &CancellationToken::new(),
        ),
    )
    .await;
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn background_abort_instead_of_ack_ends_conversion() {
    let probe = Probe::new();
    let spawner = Arc::new(ScriptedSpawner {
        probe: probe.clone(),
        reply_to_add_page: Event::Aborted,
        reply_to_abort: Some(Event::Aborted),
    });
    let mut session = Session::new(engines(&probe, spawner), config(TopologyPreference::Hybrid));

    let (outcome, seen) = run(
        &mut session,
        &synthetic_input("three.pdf", 3),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    assert!(outcome.is_aborted(), "{outcome:?}");
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(seen.len(), 1);

    // Give the fake worker time to log anything else it might receive.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let background: Vec<String> = probe
        .log()
        .into_iter()
        .filter(|e| e.starts_with("bg "))
        .collect();
    // Already settled by the worker: no second `abort`, no `finish`.
    assert_eq!(background, vec!["bg recv init", "bg recv addPage"]);
}

#[tokio::test]
async fn unconfirmed_abort_replaces_worker() {
    let probe = Probe::new();
    let spawner = Arc::new(ScriptedSpawner {
        probe: probe.clone(),
        reply_to_add_page: Event::PageAdded,
        reply_to_abort: None,
    });
    let config = ConversionConfig::builder()
        .topology(TopologyPreference::Hybrid)
        .ack_timeout_secs(1)
        .build()
        .unwrap();
    let mut session = Session::new(engines(&probe, spawner), config);

    let cancel = CancellationToken::new();
    *probe.cancel_after.lock().unwrap() = Some((1, cancel.clone()));
    let (first, _) = run(
        &mut session,
        &synthetic_input("a.pdf", 3),
        &ConversionOptions::default(),
        &cancel,
    )
    .await;
    assert!(first.is_aborted(), "{first:?}");
    assert_eq!(probe.count("bg recv abort"), 1);
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 1);

    *probe.cancel_after.lock().unwrap() = None;
    let (second, _) = run(
        &mut session,
        &synthetic_input("b.pdf", 1),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    assert!(second.is_done(), "{second:?}");
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 2);
}

// ── Round trip & fallback ────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_round_trip_at_scale() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let mut session = thread_session(&probe, topology);
        let options = ConversionOptions::new(0.5, 1.5).unwrap();

        let (outcome, _) = run(
            &mut session,
            &synthetic_input("report.pdf", 3),
            &options,
            &CancellationToken::new(),
        )
        .await;
        let artifact = outcome.into_result().unwrap();

        assert_eq!(artifact.mime(), "application/pdf");
        assert_eq!(artifact.file_name(), "report_compressed.pdf");
        assert_eq!(artifact.page_count(), 3);
        assert_eq!(artifact.topology(), session.topology());

        // 40×30 pt rendered at 1.5 → 60×45 px → back to 40×30 pt.
        let boxes = media_boxes(artifact.bytes());
        assert_eq!(boxes.len(), 3, "{topology:?}");
        for b in boxes {
            assert_eq!(b, vec![0.0, 0.0, PAGE_WIDTH_PT, PAGE_HEIGHT_PT], "{topology:?}");
        }
    }
}

#[tokio::test]
async fn failed_spawn_falls_back_to_main_thread() {
    let probe = Probe::new();
    let spawner = Arc::new(FailingSpawner {
        probe: probe.clone(),
    });
    let mut session = Session::new(engines(&probe, spawner), config(TopologyPreference::Auto));

    // Full background and hybrid were both attempted.
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 2);
    assert_eq!(session.topology(), Topology::MainThread);
    assert!(session.degraded_notice().is_some());

    let (outcome, seen) = run(
        &mut session,
        &synthetic_input("doc.pdf", 3),
        &ConversionOptions::default(),
        &CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.into_result().unwrap().page_count(), 3);
    assert_eq!(seen.iter().map(|p| p.current).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(probe.count("append"), 3);
}

#[tokio::test]
async fn main_surface_renderer_uses_hybrid() {
    let probe = Probe::new();
    let spawner = Arc::new(CountingThreadSpawner {
        probe: probe.clone(),
    });
    let session = Session::new(
        engines_with_background(&probe, spawner, false),
        config(TopologyPreference::Auto),
    );
    assert_eq!(session.topology(), Topology::Hybrid);
    assert!(session.degraded_notice().is_none());
}

#[tokio::test]
async fn explicit_main_thread_is_not_degraded() {
    let probe = Probe::new();
    let spawner = Arc::new(CountingThreadSpawner {
        probe: probe.clone(),
    });
    let session = Session::new(engines(&probe, spawner), config(TopologyPreference::MainThread));
    assert_eq!(session.topology(), Topology::MainThread);
    assert!(session.degraded_notice().is_none());
    assert_eq!(probe.spawns.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreadable_document_fails_in_every_topology() {
    for topology in ALL_TOPOLOGIES {
        let probe = Probe::new();
        let mut session = thread_session(&probe, topology);
        let broken = InputFile::from_bytes("broken.pdf", b"%PDF-1.7\ngarbage".to_vec());
        let (outcome, _) = run(
            &mut session,
            &broken,
            &ConversionOptions::default(),
            &CancellationToken::new(),
        )
        .await;
        match outcome {
            Outcome::Failed(ShrinkError::GenericProcessingFailure { message }) => {
                assert!(message.contains("no page tree"), "{topology:?}: {message}")
            }
            other => panic!("{topology:?}: {other:?}"),
        }
    }
}
