//! Configuration types for PDF shrinking.
//!
//! Two structs split the knobs by lifetime:
//!
//! * [`ConversionConfig`] is fixed for a whole [`crate::session::Session`]:
//!   input limits, which execution topology to prefer, and how long the
//!   interactive side waits for a background acknowledgment. Built via
//!   [`ConversionConfigBuilder`].
//! * [`ConversionOptions`] is created once per conversion request and never
//!   mutated: JPEG quality, render scale, and whether the user confirmed the
//!   large-file warning.

use crate::error::ShrinkError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes per megabyte for every size limit in this crate.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Largest render scale applied to a confirmed large file.
pub const LARGE_FILE_MAX_SCALE: f32 = 2.0;

/// Upper bound accepted for [`ConversionOptions::scale`].
pub const MAX_SCALE: f32 = 8.0;

/// Largest size limit, in MB, whose byte count still fits in a `u64`.
pub const MAX_SIZE_LIMIT_MB: u64 = u64::MAX / BYTES_PER_MB;

/// Input ceilings checked before and just after the document is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Hard file-size ceiling in MB. Default: 50.
    pub max_file_size_mb: u64,
    /// Soft file-size ceiling in MB; above it the user must confirm. Default: 30.
    pub warn_file_size_mb: u64,
    /// Hard page-count ceiling. Default: 100.
    pub max_page_count: usize,
    /// Soft page-count threshold; crossing it is only logged. Default: 50.
    pub warn_page_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            warn_file_size_mb: 30,
            max_page_count: 100,
            warn_page_count: 50,
        }
    }
}

impl Limits {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn warn_file_size_bytes(&self) -> u64 {
        self.warn_file_size_mb.saturating_mul(BYTES_PER_MB)
    }
}

/// Which execution topology a session should try first.
///
/// Selection always falls back *down* the list, never up:
/// full background → hybrid → main thread only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyPreference {
    /// Probe capabilities and take the best available topology. (default)
    #[default]
    Auto,
    /// Render and assemble in the background context.
    FullBackground,
    /// Render in the interactive context, assemble in the background.
    Hybrid,
    /// Do everything in the interactive context.
    MainThread,
}

/// Session-level configuration.
///
/// # Example
/// ```rust
/// use edgequake_pdfshrink::{ConversionConfig, TopologyPreference};
///
/// let config = ConversionConfig::builder()
///     .max_page_count(200)
///     .topology(TopologyPreference::Hybrid)
///     .ack_timeout_secs(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.limits.max_page_count, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// File-size and page-count ceilings.
    pub limits: Limits,

    /// Preferred execution topology. Default: [`TopologyPreference::Auto`].
    pub topology: TopologyPreference,

    /// How long the interactive context waits for `pageAdded` in the hybrid
    /// topology before failing with [`ShrinkError::WorkerTimeout`]. Default: 30.
    pub ack_timeout_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            topology: TopologyPreference::default(),
            ack_timeout_secs: 30,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.limits.max_file_size_mb = mb;
        self
    }

    pub fn warn_file_size_mb(mut self, mb: u64) -> Self {
        self.config.limits.warn_file_size_mb = mb;
        self
    }

    pub fn max_page_count(mut self, pages: usize) -> Self {
        self.config.limits.max_page_count = pages;
        self
    }

    pub fn warn_page_count(mut self, pages: usize) -> Self {
        self.config.limits.warn_page_count = pages;
        self
    }

    pub fn topology(mut self, preference: TopologyPreference) -> Self {
        self.config.topology = preference;
        self
    }

    pub fn ack_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ack_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ShrinkError> {
        let l = &self.config.limits;
        if l.max_file_size_mb == 0 {
            return Err(ShrinkError::InvalidConfig(
                "max file size must be ≥ 1 MB".into(),
            ));
        }
        if l.max_file_size_mb > MAX_SIZE_LIMIT_MB {
            return Err(ShrinkError::InvalidConfig(format!(
                "max file size must be ≤ {MAX_SIZE_LIMIT_MB} MB, got {}",
                l.max_file_size_mb
            )));
        }
        if l.warn_file_size_mb > l.max_file_size_mb {
            return Err(ShrinkError::InvalidConfig(format!(
                "warning size ({} MB) exceeds hard limit ({} MB)",
                l.warn_file_size_mb, l.max_file_size_mb
            )));
        }
        if l.max_page_count == 0 {
            return Err(ShrinkError::InvalidConfig(
                "max page count must be ≥ 1".into(),
            ));
        }
        if self.config.ack_timeout_secs == 0 {
            return Err(ShrinkError::InvalidConfig(
                "acknowledgment timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Per-request options. Immutable once created.
///
/// ```rust
/// use edgequake_pdfshrink::ConversionOptions;
///
/// let opts = ConversionOptions::new(0.5, 1.5).unwrap().confirmed(true);
/// assert!(opts.is_confirmed());
/// assert!(ConversionOptions::new(0.0, 1.5).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOptions")]
pub struct ConversionOptions {
    quality: f32,
    scale: f32,
    is_confirmed: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            quality: 0.7,
            scale: 1.5,
            is_confirmed: false,
        }
    }
}

/// Unvalidated wire form; deserialisation goes through [`ConversionOptions::new`].
#[derive(Deserialize)]
struct RawOptions {
    quality: f32,
    scale: f32,
    #[serde(default)]
    is_confirmed: bool,
}

impl TryFrom<RawOptions> for ConversionOptions {
    type Error = ShrinkError;

    fn try_from(raw: RawOptions) -> Result<Self, Self::Error> {
        Ok(Self::new(raw.quality, raw.scale)?.confirmed(raw.is_confirmed))
    }
}

impl ConversionOptions {
    /// Validate and create options.
    ///
    /// `quality` must lie in `(0, 1]`; `scale` in `(0, MAX_SCALE]`.
    pub fn new(quality: f32, scale: f32) -> Result<Self, ShrinkError> {
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(ShrinkError::InvalidConfig(format!(
                "quality must be in (0, 1], got {quality}"
            )));
        }
        if !(scale > 0.0 && scale <= MAX_SCALE) {
            return Err(ShrinkError::InvalidConfig(format!(
                "scale must be in (0, {MAX_SCALE}], got {scale}"
            )));
        }
        Ok(Self {
            quality,
            scale,
            is_confirmed: false,
        })
    }

    /// Return a copy with the large-file confirmation set.
    pub fn confirmed(self, is_confirmed: bool) -> Self {
        Self {
            is_confirmed,
            ..self
        }
    }

    /// Return a copy whose scale is at most `max`.
    pub fn with_scale_capped(self, max: f32) -> Self {
        Self {
            scale: self.scale.min(max),
            ..self
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_confirmed(&self) -> bool {
        self.is_confirmed
    }
}
