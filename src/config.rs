//! Pipeline configuration.
//!
//! [`PipelineConfig`] is a builder that threads geometry, scoring, and
//! progress settings through [`VmafPipeline`](crate::VmafPipeline) without
//! widening every signature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ffvmaf::{PipelineConfig, PoolMethod, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} / {} frame pairs", info.frames_processed, info.frames_to_process);
//!     }
//! }
//!
//! let config = PipelineConfig::new()
//!     .with_score_lag(5)
//!     .with_pool_method(PoolMethod::HarmonicMean)
//!     .with_progress(Arc::new(LogProgress))
//!     .with_batch_size(10);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use ffmpeg_next::format::Pixel;
use serde::{Deserialize, Serialize};

use crate::progress::{NoOpProgress, ProgressCallback};

/// Default canonical comparison width.
pub const CANONICAL_WIDTH: u32 = 1920;
/// Default canonical comparison height.
pub const CANONICAL_HEIGHT: u32 = 1080;
/// Default hard ceiling on processed frame pairs.
pub const DEFAULT_MAX_FRAMES: u32 = 100_000;
/// Default number of processed frames between throughput measurements.
pub const DEFAULT_THROUGHPUT_INTERVAL: u32 = 5;

/// Pixel format of preview frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit interleaved RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit interleaved RGBA with alpha set to 255 (32 bpp).
    Rgba8,
    /// 8-bit grayscale (8 bpp).
    Gray8,
}

impl PixelFormat {
    /// Map to the corresponding FFmpeg pixel format constant.
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Rgba8 => Pixel::RGBA,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }

    /// Bytes per pixel of the packed layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A frame geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a resolution.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(CANONICAL_WIDTH, CANONICAL_HEIGHT)
    }
}

/// Geometry and format of the extrema preview frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Preview width in pixels.
    pub width: u32,
    /// Preview height in pixels.
    pub height: u32,
    /// Packed pixel format of preview buffers.
    pub pixel_format: PixelFormat,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 270,
            pixel_format: PixelFormat::Rgb8,
        }
    }
}

impl PreviewConfig {
    /// Size in bytes of one packed preview buffer.
    pub fn buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel()
    }
}

/// How per-frame scores are summarised into one pooled score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMethod {
    /// Arithmetic mean. This is the default.
    #[default]
    Mean,
    /// Harmonic mean of `score + 1`, minus one; penalises low outliers.
    HarmonicMean,
    /// Lowest per-frame score.
    Min,
    /// Highest per-frame score.
    Max,
}

impl PoolMethod {
    /// Pool `scores`. Returns `None` for an empty slice.
    pub fn pool(self, scores: &[f64]) -> Option<f64> {
        if scores.is_empty() {
            return None;
        }
        let count = scores.len() as f64;
        let pooled = match self {
            PoolMethod::Mean => scores.iter().sum::<f64>() / count,
            PoolMethod::HarmonicMean => {
                count / scores.iter().map(|score| 1.0 / (score + 1.0)).sum::<f64>() - 1.0
            }
            PoolMethod::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
            PoolMethod::Max => scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(pooled)
    }

    /// Parse a method name (`mean`, `harmonic_mean`, `min`, `max`).
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "mean" => PoolMethod::Mean,
            "harmonic_mean" | "harmonic" => PoolMethod::HarmonicMean,
            "min" => PoolMethod::Min,
            "max" => PoolMethod::Max,
            _ => return None,
        };
        Some(method)
    }
}

/// Configuration for a scoring run.
///
/// All fields have defaults matching the fixed behaviour of the pipeline:
/// 1920×1080 canonical frames, the engine's own scoring lag, at most
/// 100 000 frame pairs, a throughput measurement every 5 frames, and a
/// cancellation poll on every iteration.
#[derive(Clone)]
pub struct PipelineConfig {
    pub(crate) canonical: Resolution,
    pub(crate) preview: PreviewConfig,
    pub(crate) score_lag: Option<u32>,
    pub(crate) max_frames: u32,
    pub(crate) throughput_interval: u32,
    pub(crate) cancellation_poll_interval: u32,
    pub(crate) pool_method: PoolMethod,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u32,
}

impl Debug for PipelineConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineConfig")
            .field("canonical", &self.canonical)
            .field("preview", &self.preview)
            .field("score_lag", &self.score_lag)
            .field("max_frames", &self.max_frames)
            .field("throughput_interval", &self.throughput_interval)
            .field("cancellation_poll_interval", &self.cancellation_poll_interval)
            .field("pool_method", &self.pool_method)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            canonical: Resolution::default(),
            preview: PreviewConfig::default(),
            score_lag: None,
            max_frames: DEFAULT_MAX_FRAMES,
            throughput_interval: DEFAULT_THROUGHPUT_INTERVAL,
            cancellation_poll_interval: 1,
            pool_method: PoolMethod::Mean,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Set the canonical comparison resolution. Both streams are rescaled to
    /// it (8-bit planar 4:2:0) before scoring.
    #[must_use]
    pub fn with_canonical_resolution(mut self, width: u32, height: u32) -> Self {
        self.canonical = Resolution::new(width.max(2), height.max(2));
        self
    }

    /// Set the preview geometry and pixel format.
    #[must_use]
    pub fn with_preview(mut self, preview: PreviewConfig) -> Self {
        self.preview = PreviewConfig {
            width: preview.width.max(1),
            height: preview.height.max(1),
            pixel_format: preview.pixel_format,
        };
        self
    }

    /// Request a scoring lag of `lag` frames.
    ///
    /// A score for index *i* is queried only once index *i + lag* has been
    /// ingested. Values below the engine's lookahead are raised to it.
    #[must_use]
    pub fn with_score_lag(mut self, lag: u32) -> Self {
        self.score_lag = Some(lag);
        self
    }

    /// Cap the number of processed frame pairs. Clamped to at least 1.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u32) -> Self {
        self.max_frames = max_frames.max(1);
        self
    }

    /// Measure throughput every `interval` processed frames. Clamped to at least 1.
    #[must_use]
    pub fn with_throughput_interval(mut self, interval: u32) -> Self {
        self.throughput_interval = interval.max(1);
        self
    }

    /// Poll the cancellation slot every `interval` iterations.
    ///
    /// This is the worst-case cancellation latency in frame pairs. Clamped
    /// to at least 1.
    #[must_use]
    pub fn with_cancellation_poll_interval(mut self, interval: u32) -> Self {
        self.cancellation_poll_interval = interval.max(1);
        self
    }

    /// Set how per-frame scores are pooled.
    #[must_use]
    pub fn with_pool_method(mut self, method: PoolMethod) -> Self {
        self.pool_method = method;
        self
    }

    /// Attach a progress callback, fired every
    /// [`batch_size`](PipelineConfig::with_batch_size) processed frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Canonical comparison resolution.
    pub fn canonical_resolution(&self) -> Resolution {
        self.canonical
    }

    /// Preview settings.
    pub fn preview(&self) -> PreviewConfig {
        self.preview
    }

    /// Pooling method.
    pub fn pool_method(&self) -> PoolMethod {
        self.pool_method
    }

    /// Frame-pair ceiling.
    pub fn max_frames(&self) -> u32 {
        self.max_frames
    }
}
