//! # ffvmaf
//!
//! Frame-synchronized perceptual quality scoring of a test video against a
//! reference video.
//!
//! `ffvmaf` decodes both inputs in lockstep with FFmpeg (via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate), normalizes
//! every frame to a common canonical format, and streams frame pairs into a
//! windowed scoring engine. Per-frame scores, progress, and the final pooled
//! score are published through a shared [`ProgressChannel`] that a caller can
//! poll and use to cancel the run.
//!
//! ## Quick Start
//!
//! ### Score two files
//!
//! ```no_run
//! use ffvmaf::{ModelConfig, PipelineConfig, ProgressChannel, ProgressLayout, compute_scores};
//!
//! let channel = ProgressChannel::new(4096, ProgressLayout::default());
//! let status = compute_scores(
//!     ffvmaf::DEFAULT_MODEL.as_bytes(),
//!     &ModelConfig::new(),
//!     "reference.mp4",
//!     "distorted.mp4",
//!     &PipelineConfig::new(),
//!     &channel,
//!     None,
//! );
//! println!("finished with {status}");
//! ```
//!
//! ### Drive the pipeline yourself
//!
//! ```no_run
//! use ffvmaf::{
//!     MediaSource, ModelConfig, PipelineConfig, ProgressChannel, ProgressLayout,
//!     ScoringSession, VmafPipeline,
//! };
//!
//! let mut session =
//!     ScoringSession::from_model_bytes(ffvmaf::DEFAULT_MODEL.as_bytes(), &ModelConfig::new())?;
//! let reference = MediaSource::open("reference.mp4")?;
//! let test = MediaSource::from_bytes(std::fs::read("distorted.mp4")?)?;
//! let channel = ProgressChannel::new(4096, ProgressLayout::default());
//!
//! let report = VmafPipeline::new(PipelineConfig::new().with_score_lag(5))
//!     .run(&mut session, reference, test, &channel, None)?;
//! for (index, score) in report.scores.iter().enumerate() {
//!     println!("{index}: {score:.3}");
//! }
//! # Ok::<(), ffvmaf::VmafError>(())
//! ```
//!
//! ## Features
//!
//! - **Lockstep decoding** of the first decodable video stream of each
//!   input, from a file or an in-memory buffer
//! - **Canonical normalization** to 8-bit planar 4:2:0 at a configurable
//!   resolution (1920×1080 by default), zero-copy when already canonical
//! - **Lagged scoring** with a configurable lag and tail scoring after flush
//! - **Extrema previews** of the best and worst frame pairs (RGB8, RGBA8, GRAY8)
//! - **Shared progress buffer** with two slot layouts and cooperative
//!   cancellation
//! - **Model loading** from a single model or a model collection, with an
//!   optional score transform
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Computes per-plane features on the rayon thread pool |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod config;
mod conversion;
pub mod engine;
pub mod error;
pub mod extrema;
pub mod features;
pub mod ffmpeg;
mod memory_input;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "rayon")]
mod rayon;
pub mod scoring;
pub mod source;
pub mod status;

pub use config::{PipelineConfig, PixelFormat, PoolMethod, PreviewConfig, Resolution};
pub use engine::{FeatureEngine, ScoringEngine};
pub use error::VmafError;
pub use extrema::{ExtremaSnapshot, ExtremaTracker, ExtremaUpdate, ScoreRecord};
pub use features::Picture;
pub use ffmpeg::{parse_ffmpeg_log_level, set_ffmpeg_log_level};
pub use model::{
    BoundModel, DEFAULT_MODEL, Feature, Model, ModelCollection, ModelConfig, ScoreRange,
    Transform, WeightedFeature, load_model,
};
pub use normalize::{CANONICAL_PIXEL_FORMAT, FrameNormalizer, PreviewBuffers, PreviewFrame};
pub use pipeline::{
    PipelineReport, StreamEnd, StreamSide, Termination, VmafPipeline, compute_scores,
};
pub use progress::{
    CANCEL_SENTINEL, ProgressCallback, ProgressChannel, ProgressInfo, ProgressLayout,
    frames_per_second,
};
pub use scoring::ScoringSession;
pub use source::{FrameSource, MediaSource, StreamInfo};
pub use status::CompletionStatus;
