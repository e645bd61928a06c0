//! Error types for the `ffvmaf` crate.
//!
//! This module defines [`VmafError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context (file paths,
//! frame indices, upstream messages) to diagnose a failed run, and each one
//! maps onto the integer [`CompletionStatus`] handed back to callers.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::status::CompletionStatus;

/// The unified error type for all `ffvmaf` operations.
///
/// Every public method that can fail returns `Result<T, VmafError>`.
/// Use [`status`](VmafError::status) to obtain the completion code for a
/// failed computation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VmafError {
    /// The media input could not be opened or its stream info could not be read.
    #[error("Failed to open media input {path}: {reason}")]
    FileOpen {
        /// Path passed to [`MediaSource::open`](crate::MediaSource::open), or
        /// `<memory>` for in-memory inputs.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The input does not contain a decodable video stream.
    #[error("No decodable video stream found in {0}")]
    NoVideoStream(PathBuf),

    /// The selected video stream does not declare usable dimensions.
    #[error("Video stream in {path} has unusable dimensions {width}x{height}")]
    InvalidDimensions {
        /// Input the stream belongs to.
        path: PathBuf,
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },

    /// Neither stream declares a frame rate and duration that yield frames.
    #[error("Inputs have no frames in common (reference ~{reference} frames, test ~{test} frames)")]
    NoCommonFrames {
        /// Estimated reference frame count.
        reference: u64,
        /// Estimated test frame count.
        test: u64,
    },

    /// Both streams declared frames but ended before the first pair.
    #[error("Neither input produced a frame (reference ~{reference} frames, test ~{test} frames declared)")]
    NoFramesDecoded {
        /// Estimated reference frame count.
        reference: u64,
        /// Estimated test frame count.
        test: u64,
    },

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// A decode, scaling, or frame buffer could not be allocated.
    #[error("Failed to allocate {0}")]
    ResourceAllocation(String),

    /// A frame could not be rescaled.
    #[error("Failed to scale frame: {0}")]
    ScaleError(String),

    /// Neither a model nor a model collection could be parsed from the buffer.
    #[error("Failed to load scoring model: {0}")]
    ModelLoad(String),

    /// The feature extractors required by the model could not be registered.
    #[error("Failed to register feature extractors: {0}")]
    FeatureRegistration(String),

    /// A normalized frame could not be copied into a scoring picture.
    #[error("Failed to copy picture data: {0}")]
    PictureCopy(String),

    /// A picture pair could not be ingested by the scoring engine.
    #[error("Failed to read pictures at index {index}: {reason}")]
    PictureRead {
        /// Index the pair was submitted at.
        index: u32,
        /// Underlying reason.
        reason: String,
    },

    /// A picture pair was submitted out of order.
    #[error("Picture pair submitted at index {got}, expected index {expected}")]
    OutOfOrder {
        /// The next dense index the session expects.
        expected: u32,
        /// The index that was submitted.
        got: u32,
    },

    /// A per-frame score was requested before its lookahead window was ingested.
    #[error("Score for index {index} is not ready ({ingested} pairs ingested, lag {lag})")]
    ScoreNotReady {
        /// Requested index.
        index: u32,
        /// Number of pairs ingested so far.
        ingested: u32,
        /// Scoring lag of the session.
        lag: u32,
    },

    /// The engine failed to produce a score for an index.
    #[error("Failed to compute score at index {index}: {reason}")]
    ScoreAtIndex {
        /// Requested index.
        index: u32,
        /// Underlying reason.
        reason: String,
    },

    /// Signalling end-of-stream to the scoring engine failed.
    #[error("Failed to flush scoring session: {0}")]
    Flush(String),

    /// The pooled score could not be computed.
    #[error("Failed to compute pooled score: {0}")]
    Pool(String),

    /// The progress buffer cannot hold the slots the run needs.
    #[error("Progress buffer has {capacity} slots, {required} are required")]
    ProgressBufferTooSmall {
        /// Slots available.
        capacity: usize,
        /// Slots required by the layout and frame count.
        required: usize,
    },

    /// A progress slot outside the buffer was addressed.
    #[error("Progress slot {slot} is out of range (buffer has {capacity} slots)")]
    ProgressSlotOutOfRange {
        /// Slot index that was addressed.
        slot: usize,
        /// Slots available.
        capacity: usize,
    },

    /// The computation was cancelled through the progress channel.
    #[error("Computation cancelled after {frames_processed} frame pairs")]
    Cancelled {
        /// Frame pairs processed before the request was observed.
        frames_processed: u32,
    },

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading inputs or writing outputs.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while exporting a preview.
    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl VmafError {
    /// The completion status a caller receives for this error.
    pub fn status(&self) -> CompletionStatus {
        match self {
            VmafError::FileOpen { .. }
            | VmafError::NoVideoStream(_)
            | VmafError::InvalidDimensions { .. }
            | VmafError::NoCommonFrames { .. }
            | VmafError::NoFramesDecoded { .. }
            | VmafError::IoError(_) => CompletionStatus::InputVideoError,
            VmafError::VideoDecodeError(_) => CompletionStatus::DecodeError,
            VmafError::ResourceAllocation(_)
            | VmafError::ScaleError(_)
            | VmafError::FfmpegError(_)
            | VmafError::ImageError(_) => CompletionStatus::ResourceError,
            VmafError::ModelLoad(_) | VmafError::FeatureRegistration(_) => {
                CompletionStatus::ModelError
            }
            VmafError::PictureCopy(_) => CompletionStatus::CopyError,
            VmafError::PictureRead { .. } | VmafError::OutOfOrder { .. } => {
                CompletionStatus::ReadError
            }
            VmafError::ScoreNotReady { .. } | VmafError::ScoreAtIndex { .. } => {
                CompletionStatus::IndexError
            }
            VmafError::Flush(_) => CompletionStatus::FlushError,
            VmafError::Pool(_) => CompletionStatus::PoolError,
            VmafError::ProgressBufferTooSmall { .. } | VmafError::ProgressSlotOutOfRange { .. } => {
                CompletionStatus::OutputBufferError
            }
            VmafError::Cancelled { .. } => CompletionStatus::Cancelled,
        }
    }
}

impl From<FfmpegError> for VmafError {
    fn from(error: FfmpegError) -> Self {
        VmafError::FfmpegError(error.to_string())
    }
}
