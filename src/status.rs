//! Integer completion codes.
//!
//! Callers that do not link against the Rust types (a host runtime polling
//! the progress buffer, a shell script running the CLI) only see one integer
//! per computation. [`CompletionStatus`] is that integer, typed.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// How a computation ended.
///
/// Early termination because one stream ran out of frames is still
/// [`Success`](CompletionStatus::Success); inspect
/// [`PipelineReport::termination`](crate::PipelineReport::termination) to
/// tell it apart from a run that reached its iteration bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CompletionStatus {
    /// Scores were computed and the pooled score was published.
    Success = 0,
    /// An input could not be opened, has no video stream, or unusable stream info.
    InputVideoError = 1,
    /// The caller requested cancellation; no pooled score was published.
    Cancelled = 2,
    /// A normalized frame could not be copied into a scoring picture.
    CopyError = 3,
    /// The scoring engine rejected a picture pair.
    ReadError = 4,
    /// A per-frame score could not be produced.
    IndexError = 5,
    /// Signalling end-of-stream to the scoring engine failed.
    FlushError = 6,
    /// The pooled score could not be computed.
    PoolError = 7,
    /// A frame failed to decode mid-stream.
    DecodeError = 8,
    /// A decoder, scaler, or frame buffer could not be allocated.
    ResourceError = 9,
    /// The scoring model could not be loaded or bound.
    ModelError = 10,
    /// The progress buffer is too small for the run.
    OutputBufferError = 11,
}

impl CompletionStatus {
    /// The integer code handed back to callers.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an integer code back to a status, if it is known.
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => CompletionStatus::Success,
            1 => CompletionStatus::InputVideoError,
            2 => CompletionStatus::Cancelled,
            3 => CompletionStatus::CopyError,
            4 => CompletionStatus::ReadError,
            5 => CompletionStatus::IndexError,
            6 => CompletionStatus::FlushError,
            7 => CompletionStatus::PoolError,
            8 => CompletionStatus::DecodeError,
            9 => CompletionStatus::ResourceError,
            10 => CompletionStatus::ModelError,
            11 => CompletionStatus::OutputBufferError,
            _ => return None,
        };
        Some(status)
    }

    /// Returns `true` for [`CompletionStatus::Success`].
    pub fn is_success(self) -> bool {
        self == CompletionStatus::Success
    }
}

impl Display for CompletionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            CompletionStatus::Success => "success",
            CompletionStatus::InputVideoError => "input video error",
            CompletionStatus::Cancelled => "cancelled",
            CompletionStatus::CopyError => "picture copy error",
            CompletionStatus::ReadError => "picture read error",
            CompletionStatus::IndexError => "score index error",
            CompletionStatus::FlushError => "flush error",
            CompletionStatus::PoolError => "pooling error",
            CompletionStatus::DecodeError => "decode error",
            CompletionStatus::ResourceError => "resource allocation error",
            CompletionStatus::ModelError => "model error",
            CompletionStatus::OutputBufferError => "output buffer error",
        };
        write!(f, "{name} ({})", self.code())
    }
}
