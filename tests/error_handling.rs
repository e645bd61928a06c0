//! Error handling integration tests.
//!
//! These tests verify that every error maps onto the completion code a
//! caller receives, and that messages carry enough context to act on.

use std::path::PathBuf;

use ffvmaf::{CompletionStatus, VmafError};

#[test]
fn input_errors_map_to_input_video_error() {
    let errors = [
        VmafError::FileOpen {
            path: PathBuf::from("a.mp4"),
            reason: "No such file or directory".to_string(),
        },
        VmafError::NoVideoStream(PathBuf::from("audio.m4a")),
        VmafError::InvalidDimensions {
            path: PathBuf::from("b.mp4"),
            width: 0,
            height: 0,
        },
        VmafError::NoCommonFrames {
            reference: 0,
            test: 30,
        },
        VmafError::NoFramesDecoded {
            reference: 30,
            test: 30,
        },
    ];
    for error in errors {
        assert_eq!(error.status(), CompletionStatus::InputVideoError, "{error}");
    }
}

#[test]
fn scoring_errors_have_distinct_codes() {
    let cases = [
        (VmafError::PictureCopy("x".to_string()), CompletionStatus::CopyError),
        (
            VmafError::OutOfOrder {
                expected: 3,
                got: 5,
            },
            CompletionStatus::ReadError,
        ),
        (
            VmafError::ScoreAtIndex {
                index: 1,
                reason: "x".to_string(),
            },
            CompletionStatus::IndexError,
        ),
        (VmafError::Flush("x".to_string()), CompletionStatus::FlushError),
        (VmafError::Pool("x".to_string()), CompletionStatus::PoolError),
        (
            VmafError::VideoDecodeError("x".to_string()),
            CompletionStatus::DecodeError,
        ),
        (
            VmafError::ResourceAllocation("x".to_string()),
            CompletionStatus::ResourceError,
        ),
        (VmafError::ModelLoad("x".to_string()), CompletionStatus::ModelError),
        (
            VmafError::ProgressBufferTooSmall {
                capacity: 4,
                required: 10,
            },
            CompletionStatus::OutputBufferError,
        ),
        (
            VmafError::Cancelled {
                frames_processed: 7,
            },
            CompletionStatus::Cancelled,
        ),
    ];
    for (error, status) in cases {
        assert_eq!(error.status(), status, "{error}");
    }
}

#[test]
fn codes_are_stable() {
    assert_eq!(CompletionStatus::Success.code(), 0);
    assert_eq!(CompletionStatus::InputVideoError.code(), 1);
    assert_eq!(CompletionStatus::Cancelled.code(), 2);
    assert_eq!(CompletionStatus::PoolError.code(), 7);
    assert_eq!(CompletionStatus::OutputBufferError.code(), 11);
}

#[test]
fn codes_round_trip() {
    for code in 0..=11 {
        let status = CompletionStatus::from_code(code).expect("Known code");
        assert_eq!(status.code(), code);
    }
    assert_eq!(CompletionStatus::from_code(12), None);
    assert_eq!(CompletionStatus::from_code(-1), None);
}

#[test]
fn only_success_is_success() {
    assert!(CompletionStatus::Success.is_success());
    assert!(!CompletionStatus::Cancelled.is_success());
}

#[test]
fn status_display_includes_code() {
    assert_eq!(CompletionStatus::Cancelled.to_string(), "cancelled (2)");
    assert_eq!(CompletionStatus::Success.to_string(), "success (0)");
}

#[test]
fn messages_carry_context() {
    let message = VmafError::ScoreNotReady {
        index: 4,
        ingested: 5,
        lag: 2,
    }
    .to_string();
    assert!(message.contains("index 4"), "{message}");
    assert!(message.contains("lag 2"), "{message}");

    let message = VmafError::ProgressBufferTooSmall {
        capacity: 8,
        required: 17,
    }
    .to_string();
    assert!(message.contains("8 slots"), "{message}");
    assert!(message.contains("17"), "{message}");
}

#[test]
fn io_errors_convert() {
    let error: VmafError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(error, VmafError::IoError(_)));
    assert_eq!(error.status(), CompletionStatus::InputVideoError);
}
