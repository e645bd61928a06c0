//! FFmpeg-backed frame source integration tests.
//!
//! Decoding tests run on short MPEG-4 clips encoded into a temporary
//! directory, so they need no fixture files.

mod common;

use ffmpeg_next::format::Pixel;

use common::{HEIGHT, WIDTH, generated_clip, small_config};
use ffvmaf::{
    CompletionStatus, FrameSource, MediaSource, ModelConfig, ProgressChannel, ProgressLayout,
    ScoringSession, StreamEnd, StreamSide, Termination, VmafError, VmafPipeline,
};

fn default_session() -> ScoringSession {
    ScoringSession::from_model_bytes(ffvmaf::DEFAULT_MODEL.as_bytes(), &ModelConfig::new())
        .expect("Failed to build session")
}

/// Luma rows without stride padding.
fn visible_luma(frame: &ffmpeg_next::frame::Video) -> Vec<u8> {
    let stride = frame.stride(0);
    let width = frame.width() as usize;
    frame
        .data(0)
        .chunks(stride)
        .take(frame.height() as usize)
        .flat_map(|row| row[..width].iter().copied())
        .collect()
}

fn decode_all(source: &mut MediaSource) -> u32 {
    let mut decoded = 0;
    while let Some(frame) = source.next_video_frame().expect("Failed to decode") {
        assert_eq!((frame.width(), frame.height()), (WIDTH, HEIGHT));
        decoded += 1;
    }
    decoded
}

// ── Opening ────────────────────────────────────────────────────────

#[test]
fn open_nonexistent_file() {
    let error = MediaSource::open("this_file_does_not_exist.mp4").unwrap_err();
    assert!(matches!(error, VmafError::FileOpen { .. }));
    assert_eq!(error.status(), CompletionStatus::InputVideoError);

    let message = error.to_string();
    assert!(
        message.contains("this_file_does_not_exist.mp4"),
        "Error should name the input: {message}"
    );
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let error = MediaSource::open(&invalid_file_path).unwrap_err();
    assert_eq!(error.status(), CompletionStatus::InputVideoError);
}

#[test]
fn empty_buffer_is_rejected() {
    let error = MediaSource::from_bytes(Vec::new()).unwrap_err();
    assert!(matches!(error, VmafError::FileOpen { .. }));
}

#[test]
fn garbage_buffer_is_rejected() {
    let error = MediaSource::from_bytes(vec![0x42; 4096]).unwrap_err();
    assert_eq!(error.status(), CompletionStatus::InputVideoError);
}

// ── Decoding ───────────────────────────────────────────────────────

#[test]
fn stream_info_is_populated() {
    let (_directory, path) = generated_clip(20);

    let source = MediaSource::open(&path).expect("Failed to open generated clip");
    let info = source.info();
    assert_eq!((info.width, info.height), (WIDTH, HEIGHT));
    assert_eq!(info.pixel_format, Pixel::YUV420P);
    assert!((info.frames_per_second - 25.0).abs() < 0.01);
    assert!(info.frame_count.abs_diff(20) <= 1, "estimated {}", info.frame_count);
    assert_eq!(info.codec, "mpeg4");
    assert_eq!(source.path(), path.as_path());
}

#[test]
fn every_frame_decodes_including_the_eof_drain() {
    let (_directory, path) = generated_clip(20);

    let mut source = MediaSource::open(&path).expect("Failed to open generated clip");
    assert_eq!(decode_all(&mut source), 20);
}

#[test]
fn exhausted_source_keeps_returning_none() {
    let (_directory, path) = generated_clip(5);

    let mut source = MediaSource::open(&path).expect("Failed to open generated clip");
    decode_all(&mut source);
    assert!(source.next_video_frame().expect("Failed to decode").is_none());
    assert!(source.next_video_frame().expect("Failed to decode").is_none());
}

#[test]
fn memory_input_matches_file_input() {
    let (_directory, path) = generated_clip(12);

    let mut from_file = MediaSource::open(&path).expect("Failed to open generated clip");
    let bytes = std::fs::read(&path).expect("Failed to read generated clip");
    let mut from_memory = MediaSource::from_bytes(bytes).expect("Failed to open buffer");

    assert_eq!(from_file.info().width, from_memory.info().width);
    assert_eq!(from_file.info().height, from_memory.info().height);
    assert_eq!(from_file.info().frame_count, from_memory.info().frame_count);
    assert_eq!(from_memory.path().to_str(), Some("<memory>"));

    for _ in 0..12 {
        let file_luma = visible_luma(
            from_file
                .next_video_frame()
                .expect("Failed to decode file")
                .expect("File ended early"),
        );
        let memory_luma = visible_luma(
            from_memory
                .next_video_frame()
                .expect("Failed to decode buffer")
                .expect("Buffer ended early"),
        );
        assert_eq!(file_luma, memory_luma);
    }
    assert!(from_memory.next_video_frame().expect("Failed to decode").is_none());
}

// ── Scoring real media ─────────────────────────────────────────────

#[test]
fn video_scored_against_itself_is_perfect() {
    let (_directory, path) = generated_clip(16);

    let mut session = default_session();
    let channel = ProgressChannel::new(64, ProgressLayout::default());
    let report = VmafPipeline::new(small_config().with_max_frames(12))
        .run_files(&mut session, &path, &path, &channel, None)
        .expect("Failed to score");

    assert_eq!(report.frames_processed, 12);
    assert!(report.scores.iter().all(|&score| score == 100.0));
    assert_eq!(report.pooled_score, 100.0);
    assert_eq!(report.termination, Termination::IterationBound);
}

#[test]
fn in_memory_inputs_score_like_files() {
    let (_directory, path) = generated_clip(8);
    let bytes = std::fs::read(&path).expect("Failed to read generated clip");

    let mut session = default_session();
    let channel = ProgressChannel::new(64, ProgressLayout::default());
    let report = VmafPipeline::new(small_config())
        .run_buffers(&mut session, bytes.clone(), bytes, &channel, None)
        .expect("Failed to score");

    assert!(report.frames_processed >= 7);
    assert_eq!(report.pooled_score, 100.0);
}

#[test]
fn shorter_clip_limits_the_run() {
    let (_long_directory, long) = generated_clip(15);
    let (_short_directory, short) = generated_clip(6);

    let mut session = default_session();
    let channel = ProgressChannel::new(64, ProgressLayout::default());
    let report = VmafPipeline::new(small_config())
        .run_files(&mut session, &long, &short, &channel, None)
        .expect("Failed to score");

    assert!((6..=7).contains(&report.frames_processed));
    assert_eq!(report.limiting_stream, Some(StreamSide::Test));
    assert!(matches!(
        report.termination,
        Termination::IterationBound | Termination::StreamEnded(StreamEnd::TestOnly)
    ));
}
