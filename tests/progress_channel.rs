//! Progress channel integration tests.

use std::{thread, time::Duration};

use ffvmaf::{
    CANCEL_SENTINEL, CompletionStatus, ProgressChannel, ProgressLayout, VmafError,
    frames_per_second, progress::{CANCEL_SLOT, HEADER_SLOTS},
};

// ── Layouts ────────────────────────────────────────────────────────

#[test]
fn summary_after_scores_layout() {
    let layout = ProgressLayout::SummaryAfterScores;
    assert_eq!(layout.score_slot(0), 4);
    assert_eq!(layout.score_slot(9), 13);
    assert_eq!(layout.pooled_slot(10), 14);
    assert_eq!(layout.max_slot(10), 15);
    assert_eq!(layout.min_slot(10), 16);
    assert_eq!(layout.required_len(10), 17);
}

#[test]
fn summary_before_scores_layout() {
    let layout = ProgressLayout::SummaryBeforeScores;
    assert_eq!(layout.pooled_slot(10), 4);
    assert_eq!(layout.max_slot(10), 5);
    assert_eq!(layout.min_slot(10), 6);
    assert_eq!(layout.score_slot(0), 7);
    assert_eq!(layout.required_len(10), 17);
}

#[test]
fn default_layout_puts_summary_last() {
    assert_eq!(ProgressLayout::default(), ProgressLayout::SummaryAfterScores);
}

// ── Bounds ─────────────────────────────────────────────────────────

#[test]
fn header_slots_always_exist() {
    let channel = ProgressChannel::new(0, ProgressLayout::default());
    assert_eq!(channel.len(), HEADER_SLOTS);
    assert_eq!(channel.total(), 0.0);
}

#[test]
fn out_of_range_slot_is_an_error() {
    let channel = ProgressChannel::for_frames(2, ProgressLayout::default());

    let error = channel.set_score(5, 1.0).unwrap_err();
    assert!(matches!(
        error,
        VmafError::ProgressSlotOutOfRange {
            slot: 9,
            capacity: 9
        }
    ));
    assert_eq!(error.status(), CompletionStatus::OutputBufferError);
    assert!(channel.get(100).is_err());
}

#[test]
fn capacity_check_matches_layout() {
    let channel = ProgressChannel::new(17, ProgressLayout::default());
    assert!(channel.ensure_capacity(10).is_ok());
    assert!(matches!(
        channel.ensure_capacity(11),
        Err(VmafError::ProgressBufferTooSmall {
            capacity: 17,
            required: 18
        })
    ));
}

#[test]
fn scores_and_summary_round_trip() {
    let channel = ProgressChannel::for_frames(3, ProgressLayout::default());
    channel.set_score(0, 91.5).unwrap();
    channel.set_score(2, 12.25).unwrap();
    channel.set_summary(3, 50.0, 91.5, 12.25).unwrap();

    assert_eq!(channel.scores(3).unwrap(), vec![91.5, 0.0, 12.25]);
    assert_eq!(channel.pooled(3).unwrap(), 50.0);
    assert_eq!(channel.max_score(3).unwrap(), 91.5);
    assert_eq!(channel.min_score(3).unwrap(), 12.25);
}

// ── Cancellation ───────────────────────────────────────────────────

#[test]
fn cancel_request_is_consumed_once() {
    let channel = ProgressChannel::for_frames(1, ProgressLayout::default());
    assert!(!channel.take_cancel());

    channel.request_cancel();
    assert!(channel.is_cancel_requested());
    assert_eq!(channel.get(CANCEL_SLOT).unwrap(), CANCEL_SENTINEL);

    assert!(channel.take_cancel());
    assert!(!channel.take_cancel());
    assert_eq!(channel.get(CANCEL_SLOT).unwrap(), 0.0);
}

#[test]
fn other_values_in_cancel_slot_are_ignored() {
    let channel = ProgressChannel::for_frames(1, ProgressLayout::default());
    channel.set(CANCEL_SLOT, 1.0).unwrap();
    assert!(!channel.take_cancel());
    assert_eq!(channel.get(CANCEL_SLOT).unwrap(), 1.0);
}

#[test]
fn clones_share_slots_across_threads() {
    let channel = ProgressChannel::for_frames(4, ProgressLayout::default());
    let caller = channel.clone();

    thread::spawn(move || caller.request_cancel())
        .join()
        .expect("Caller thread panicked");

    assert!(channel.take_cancel());
}

#[test]
fn snapshot_copies_every_slot() {
    let channel = ProgressChannel::for_frames(2, ProgressLayout::SummaryBeforeScores);
    channel.set_score(1, 77.0).unwrap();
    let snapshot = channel.snapshot();
    assert_eq!(snapshot.len(), 9);
    assert_eq!(snapshot[8], 77.0);
}

// ── Throughput ─────────────────────────────────────────────────────

#[test]
fn throughput_counts_every_processed_pair() {
    assert_eq!(frames_per_second(5, Duration::from_secs(1)), 5.0);
    assert_eq!(frames_per_second(4, Duration::from_secs(2)), 2.0);
    assert_eq!(frames_per_second(30, Duration::from_millis(500)), 60.0);
}

#[test]
fn throughput_before_any_elapsed_time_is_zero() {
    assert_eq!(frames_per_second(3, Duration::ZERO), 0.0);
    assert_eq!(frames_per_second(0, Duration::ZERO), 0.0);
}
