//! Progress reporting, score publication, and cancellation.
//!
//! [`ProgressChannel`] is a flat buffer of 32-bit floats shared between the
//! pipeline and a caller that does not block on it. The caller reads
//! progress and scores out of it and requests cancellation by writing a
//! sentinel into the cancellation slot. All access goes through named,
//! bounds-checked accessors; the slot layout is chosen with
//! [`ProgressLayout`].
//!
//! [`ProgressCallback`] is the in-process alternative: a trait object fired
//! every [`batch_size`](crate::PipelineConfig::with_batch_size) frames.
//!
//! # Example
//!
//! ```
//! use ffvmaf::{ProgressChannel, ProgressLayout};
//!
//! let channel = ProgressChannel::for_frames(10, ProgressLayout::default());
//! let caller_side = channel.clone();
//!
//! caller_side.request_cancel();
//! assert!(channel.take_cancel());
//! assert!(!channel.is_cancel_requested());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use std::time::{Duration, Instant};

use crate::{error::VmafError, extrema::ScoreRecord};

/// Value written into the cancellation slot to request cancellation.
pub const CANCEL_SENTINEL: f32 = -999.0;

/// Slot holding the number of frame pairs to process.
pub const TOTAL_SLOT: usize = 0;
/// Slot holding the number of frame pairs processed so far.
pub const PROCESSED_SLOT: usize = 1;
/// Slot holding the measured throughput in frame pairs per second.
pub const THROUGHPUT_SLOT: usize = 2;
/// Slot polled for [`CANCEL_SENTINEL`].
pub const CANCEL_SLOT: usize = 3;
/// Number of header slots preceding scores and summaries.
pub const HEADER_SLOTS: usize = 4;

/// Where per-frame scores and the pooled/max/min summary live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressLayout {
    /// `[4..4+N)` per-frame scores, then `[4+N]` pooled, `[5+N]` max,
    /// `[6+N]` min. This is the default.
    #[default]
    SummaryAfterScores,
    /// `[4]` pooled, `[5]` max, `[6]` min, then `[7..7+N)` per-frame scores.
    SummaryBeforeScores,
}

impl ProgressLayout {
    /// Slot of the score for `index`.
    pub fn score_slot(self, index: u32) -> usize {
        match self {
            ProgressLayout::SummaryAfterScores => HEADER_SLOTS + index as usize,
            ProgressLayout::SummaryBeforeScores => HEADER_SLOTS + 3 + index as usize,
        }
    }

    /// Slot of the pooled score for a run of `frames` pairs.
    pub fn pooled_slot(self, frames: u32) -> usize {
        match self {
            ProgressLayout::SummaryAfterScores => HEADER_SLOTS + frames as usize,
            ProgressLayout::SummaryBeforeScores => HEADER_SLOTS,
        }
    }

    /// Slot of the maximum score for a run of `frames` pairs.
    pub fn max_slot(self, frames: u32) -> usize {
        self.pooled_slot(frames) + 1
    }

    /// Slot of the minimum score for a run of `frames` pairs.
    pub fn min_slot(self, frames: u32) -> usize {
        self.pooled_slot(frames) + 2
    }

    /// Slots a buffer needs for a run of `frames` pairs.
    pub fn required_len(self, frames: u32) -> usize {
        HEADER_SLOTS + frames as usize + 3
    }
}

/// Shared progress buffer with typed, bounds-checked slots.
///
/// Cloning is cheap and every clone addresses the same slots.
#[derive(Clone)]
pub struct ProgressChannel {
    slots: Arc<[AtomicU32]>,
    layout: ProgressLayout,
}

impl Debug for ProgressChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProgressChannel")
            .field("len", &self.slots.len())
            .field("layout", &self.layout)
            .field("total", &self.total())
            .field("processed", &self.processed())
            .finish_non_exhaustive()
    }
}

impl ProgressChannel {
    /// Create a zero-filled channel of `len` slots.
    ///
    /// The four header slots are always present, even if `len` is smaller.
    pub fn new(len: usize, layout: ProgressLayout) -> Self {
        let slots: Arc<[AtomicU32]> = (0..len.max(HEADER_SLOTS))
            .map(|_| AtomicU32::new(0f32.to_bits()))
            .collect();
        Self { slots, layout }
    }

    /// Create a channel exactly large enough for `frames` pairs.
    pub fn for_frames(frames: u32, layout: ProgressLayout) -> Self {
        Self::new(layout.required_len(frames), layout)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; the header slots are always present.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot layout.
    pub fn layout(&self) -> ProgressLayout {
        self.layout
    }

    /// Check that a run of `frames` pairs fits.
    ///
    /// # Errors
    ///
    /// Returns [`VmafError::ProgressBufferTooSmall`] otherwise.
    pub fn ensure_capacity(&self, frames: u32) -> Result<(), VmafError> {
        let required = self.layout.required_len(frames);
        if self.slots.len() < required {
            return Err(VmafError::ProgressBufferTooSmall {
                capacity: self.slots.len(),
                required,
            });
        }
        Ok(())
    }

    /// Read slot `slot`.
    pub fn get(&self, slot: usize) -> Result<f32, VmafError> {
        self.slot(slot)
            .map(|cell| f32::from_bits(cell.load(Ordering::Acquire)))
    }

    /// Write `value` into slot `slot`.
    pub fn set(&self, slot: usize, value: f32) -> Result<(), VmafError> {
        self.slot(slot)
            .map(|cell| cell.store(value.to_bits(), Ordering::Release))
    }

    fn slot(&self, slot: usize) -> Result<&AtomicU32, VmafError> {
        self.slots
            .get(slot)
            .ok_or(VmafError::ProgressSlotOutOfRange {
                slot,
                capacity: self.slots.len(),
            })
    }

    fn header(&self, slot: usize) -> f32 {
        f32::from_bits(self.slots[slot].load(Ordering::Acquire))
    }

    fn set_header(&self, slot: usize, value: f32) {
        self.slots[slot].store(value.to_bits(), Ordering::Release);
    }

    /// Frame pairs the run will process.
    pub fn total(&self) -> f32 {
        self.header(TOTAL_SLOT)
    }

    pub(crate) fn set_total(&self, frames: u32) {
        self.set_header(TOTAL_SLOT, frames as f32);
    }

    /// Frame pairs processed so far.
    pub fn processed(&self) -> f32 {
        self.header(PROCESSED_SLOT)
    }

    pub(crate) fn set_processed(&self, frames: u32) {
        self.set_header(PROCESSED_SLOT, frames as f32);
    }

    /// Last measured throughput in frame pairs per second.
    pub fn throughput(&self) -> f32 {
        self.header(THROUGHPUT_SLOT)
    }

    pub(crate) fn set_throughput(&self, frames_per_second: f64) {
        self.set_header(THROUGHPUT_SLOT, frames_per_second as f32);
    }

    /// Ask the pipeline to stop at its next cancellation poll.
    pub fn request_cancel(&self) {
        self.set_header(CANCEL_SLOT, CANCEL_SENTINEL);
    }

    /// Whether a cancellation request is pending.
    pub fn is_cancel_requested(&self) -> bool {
        self.header(CANCEL_SLOT) == CANCEL_SENTINEL
    }

    /// Consume a pending cancellation request, resetting the slot to 0.
    pub fn take_cancel(&self) -> bool {
        self.slots[CANCEL_SLOT]
            .compare_exchange(
                CANCEL_SENTINEL.to_bits(),
                0f32.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Publish the score for `index`.
    pub fn set_score(&self, index: u32, score: f64) -> Result<(), VmafError> {
        self.set(self.layout.score_slot(index), score as f32)
    }

    /// Score published for `index`.
    pub fn score(&self, index: u32) -> Result<f32, VmafError> {
        self.get(self.layout.score_slot(index))
    }

    /// The first `count` per-frame score slots.
    pub fn scores(&self, count: u32) -> Result<Vec<f32>, VmafError> {
        (0..count).map(|index| self.score(index)).collect()
    }

    /// Publish the pooled, maximum and minimum scores of a run of `frames` pairs.
    pub fn set_summary(
        &self,
        frames: u32,
        pooled: f64,
        max: f64,
        min: f64,
    ) -> Result<(), VmafError> {
        self.set(self.layout.pooled_slot(frames), pooled as f32)?;
        self.set(self.layout.max_slot(frames), max as f32)?;
        self.set(self.layout.min_slot(frames), min as f32)
    }

    /// Pooled score slot of a run of `frames` pairs.
    pub fn pooled(&self, frames: u32) -> Result<f32, VmafError> {
        self.get(self.layout.pooled_slot(frames))
    }

    /// Maximum score slot of a run of `frames` pairs.
    pub fn max_score(&self, frames: u32) -> Result<f32, VmafError> {
        self.get(self.layout.max_slot(frames))
    }

    /// Minimum score slot of a run of `frames` pairs.
    pub fn min_score(&self, frames: u32) -> Result<f32, VmafError> {
        self.get(self.layout.min_slot(frames))
    }

    /// Copy of every slot.
    pub fn snapshot(&self) -> Vec<f32> {
        self.slots
            .iter()
            .map(|cell| f32::from_bits(cell.load(Ordering::Acquire)))
            .collect()
    }
}

/// A snapshot of scoring progress.
///
/// Delivered to [`ProgressCallback::on_progress`] every
/// [`batch_size`](crate::PipelineConfig::with_batch_size) processed frames.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frame pairs processed so far.
    pub frames_processed: u32,
    /// Frame pairs the run will process at most.
    pub frames_to_process: u32,
    /// Completion percentage (0.0 – 100.0).
    pub percentage: f32,
    /// Wall-clock time since the first iteration.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Frame pairs per second so far.
    pub frames_per_second: f64,
    /// The most recently published score, if any.
    pub latest_score: Option<ScoreRecord>,
}

/// Trait for receiving progress updates during a scoring run.
///
/// Callbacks observe but cannot halt the run directly; request
/// cancellation through the [`ProgressChannel`] instead.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a run.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks timing and fires the callback in batches.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: u32,
    current: u32,
    batch_size: u32,
    start_time: Instant,
    items_since_last_report: u32,
    latest_score: Option<ScoreRecord>,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        total: u32,
        batch_size: u32,
        start_time: Instant,
    ) -> Self {
        Self {
            callback,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time,
            items_since_last_report: 0,
            latest_score: None,
        }
    }

    /// Record a published score.
    pub(crate) fn record_score(&mut self, record: ScoreRecord) {
        self.latest_score = Some(record);
    }

    /// Record one processed frame pair and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report();
    }

    /// Frame pairs per second since the run started.
    pub(crate) fn throughput(&self) -> f64 {
        frames_per_second(self.current, self.start_time.elapsed())
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed();

        let percentage = if self.total > 0 {
            (self.current as f32 / self.total as f32) * 100.0
        } else {
            0.0
        };

        let estimated_remaining = (self.current > 0).then(|| {
            let remaining = self.total.saturating_sub(self.current);
            let per_item = elapsed / self.current;
            per_item * remaining
        });

        let info = ProgressInfo {
            frames_processed: self.current,
            frames_to_process: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            frames_per_second: self.throughput(),
            latest_score: self.latest_score,
        };

        self.callback.on_progress(&info);
    }
}

/// Throughput of `frames` processed pairs over `elapsed`, or 0 before any
/// time has passed.
pub fn frames_per_second(frames: u32, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        frames as f64 / seconds
    } else {
        0.0
    }
}
