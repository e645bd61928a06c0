//! Tracking of the best- and worst-scoring frame pairs.
//!
//! [`ExtremaTracker`] only reacts to scores produced elsewhere. When a score
//! beats the current maximum (strictly) or undercuts the current minimum,
//! the matching canonical frames are rendered into the caller's
//! [`PreviewBuffers`].

use std::collections::VecDeque;

use ffmpeg_next::frame::Video as VideoFrame;
use serde::{Deserialize, Serialize};

use crate::{
    config::PipelineConfig,
    error::VmafError,
    normalize::{FrameNormalizer, PreviewBuffers},
};

/// A score for one frame-pair index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Frame-pair index.
    pub index: u32,
    /// Score of the pair.
    pub score: f64,
}

/// Current extrema. `None` until a qualifying score has been observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtremaSnapshot {
    /// Highest score above zero.
    pub max: Option<ScoreRecord>,
    /// Lowest non-negative score.
    pub min: Option<ScoreRecord>,
}

/// Which extrema an observation replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtremaUpdate {
    /// The maximum changed.
    pub max: bool,
    /// The minimum changed.
    pub min: bool,
}

/// Keeps the highest- and lowest-scoring pairs and their previews.
#[derive(Debug)]
pub struct ExtremaTracker {
    max_score: f64,
    min_score: f64,
    snapshot: ExtremaSnapshot,
    normalizer: FrameNormalizer,
}

impl ExtremaTracker {
    /// Create a tracker rendering previews with `config`'s geometry.
    ///
    /// The maximum starts at 0 and the minimum above any attainable score,
    /// so the first positive score sets both.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_score: 0.0,
            min_score: f64::INFINITY,
            snapshot: ExtremaSnapshot::default(),
            normalizer: FrameNormalizer::new(config),
        }
    }

    /// Current extrema.
    pub fn snapshot(&self) -> ExtremaSnapshot {
        self.snapshot
    }

    /// Update the extrema without rendering previews.
    pub fn observe_score(&mut self, index: u32, score: f64) -> ExtremaUpdate {
        let mut update = ExtremaUpdate::default();
        if score > self.max_score {
            self.max_score = score;
            self.snapshot.max = Some(ScoreRecord { index, score });
            update.max = true;
        }
        if score >= 0.0 && score < self.min_score {
            self.min_score = score;
            self.snapshot.min = Some(ScoreRecord { index, score });
            update.min = true;
        }
        update
    }

    /// Update the extrema and render the canonical pair into `previews`
    /// for every extremum that changed.
    pub fn observe(
        &mut self,
        index: u32,
        score: f64,
        reference: &VideoFrame,
        test: &VideoFrame,
        previews: &mut PreviewBuffers,
    ) -> Result<ExtremaUpdate, VmafError> {
        let update = self.observe_score(index, score);
        if update.max {
            log::debug!("New maximum {score:.4} at index {index}");
            self.normalizer.to_preview(reference, &mut previews.max_reference)?;
            self.normalizer.to_preview(test, &mut previews.max_test)?;
        }
        if update.min {
            log::debug!("New minimum {score:.4} at index {index}");
            self.normalizer.to_preview(reference, &mut previews.min_reference)?;
            self.normalizer.to_preview(test, &mut previews.min_test)?;
        }
        Ok(update)
    }
}

/// Canonical frame pairs retained until their lagged score arrives.
///
/// Holds at most `lag + 1` pairs; frame buffers of evicted pairs are reused.
pub(crate) struct LagWindow {
    capacity: usize,
    entries: VecDeque<(u32, VideoFrame, VideoFrame)>,
}

impl LagWindow {
    pub(crate) fn new(lag: u32) -> Self {
        let capacity = lag as usize + 1;
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, index: u32, reference: &VideoFrame, test: &VideoFrame) {
        if self.entries.len() == self.capacity {
            if let Some((_, mut reference_copy, mut test_copy)) = self.entries.pop_front() {
                if same_geometry(&reference_copy, reference) && same_geometry(&test_copy, test) {
                    reference_copy.clone_from(reference);
                    test_copy.clone_from(test);
                    self.entries.push_back((index, reference_copy, test_copy));
                    return;
                }
            }
        }
        self.entries
            .push_back((index, reference.clone(), test.clone()));
    }

    pub(crate) fn get(&self, index: u32) -> Option<(&VideoFrame, &VideoFrame)> {
        self.entries
            .iter()
            .find(|(entry, _, _)| *entry == index)
            .map(|(_, reference, test)| (reference, test))
    }
}

fn same_geometry(a: &VideoFrame, b: &VideoFrame) -> bool {
    a.format() == b.format() && a.width() == b.width() && a.height() == b.height()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ExtremaTracker {
        ExtremaTracker::new(&PipelineConfig::new())
    }

    #[test]
    fn first_positive_score_sets_both_extrema() {
        let mut tracker = tracker();
        let update = tracker.observe_score(0, 42.0);
        assert_eq!(update, ExtremaUpdate { max: true, min: true });
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.max, Some(ScoreRecord { index: 0, score: 42.0 }));
        assert_eq!(snapshot.min, Some(ScoreRecord { index: 0, score: 42.0 }));
    }

    #[test]
    fn ties_keep_the_earliest_index() {
        let mut tracker = tracker();
        tracker.observe_score(0, 50.0);
        let update = tracker.observe_score(1, 50.0);
        assert_eq!(update, ExtremaUpdate::default());
        assert_eq!(tracker.snapshot().max.map(|record| record.index), Some(0));
        assert_eq!(tracker.snapshot().min.map(|record| record.index), Some(0));
    }

    #[test]
    fn zero_sets_minimum_but_not_maximum() {
        let mut tracker = tracker();
        let update = tracker.observe_score(3, 0.0);
        assert_eq!(update, ExtremaUpdate { max: false, min: true });
        assert_eq!(tracker.snapshot().max, None);
    }

    #[test]
    fn negative_scores_are_ignored_for_minimum() {
        let mut tracker = tracker();
        tracker.observe_score(0, 10.0);
        tracker.observe_score(1, -1.0);
        assert_eq!(tracker.snapshot().min.map(|record| record.index), Some(0));
    }
}
