//! The scoring engine boundary and the built-in feature engine.
//!
//! [`ScoringEngine`] is the seam between the pipeline and whatever computes
//! quality scores. Its contract mirrors a windowed scorer: pictures are fed
//! in dense index order, a final `None` pair signals end of stream, and the
//! score for an index is only defined once [`lookahead`](ScoringEngine::lookahead)
//! further pairs have been read (or the stream has ended).
//!
//! [`FeatureEngine`] is the deterministic engine shipped with the crate. It
//! extracts the features listed by its [`BoundModel`] and combines them into
//! one score per frame.

use std::ops::RangeInclusive;

use crate::{
    config::PoolMethod,
    error::VmafError,
    features::{self, Picture},
    model::{BoundModel, Feature},
};

/// A windowed frame-pair scorer.
pub trait ScoringEngine {
    /// Register the feature extractors the bound model needs.
    ///
    /// Called exactly once, before the first [`read_pictures`](Self::read_pictures).
    fn register_features(&mut self) -> Result<(), VmafError>;

    /// Number of pairs that must follow an index before it can be scored.
    fn lookahead(&self) -> u32;

    /// Read the pair at `index`, or signal end of stream with `None`.
    fn read_pictures(&mut self, pair: Option<(Picture, Picture)>, index: u32)
    -> Result<(), VmafError>;

    /// Score of the pair at `index`.
    fn score_at_index(&mut self, index: u32) -> Result<f64, VmafError>;

    /// Pool the scores of `range` with `method`. Only valid after end of stream.
    fn score_pooled(
        &mut self,
        method: PoolMethod,
        range: RangeInclusive<u32>,
    ) -> Result<f64, VmafError>;
}

/// Per-index features known as soon as the pair is read.
#[derive(Debug, Clone, Copy)]
struct FrameFeatures {
    psnr: [f64; 3],
    /// |reference motion − test motion| towards the next index.
    motion_delta: Option<f64>,
}

/// The built-in engine: weighted PSNR and motion-consistency features.
#[derive(Debug)]
pub struct FeatureEngine {
    model: BoundModel,
    weights: Vec<(Feature, f64)>,
    frames: Vec<FrameFeatures>,
    scores: Vec<Option<f64>>,
    previous: Option<(Picture, Picture)>,
    geometry: Option<(u32, u32)>,
    flushed: bool,
}

impl FeatureEngine {
    /// Create an engine for `model`. Features are registered separately.
    pub fn new(model: BoundModel) -> Self {
        Self {
            model,
            weights: Vec::new(),
            frames: Vec::new(),
            scores: Vec::new(),
            previous: None,
            geometry: None,
            flushed: false,
        }
    }

    /// The bound model.
    pub fn model(&self) -> &BoundModel {
        &self.model
    }

    fn ingested(&self) -> u32 {
        self.frames.len() as u32
    }

    fn is_ready(&self, index: u32) -> bool {
        index < self.ingested()
            && (self.flushed || (index as u64 + self.lookahead() as u64) < self.ingested() as u64)
    }

    fn motion_consistency(&self, index: u32) -> f64 {
        let start = index as usize;
        let end = (start + self.lookahead() as usize).min(self.frames.len().saturating_sub(1));
        let deltas: Vec<f64> = self.frames[start..end]
            .iter()
            .filter_map(|frame| frame.motion_delta)
            .collect();
        if deltas.is_empty() {
            return 1.0;
        }
        let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
        (1.0 - mean / self.model.model.motion_tolerance).clamp(0.0, 1.0)
    }

    fn compute_score(&self, index: u32) -> f64 {
        let frame = &self.frames[index as usize];
        let ceiling = self.model.model.psnr_ceiling_db;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for &(feature, weight) in &self.weights {
            let value = match feature {
                Feature::PsnrY => frame.psnr[0] / ceiling,
                Feature::PsnrCb => frame.psnr[1] / ceiling,
                Feature::PsnrCr => frame.psnr[2] / ceiling,
                Feature::MotionConsistency => self.motion_consistency(index),
            };
            weighted += weight * value.clamp(0.0, 1.0);
            total_weight += weight;
        }
        self.model.score_from_quality(weighted / total_weight)
    }
}

impl ScoringEngine for FeatureEngine {
    fn register_features(&mut self) -> Result<(), VmafError> {
        let features = &self.model.model.features;
        if features.is_empty() {
            return Err(VmafError::FeatureRegistration(format!(
                "model '{}' lists no features",
                self.model.label
            )));
        }
        if let Some(bad) = features
            .iter()
            .find(|feature| !(feature.weight.is_finite() && feature.weight >= 0.0))
        {
            return Err(VmafError::FeatureRegistration(format!(
                "feature {:?} has invalid weight {}",
                bad.name, bad.weight
            )));
        }
        let total: f64 = features.iter().map(|feature| feature.weight).sum();
        if total <= 0.0 {
            return Err(VmafError::FeatureRegistration(
                "feature weights sum to zero".to_string(),
            ));
        }

        self.weights = features
            .iter()
            .map(|feature| (feature.name, feature.weight))
            .collect();
        log::debug!(
            "Registered {} feature extractors for '{}': {:?}",
            self.weights.len(),
            self.model.label,
            self.weights
        );
        Ok(())
    }

    fn lookahead(&self) -> u32 {
        self.model.model.lookahead
    }

    fn read_pictures(
        &mut self,
        pair: Option<(Picture, Picture)>,
        index: u32,
    ) -> Result<(), VmafError> {
        if self.weights.is_empty() {
            return Err(VmafError::PictureRead {
                index,
                reason: "no feature extractors registered".to_string(),
            });
        }
        if self.flushed {
            return Err(VmafError::PictureRead {
                index,
                reason: "end of stream already signalled".to_string(),
            });
        }

        let Some((reference, distorted)) = pair else {
            self.flushed = true;
            self.previous = None;
            return Ok(());
        };

        if index != self.ingested() {
            return Err(VmafError::OutOfOrder {
                expected: self.ingested(),
                got: index,
            });
        }
        let geometry = (reference.width(), reference.height());
        if (distorted.width(), distorted.height()) != geometry {
            return Err(VmafError::PictureRead {
                index,
                reason: format!(
                    "reference is {}x{} but test is {}x{}",
                    geometry.0,
                    geometry.1,
                    distorted.width(),
                    distorted.height()
                ),
            });
        }
        if let Some(expected) = self.geometry {
            if expected != geometry {
                return Err(VmafError::PictureRead {
                    index,
                    reason: format!(
                        "geometry changed from {}x{} to {}x{}",
                        expected.0, expected.1, geometry.0, geometry.1
                    ),
                });
            }
        }
        self.geometry = Some(geometry);

        let psnr = features::picture_psnr(&reference, &distorted, self.model.model.psnr_ceiling_db);
        if let Some((previous_reference, previous_distorted)) = &self.previous {
            let reference_motion = features::luma_motion(previous_reference, &reference);
            let distorted_motion = features::luma_motion(previous_distorted, &distorted);
            if let Some(last) = self.frames.last_mut() {
                last.motion_delta = Some((reference_motion - distorted_motion).abs());
            }
        }

        self.frames.push(FrameFeatures {
            psnr,
            motion_delta: None,
        });
        self.scores.push(None);
        self.previous = Some((reference, distorted));
        Ok(())
    }

    fn score_at_index(&mut self, index: u32) -> Result<f64, VmafError> {
        if !self.is_ready(index) {
            return Err(VmafError::ScoreAtIndex {
                index,
                reason: format!(
                    "{} pairs read, lookahead {}{}",
                    self.ingested(),
                    self.lookahead(),
                    if self.flushed { ", stream ended" } else { "" }
                ),
            });
        }
        if let Some(score) = self.scores[index as usize] {
            return Ok(score);
        }
        let score = self.compute_score(index);
        self.scores[index as usize] = Some(score);
        Ok(score)
    }

    fn score_pooled(
        &mut self,
        method: PoolMethod,
        range: RangeInclusive<u32>,
    ) -> Result<f64, VmafError> {
        if !self.flushed {
            return Err(VmafError::Pool(
                "pooled score requested before end of stream".to_string(),
            ));
        }
        if range.is_empty() || *range.end() >= self.ingested() {
            return Err(VmafError::Pool(format!(
                "range {}..={} is outside the {} scored pairs",
                range.start(),
                range.end(),
                self.ingested()
            )));
        }

        let mut scores = Vec::with_capacity(range.clone().count());
        for index in range {
            let score = self
                .score_at_index(index)
                .map_err(|error| VmafError::Pool(error.to_string()))?;
            scores.push(score);
        }
        method
            .pool(&scores)
            .ok_or_else(|| VmafError::Pool("no scores to pool".to_string()))
    }
}
