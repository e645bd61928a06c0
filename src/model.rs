//! Scoring model loading.
//!
//! Models are JSON documents describing which features the engine extracts,
//! how they are weighted, and how the weighted sum maps onto the score
//! range. A buffer may hold either a single model or a collection
//! (`{"models": [...]}`); [`load_model`] tries the former first and falls
//! back to the latter, binding the collection's first model.
//!
//! # Example
//!
//! ```
//! use ffvmaf::{ModelConfig, load_model};
//!
//! let bound = load_model(ffvmaf::DEFAULT_MODEL.as_bytes(), &ModelConfig::new())?;
//! assert_eq!(bound.model.lookahead, 2);
//! # Ok::<(), ffvmaf::VmafError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::VmafError;

/// The model bundled with the crate.
pub const DEFAULT_MODEL: &str = include_str!("../models/ffvmaf_v1.json");

/// Inclusive range scores are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    /// Lowest attainable score.
    pub min: f64,
    /// Highest attainable score.
    pub max: f64,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
        }
    }
}

impl ScoreRange {
    /// Clamp `score` into the range.
    pub fn clamp(&self, score: f64) -> f64 {
        score.clamp(self.min, self.max)
    }

    /// Whether `score` lies within the range.
    pub fn contains(&self, score: f64) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

/// An elementary feature the engine can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Luma PSNR, normalized by the model's ceiling.
    PsnrY,
    /// Blue-difference chroma PSNR, normalized by the model's ceiling.
    PsnrCb,
    /// Red-difference chroma PSNR, normalized by the model's ceiling.
    PsnrCr,
    /// Agreement of reference and test luma motion over the lookahead window.
    MotionConsistency,
}

/// A feature and its weight in the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedFeature {
    /// Feature to extract.
    pub name: Feature,
    /// Relative weight. Weights are normalized by their sum.
    pub weight: f64,
}

/// Second-order polynomial applied to raw scores, `p0 + p1·s + p2·s²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Constant term.
    #[serde(default)]
    pub p0: f64,
    /// Linear term.
    #[serde(default = "one")]
    pub p1: f64,
    /// Quadratic term.
    #[serde(default)]
    pub p2: f64,
}

impl Transform {
    /// Apply the polynomial.
    pub fn apply(&self, score: f64) -> f64 {
        self.p0 + self.p1 * score + self.p2 * score * score
    }
}

/// A single scoring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Range scores are reported in.
    #[serde(default)]
    pub score_range: ScoreRange,
    /// Pairs that must follow an index before its score can be computed.
    #[serde(default = "default_lookahead")]
    pub lookahead: u32,
    /// PSNR (dB) treated as a perfect match.
    #[serde(default = "default_psnr_ceiling")]
    pub psnr_ceiling_db: f64,
    /// Mean luma motion difference at which motion consistency reaches zero.
    #[serde(default = "default_motion_tolerance")]
    pub motion_tolerance: f64,
    /// Features and their weights.
    pub features: Vec<WeightedFeature>,
    /// Optional score transform, used only when enabled in [`ModelConfig`].
    #[serde(default)]
    pub transform: Option<Transform>,
    /// Whether scores are clamped to `score_range`.
    #[serde(default = "yes")]
    pub clip: bool,
}

/// A set of models, e.g. bootstrap variants of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCollection {
    /// Member models. The first one is bound for scoring.
    pub models: Vec<Model>,
}

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

fn default_lookahead() -> u32 {
    2
}

fn default_psnr_ceiling() -> f64 {
    60.0
}

fn default_motion_tolerance() -> f64 {
    8.0
}

impl Model {
    fn validate(&self) -> Result<(), VmafError> {
        let range = self.score_range;
        if !(range.min.is_finite() && range.max.is_finite() && range.max > range.min) {
            return Err(VmafError::ModelLoad(format!(
                "model '{}' has an empty score range [{}, {}]",
                self.name, range.min, range.max
            )));
        }
        if !(self.psnr_ceiling_db.is_finite() && self.psnr_ceiling_db > 0.0) {
            return Err(VmafError::ModelLoad(format!(
                "model '{}' has a non-positive PSNR ceiling",
                self.name
            )));
        }
        if !(self.motion_tolerance.is_finite() && self.motion_tolerance > 0.0) {
            return Err(VmafError::ModelLoad(format!(
                "model '{}' has a non-positive motion tolerance",
                self.name
            )));
        }
        Ok(())
    }
}

/// Options applied while binding a model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelConfig {
    /// Label for the bound model. Defaults to the model's own name.
    pub name: Option<String>,
    /// Apply the model's score transform (the "phone" viewing variant).
    pub enable_transform: bool,
}

impl ModelConfig {
    /// Default options: model's own name, transform disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Label the bound model.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable the score transform.
    #[must_use]
    pub fn with_transform(mut self, enable: bool) -> Self {
        self.enable_transform = enable;
        self
    }
}

/// A model ready to be handed to a scoring engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundModel {
    /// The model's parameters.
    pub model: Model,
    /// Label used in logs and reports.
    pub label: String,
    /// Number of models in the collection it came from, if any.
    pub collection_size: Option<usize>,
    /// Whether the score transform is applied.
    pub transform_enabled: bool,
}

impl BoundModel {
    /// Map a weighted feature mean in `[0, 1]` onto the model's score.
    pub fn score_from_quality(&self, quality: f64) -> f64 {
        let range = self.model.score_range;
        let mut score = range.min + (range.max - range.min) * quality;
        if self.transform_enabled {
            if let Some(transform) = &self.model.transform {
                score = transform.apply(score);
            }
        }
        if self.model.clip {
            score = range.clamp(score);
        }
        score
    }
}

/// Parse a model or, failing that, a model collection from `bytes`.
///
/// # Errors
///
/// Returns [`VmafError::ModelLoad`] if the buffer is neither, if a collection
/// is empty, or if the bound model's parameters are unusable.
pub fn load_model(bytes: &[u8], config: &ModelConfig) -> Result<BoundModel, VmafError> {
    let (model, collection_size) = match serde_json::from_slice::<Model>(bytes) {
        Ok(model) => (model, None),
        Err(model_error) => {
            log::debug!("Buffer is not a single model ({model_error}), trying a model collection");
            let collection: ModelCollection =
                serde_json::from_slice(bytes).map_err(|collection_error| {
                    VmafError::ModelLoad(format!(
                        "not a model ({model_error}) nor a model collection ({collection_error})"
                    ))
                })?;
            let size = collection.models.len();
            let first = collection.models.into_iter().next().ok_or_else(|| {
                VmafError::ModelLoad("model collection contains no models".to_string())
            })?;
            (first, Some(size))
        }
    };
    model.validate()?;

    if config.enable_transform && model.transform.is_none() {
        log::warn!(
            "Score transform requested but model '{}' does not define one",
            model.name
        );
    }

    let label = config.name.clone().unwrap_or_else(|| model.name.clone());
    log::info!(
        "Loaded model '{label}'{}",
        collection_size
            .map(|size| format!(" (first of a collection of {size})"))
            .unwrap_or_default()
    );

    Ok(BoundModel {
        label,
        collection_size,
        transform_enabled: config.enable_transform,
        model,
    })
}
