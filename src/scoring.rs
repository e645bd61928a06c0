//! Scoring sessions.
//!
//! A [`ScoringSession`] owns a [`ScoringEngine`] with its model already
//! bound and its features registered; there is no way to obtain a session
//! that could ingest pictures before registration. The session enforces the
//! ordering contract on top of the engine:
//!
//! - pairs are ingested at dense indices starting from 0;
//! - the score for index *i* is available once index *i + lag* has been
//!   ingested, or after [`flush`](ScoringSession::flush);
//! - `flush` happens exactly once, and pooling is only possible after it.
//!
//! # Example
//!
//! ```no_run
//! use ffvmaf::{ModelConfig, ScoringSession};
//!
//! let mut session = ScoringSession::from_model_bytes(
//!     ffvmaf::DEFAULT_MODEL.as_bytes(),
//!     &ModelConfig::new(),
//! )?;
//! # let (reference, test) = (ffmpeg_next::frame::Video::empty(), ffmpeg_next::frame::Video::empty());
//! session.ingest(&reference, &test, 0)?;
//! session.flush()?;
//! println!("pooled: {}", session.pooled_score(0..=0)?);
//! # Ok::<(), ffvmaf::VmafError>(())
//! ```

use std::ops::RangeInclusive;

use ffmpeg_next::frame::Video as VideoFrame;

use crate::{
    config::PoolMethod,
    engine::{FeatureEngine, ScoringEngine},
    error::VmafError,
    features::Picture,
    model::{BoundModel, ModelConfig, load_model},
};

/// An ordered, lagged scoring session over one engine.
#[derive(Debug)]
pub struct ScoringSession<E: ScoringEngine = FeatureEngine> {
    engine: E,
    lag: u32,
    ingested: u32,
    flushed: bool,
}

impl ScoringSession<FeatureEngine> {
    /// Create a session scoring with the built-in engine and `model`.
    pub fn new(model: BoundModel) -> Result<Self, VmafError> {
        Self::with_engine(FeatureEngine::new(model))
    }

    /// Load a model (or model collection) from `bytes` and create a session.
    ///
    /// # Errors
    ///
    /// - [`VmafError::ModelLoad`] if the buffer is neither a model nor a
    ///   collection.
    /// - [`VmafError::FeatureRegistration`] if the model's features cannot be
    ///   registered.
    pub fn from_model_bytes(bytes: &[u8], config: &ModelConfig) -> Result<Self, VmafError> {
        Self::new(load_model(bytes, config)?)
    }

    /// The bound model.
    pub fn model(&self) -> &BoundModel {
        self.engine.model()
    }
}

impl<E: ScoringEngine> ScoringSession<E> {
    /// Register `engine`'s features and wrap it in a session.
    ///
    /// The lag starts at the engine's lookahead.
    pub fn with_engine(mut engine: E) -> Result<Self, VmafError> {
        engine.register_features()?;
        let lag = engine.lookahead();
        Ok(Self {
            engine,
            lag,
            ingested: 0,
            flushed: false,
        })
    }

    /// Request a scoring lag, returning the lag in effect.
    ///
    /// The lag never drops below the engine's lookahead, since earlier
    /// queries could not be answered.
    pub fn set_lag(&mut self, lag: u32) -> u32 {
        let lookahead = self.engine.lookahead();
        if lag < lookahead {
            log::debug!("Requested lag {lag} is below engine lookahead {lookahead}, using {lookahead}");
        }
        self.lag = lag.max(lookahead);
        self.lag
    }

    /// Pairs that must follow an index before its score is queried.
    pub fn lag(&self) -> u32 {
        self.lag
    }

    /// Number of pairs ingested so far.
    pub fn ingested(&self) -> u32 {
        self.ingested
    }

    /// Whether end of stream has been signalled.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Copy a canonical frame pair into the engine at `index`.
    ///
    /// # Errors
    ///
    /// - [`VmafError::PictureCopy`] if either frame is not canonical 4:2:0.
    /// - [`VmafError::OutOfOrder`] if `index` is not the next dense index.
    /// - [`VmafError::PictureRead`] if the engine rejects the pair or the
    ///   session was already flushed.
    pub fn ingest(
        &mut self,
        reference: &VideoFrame,
        test: &VideoFrame,
        index: u32,
    ) -> Result<(), VmafError> {
        self.check_ingest(index)?;
        let reference = Picture::from_frame(reference)?;
        let test = Picture::from_frame(test)?;
        self.ingest_pictures(reference, test, index)
    }

    /// Ingest an already-copied picture pair at `index`.
    pub fn ingest_pictures(
        &mut self,
        reference: Picture,
        test: Picture,
        index: u32,
    ) -> Result<(), VmafError> {
        self.check_ingest(index)?;
        self.engine.read_pictures(Some((reference, test)), index)?;
        self.ingested += 1;
        Ok(())
    }

    fn check_ingest(&self, index: u32) -> Result<(), VmafError> {
        if self.flushed {
            return Err(VmafError::PictureRead {
                index,
                reason: "session already flushed".to_string(),
            });
        }
        if index != self.ingested {
            return Err(VmafError::OutOfOrder {
                expected: self.ingested,
                got: index,
            });
        }
        Ok(())
    }

    /// Whether the score for `index` can be queried now.
    pub fn is_ready(&self, index: u32) -> bool {
        index < self.ingested
            && (self.flushed || (index as u64 + self.lag as u64) < self.ingested as u64)
    }

    /// Score of the pair at `index`.
    ///
    /// # Errors
    ///
    /// - [`VmafError::ScoreNotReady`] if fewer than `lag` pairs follow
    ///   `index` and the session is not flushed.
    /// - [`VmafError::ScoreAtIndex`] if the engine fails.
    pub fn score_at(&mut self, index: u32) -> Result<f64, VmafError> {
        if !self.is_ready(index) {
            return Err(VmafError::ScoreNotReady {
                index,
                ingested: self.ingested,
                lag: self.lag,
            });
        }
        self.engine.score_at_index(index)
    }

    /// Signal end of stream to the engine.
    ///
    /// Must be called exactly once, after the last ingestion. Afterwards
    /// every ingested index is ready.
    ///
    /// # Errors
    ///
    /// Returns [`VmafError::Flush`] on a second call or if the engine fails.
    pub fn flush(&mut self) -> Result<(), VmafError> {
        if self.flushed {
            return Err(VmafError::Flush("session already flushed".to_string()));
        }
        self.engine
            .read_pictures(None, self.ingested)
            .map_err(|error| VmafError::Flush(error.to_string()))?;
        self.flushed = true;
        log::debug!("Flushed scoring session after {} pairs", self.ingested);
        Ok(())
    }

    /// Arithmetic mean of the scores in `range`.
    pub fn pooled_score(&mut self, range: RangeInclusive<u32>) -> Result<f64, VmafError> {
        self.pooled_score_with(PoolMethod::Mean, range)
    }

    /// Pool the scores in `range` with `method`.
    ///
    /// # Errors
    ///
    /// Returns [`VmafError::Pool`] before [`flush`](Self::flush), for an
    /// empty range, or for a range reaching past the last ingested index.
    pub fn pooled_score_with(
        &mut self,
        method: PoolMethod,
        range: RangeInclusive<u32>,
    ) -> Result<f64, VmafError> {
        if !self.flushed {
            return Err(VmafError::Pool(
                "pooled score requested before flush".to_string(),
            ));
        }
        self.engine.score_pooled(method, range)
    }
}
