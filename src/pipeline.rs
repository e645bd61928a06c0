//! The dual-stream scoring pipeline.
//!
//! [`VmafPipeline::run`] pulls one frame from each [`FrameSource`] per
//! iteration, brings both to the canonical format, ingests the pair into a
//! [`ScoringSession`], publishes lagged scores, tracks extrema, and reports
//! progress. When the iteration bound is reached or a stream runs dry it
//! flushes the session, scores the remaining tail, and publishes the pooled
//! score.
//!
//! Cancellation is polled through the [`ProgressChannel`] every
//! [`cancellation_poll_interval`](PipelineConfig::with_cancellation_poll_interval)
//! iterations. A cancelled run neither flushes nor pools.
//!
//! # Example
//!
//! ```no_run
//! use ffvmaf::{
//!     ModelConfig, PipelineConfig, PreviewBuffers, ProgressChannel, ProgressLayout,
//!     ScoringSession, VmafPipeline,
//! };
//!
//! let config = PipelineConfig::new();
//! let mut session =
//!     ScoringSession::from_model_bytes(ffvmaf::DEFAULT_MODEL.as_bytes(), &ModelConfig::new())?;
//! let channel = ProgressChannel::new(4096, ProgressLayout::default());
//! let mut previews = PreviewBuffers::new(&config.preview());
//!
//! let report = VmafPipeline::new(config).run_files(
//!     &mut session,
//!     "reference.mp4",
//!     "distorted.mp4",
//!     &channel,
//!     Some(&mut previews),
//! )?;
//! println!("pooled score {:.3} over {} frames", report.pooled_score, report.frames_processed);
//! # Ok::<(), ffvmaf::VmafError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::{
    config::{PipelineConfig, PoolMethod},
    engine::ScoringEngine,
    error::VmafError,
    extrema::{ExtremaSnapshot, ExtremaTracker, LagWindow, ScoreRecord},
    model::ModelConfig,
    normalize::{FrameNormalizer, PreviewBuffers},
    progress::{ProgressChannel, ProgressTracker, frames_per_second},
    scoring::ScoringSession,
    source::{FrameSource, MediaSource},
    status::CompletionStatus,
};

/// One of the two compared streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSide {
    /// The pristine reference stream.
    Reference,
    /// The distorted stream under test.
    Test,
}

/// Which streams ran out of frames in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    /// Both streams produced a frame.
    Neither,
    /// Both streams are exhausted.
    Both,
    /// Only the reference stream is exhausted.
    ReferenceOnly,
    /// Only the test stream is exhausted.
    TestOnly,
}

impl StreamEnd {
    /// Classify an iteration from whether each side produced a frame.
    pub fn from_decoded(reference: bool, test: bool) -> Self {
        match (reference, test) {
            (true, true) => StreamEnd::Neither,
            (false, false) => StreamEnd::Both,
            (false, true) => StreamEnd::ReferenceOnly,
            (true, false) => StreamEnd::TestOnly,
        }
    }
}

/// Why the iteration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The planned number of frame pairs was processed.
    IterationBound,
    /// At least one stream ran out of frames first.
    StreamEnded(StreamEnd),
}

impl Display for Termination {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Termination::IterationBound => write!(f, "iteration bound reached"),
            Termination::StreamEnded(StreamEnd::Both) => write!(f, "both streams ended"),
            Termination::StreamEnded(StreamEnd::ReferenceOnly) => {
                write!(f, "reference stream ended early")
            }
            Termination::StreamEnded(StreamEnd::TestOnly) => write!(f, "test stream ended early"),
            Termination::StreamEnded(StreamEnd::Neither) => write!(f, "streams still running"),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Planned number of frame pairs.
    pub frames_to_process: u32,
    /// Frame pairs actually ingested and scored.
    pub frames_processed: u32,
    /// Why iteration stopped.
    pub termination: Termination,
    /// The stream whose length bounded the run, if one did.
    pub limiting_stream: Option<StreamSide>,
    /// Scoring lag in effect.
    pub lag: u32,
    /// Per-frame scores, indexed by frame pair.
    pub scores: Vec<f64>,
    /// Pooled score over `[0, frames_processed)`.
    pub pooled_score: f64,
    /// Method used for `pooled_score`.
    pub pool_method: PoolMethod,
    /// Highest- and lowest-scoring pairs.
    pub extrema: ExtremaSnapshot,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Average throughput in frame pairs per second.
    pub frames_per_second: f64,
}

impl PipelineReport {
    /// Always [`CompletionStatus::Success`]; failures are returned as errors.
    pub fn status(&self) -> CompletionStatus {
        CompletionStatus::Success
    }
}

/// Drives a reference and a test stream through a scoring session.
#[derive(Debug, Clone, Default)]
pub struct VmafPipeline {
    config: PipelineConfig,
}

impl VmafPipeline {
    /// Create a pipeline with `config`.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The pipeline's configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open two media files and score them.
    ///
    /// # Errors
    ///
    /// Open failures are [`VmafError::FileOpen`], [`VmafError::NoVideoStream`]
    /// or [`VmafError::InvalidDimensions`]; see [`run`](Self::run) for the rest.
    pub fn run_files<E: ScoringEngine>(
        &self,
        session: &mut ScoringSession<E>,
        reference: impl AsRef<Path>,
        test: impl AsRef<Path>,
        channel: &ProgressChannel,
        previews: Option<&mut PreviewBuffers>,
    ) -> Result<PipelineReport, VmafError> {
        let reference = MediaSource::open(reference)?;
        let test = MediaSource::open(test)?;
        self.run(session, reference, test, channel, previews)
    }

    /// Score two containers held in memory.
    pub fn run_buffers<E: ScoringEngine>(
        &self,
        session: &mut ScoringSession<E>,
        reference: Vec<u8>,
        test: Vec<u8>,
        channel: &ProgressChannel,
        previews: Option<&mut PreviewBuffers>,
    ) -> Result<PipelineReport, VmafError> {
        let reference = MediaSource::from_bytes(reference)?;
        let test = MediaSource::from_bytes(test)?;
        self.run(session, reference, test, channel, previews)
    }

    /// Score `test` against `reference`.
    ///
    /// The number of pairs to process is the smaller of the two estimated
    /// frame counts, capped at [`max_frames`](PipelineConfig::with_max_frames).
    /// A stream that ends early stops iteration without an error.
    ///
    /// # Errors
    ///
    /// - [`VmafError::NoCommonFrames`] if either stream has no estimated frames.
    /// - [`VmafError::NoFramesDecoded`] if both streams end before the first pair.
    /// - [`VmafError::ProgressBufferTooSmall`] if `channel` cannot hold the run.
    /// - [`VmafError::Cancelled`] if cancellation was requested.
    /// - Decode, scaling, and scoring errors from the stage that failed.
    pub fn run<E, R, T>(
        &self,
        session: &mut ScoringSession<E>,
        mut reference: R,
        mut test: T,
        channel: &ProgressChannel,
        previews: Option<&mut PreviewBuffers>,
    ) -> Result<PipelineReport, VmafError>
    where
        E: ScoringEngine,
        R: FrameSource,
        T: FrameSource,
    {
        let config = &self.config;
        let reference_count = reference.info().frame_count;
        let test_count = test.info().frame_count;
        let common = reference_count.min(test_count);
        if common == 0 {
            return Err(VmafError::NoCommonFrames {
                reference: reference_count,
                test: test_count,
            });
        }
        let frames_to_process = common.min(config.max_frames as u64) as u32;
        let bounded_by = bounding_stream(reference_count, test_count, config.max_frames);

        channel.ensure_capacity(frames_to_process)?;
        channel.set_total(frames_to_process);
        channel.set_processed(0);
        channel.set_throughput(0.0);

        let lag = match config.score_lag {
            Some(requested) => session.set_lag(requested),
            None => session.lag(),
        };
        log::info!(
            "Scoring up to {frames_to_process} frame pairs (reference ~{reference_count}, test ~{test_count}), lag {lag}"
        );

        let started = Instant::now();
        let mut reference_normalizer = FrameNormalizer::new(config);
        let mut test_normalizer = FrameNormalizer::new(config);
        let mut publisher = Publisher {
            channel,
            extrema: ExtremaTracker::new(config),
            window: previews.is_some().then(|| LagWindow::new(lag)),
            previews,
            scores: Vec::with_capacity(frames_to_process as usize),
            tracker: ProgressTracker::new(
                config.progress.clone(),
                frames_to_process,
                config.batch_size,
                started,
            ),
        };

        let mut termination = Termination::IterationBound;
        for index in 0..frames_to_process {
            if index % config.cancellation_poll_interval == 0 && channel.take_cancel() {
                log::info!("Cancellation requested after {index} frame pairs");
                return Err(VmafError::Cancelled {
                    frames_processed: index,
                });
            }

            let reference_frame = reference.next_video_frame()?;
            let test_frame = test.next_video_frame()?;
            let (reference_frame, test_frame) = match (reference_frame, test_frame) {
                (Some(reference_frame), Some(test_frame)) => (reference_frame, test_frame),
                (reference_frame, test_frame) => {
                    let end =
                        StreamEnd::from_decoded(reference_frame.is_some(), test_frame.is_some());
                    if end != StreamEnd::Both {
                        log::warn!(
                            "Streams desynchronised at frame pair {index}: {end:?}; stopping early"
                        );
                    }
                    termination = Termination::StreamEnded(end);
                    break;
                }
            };

            let reference_canonical = reference_normalizer.to_canonical(reference_frame)?;
            let test_canonical = test_normalizer.to_canonical(test_frame)?;
            session.ingest(reference_canonical, test_canonical, index)?;
            if let Some(window) = publisher.window.as_mut() {
                window.push(index, reference_canonical, test_canonical);
            }

            if index >= lag {
                publisher.publish(session, index - lag)?;
            }

            let processed = index + 1;
            channel.set_processed(processed);
            if processed % config.throughput_interval == 0 {
                channel.set_throughput(frames_per_second(processed, started.elapsed()));
            }
            publisher.tracker.advance();
        }

        let frames_processed = session.ingested();
        session.flush()?;
        for index in publisher.scores.len() as u32..frames_processed {
            publisher.publish(session, index)?;
        }

        if frames_processed == 0 {
            return Err(VmafError::NoFramesDecoded {
                reference: reference_count,
                test: test_count,
            });
        }
        let pooled_score =
            session.pooled_score_with(config.pool_method, 0..=frames_processed - 1)?;
        let extrema = publisher.extrema.snapshot();
        channel.set_summary(
            frames_to_process,
            pooled_score,
            extrema.max.map_or(0.0, |record| record.score),
            extrema.min.map_or(0.0, |record| record.score),
        )?;

        let elapsed = started.elapsed();
        let throughput = frames_per_second(frames_processed, elapsed);
        channel.set_throughput(throughput);
        publisher.tracker.finish();

        let limiting_stream = match termination {
            Termination::StreamEnded(StreamEnd::ReferenceOnly) => Some(StreamSide::Reference),
            Termination::StreamEnded(StreamEnd::TestOnly) => Some(StreamSide::Test),
            _ => bounded_by,
        };

        log::info!(
            "Scored {frames_processed} frame pairs in {:.2}s ({termination}): pooled {pooled_score:.4}",
            elapsed.as_secs_f64()
        );

        Ok(PipelineReport {
            frames_to_process,
            frames_processed,
            termination,
            limiting_stream,
            lag,
            scores: publisher.scores,
            pooled_score,
            pool_method: config.pool_method,
            extrema,
            elapsed,
            frames_per_second: throughput,
        })
    }
}

/// The stream whose estimated length set the iteration bound, if the
/// frame ceiling did not.
fn bounding_stream(reference: u64, test: u64, max_frames: u32) -> Option<StreamSide> {
    if reference.min(test) > max_frames as u64 || reference == test {
        None
    } else if reference < test {
        Some(StreamSide::Reference)
    } else {
        Some(StreamSide::Test)
    }
}

/// Per-run sinks a ready score is published to.
struct Publisher<'a> {
    channel: &'a ProgressChannel,
    extrema: ExtremaTracker,
    window: Option<LagWindow>,
    previews: Option<&'a mut PreviewBuffers>,
    scores: Vec<f64>,
    tracker: ProgressTracker,
}

impl Publisher<'_> {
    fn publish<E: ScoringEngine>(
        &mut self,
        session: &mut ScoringSession<E>,
        index: u32,
    ) -> Result<(), VmafError> {
        let score = session.score_at(index)?;
        self.channel.set_score(index, score)?;
        self.scores.push(score);

        let frames = self.window.as_ref().and_then(|window| window.get(index));
        match (self.previews.as_deref_mut(), frames) {
            (Some(previews), Some((reference, test))) => {
                self.extrema.observe(index, score, reference, test, previews)?;
            }
            _ => {
                self.extrema.observe_score(index, score);
            }
        }
        self.tracker.record_score(ScoreRecord { index, score });
        Ok(())
    }
}

/// Load a model, open both files, and score them, returning only the
/// completion status.
///
/// The model is bound before either file is opened, so an unusable model
/// fails without touching the inputs. Progress, scores and summaries are
/// published to `channel`; extrema previews to `previews`.
pub fn compute_scores(
    model_bytes: &[u8],
    model_config: &ModelConfig,
    reference: impl AsRef<Path>,
    test: impl AsRef<Path>,
    config: &PipelineConfig,
    channel: &ProgressChannel,
    previews: Option<&mut PreviewBuffers>,
) -> CompletionStatus {
    let outcome = ScoringSession::from_model_bytes(model_bytes, model_config).and_then(
        |mut session| {
            VmafPipeline::new(config.clone()).run_files(
                &mut session,
                reference,
                test,
                channel,
                previews,
            )
        },
    );
    match outcome {
        Ok(report) => report.status(),
        Err(error) => {
            let status = error.status();
            if status == CompletionStatus::Cancelled {
                log::info!("{error}");
            } else {
                log::error!("{error}");
            }
            status
        }
    }
}
