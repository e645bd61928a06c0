//! Benchmarks for normalization, scoring sessions, and full pipeline runs.
//!
//! Run with: cargo bench
//! Run with all features: cargo bench --all-features
//!
//! The file-backed benchmark requires `tests/fixtures/sample_video.mp4`.

use std::{path::Path, time::Duration};

use criterion::{BenchmarkId, Criterion};
use ffmpeg_next::{format::Pixel, frame::Video as VideoFrame, util::log::Level as LogLevel};
use ffvmaf::{
    FrameNormalizer, FrameSource, ModelConfig, PipelineConfig, ProgressChannel, ProgressLayout,
    ScoringSession, StreamInfo, VmafError, VmafPipeline,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;

fn pattern_frame(width: u32, height: u32, index: u32, distortion: u8) -> VideoFrame {
    let mut frame = VideoFrame::new(Pixel::YUV420P, width, height);
    for plane in 0..3 {
        let stride = frame.stride(plane);
        let rows = if plane == 0 { height } else { height.div_ceil(2) } as usize;
        let value = |x: usize, y: usize| {
            if plane == 0 {
                ((x * 3 + y * 5 + index as usize * 7) % 200 + 16) as u8 ^ distortion
            } else {
                128
            }
        };
        let data = frame.data_mut(plane);
        for y in 0..rows {
            for (x, sample) in data[y * stride..(y + 1) * stride].iter_mut().enumerate() {
                *sample = value(x, y);
            }
        }
    }
    frame
}

struct PatternSource {
    info: StreamInfo,
    produced: u32,
    distortion: u8,
    frame: VideoFrame,
}

impl PatternSource {
    fn new(frames: u32, distortion: u8) -> Self {
        let mut info = StreamInfo::new(
            WIDTH,
            HEIGHT,
            Pixel::YUV420P,
            30.0,
            Duration::from_secs_f64(frames as f64 / 30.0),
        );
        info.frame_count = frames as u64;
        Self {
            info,
            produced: 0,
            distortion,
            frame: VideoFrame::empty(),
        }
    }
}

impl FrameSource for PatternSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_video_frame(&mut self) -> Result<Option<&VideoFrame>, VmafError> {
        if u64::from(self.produced) == self.info.frame_count {
            return Ok(None);
        }
        self.frame = pattern_frame(WIDTH, HEIGHT, self.produced, self.distortion);
        self.produced += 1;
        Ok(Some(&self.frame))
    }
}

fn session() -> ScoringSession {
    ScoringSession::from_model_bytes(ffvmaf::DEFAULT_MODEL.as_bytes(), &ModelConfig::new())
        .unwrap()
}

fn benchmark_normalization(criterion: &mut Criterion) {
    ffmpeg_next::util::log::set_level(LogLevel::Error);

    let config = PipelineConfig::new().with_canonical_resolution(WIDTH, HEIGHT);
    let canonical = pattern_frame(WIDTH, HEIGHT, 0, 0);
    let oversized = pattern_frame(WIDTH * 2, HEIGHT * 2, 0, 0);

    let mut group = criterion.benchmark_group("normalize");
    group.bench_function("canonical passthrough", |bencher| {
        let mut normalizer = FrameNormalizer::new(&config);
        bencher.iter(|| {
            let _frame = normalizer.to_canonical(&canonical).unwrap();
        });
    });
    group.bench_function("bicubic downscale 2x", |bencher| {
        let mut normalizer = FrameNormalizer::new(&config);
        bencher.iter(|| {
            let _frame = normalizer.to_canonical(&oversized).unwrap();
        });
    });
    group.finish();
}

fn benchmark_session_ingest(criterion: &mut Criterion) {
    let reference: Vec<VideoFrame> = (0..30).map(|index| pattern_frame(WIDTH, HEIGHT, index, 0)).collect();
    let test: Vec<VideoFrame> = (0..30).map(|index| pattern_frame(WIDTH, HEIGHT, index, 3)).collect();

    criterion.bench_function("ingest and score 30 pairs", |bencher| {
        bencher.iter(|| {
            let mut session = session();
            for (index, (reference, test)) in reference.iter().zip(&test).enumerate() {
                session.ingest(reference, test, index as u32).unwrap();
            }
            session.flush().unwrap();
            let _pooled = session.pooled_score(0..=29).unwrap();
        });
    });
}

fn benchmark_pipeline(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("pipeline");
    group.sample_size(20);

    for lag in [2, 5] {
        group.bench_with_input(BenchmarkId::new("synthetic 60 pairs, lag", lag), &lag, |bencher, &lag| {
            let pipeline = VmafPipeline::new(
                PipelineConfig::new()
                    .with_canonical_resolution(WIDTH, HEIGHT)
                    .with_score_lag(lag),
            );
            bencher.iter(|| {
                let mut session = session();
                let channel = ProgressChannel::for_frames(60, ProgressLayout::default());
                pipeline
                    .run(
                        &mut session,
                        PatternSource::new(60, 0),
                        PatternSource::new(60, 5),
                        &channel,
                        None,
                    )
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn benchmark_sample_video(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let pipeline = VmafPipeline::new(
        PipelineConfig::new()
            .with_canonical_resolution(640, 360)
            .with_max_frames(30),
    );
    let mut group = criterion.benchmark_group("sample video");
    group.sample_size(10);
    group.bench_function("self comparison, 30 frames", |bencher| {
        bencher.iter(|| {
            let mut session = session();
            let channel = ProgressChannel::for_frames(30, ProgressLayout::default());
            pipeline
                .run_files(&mut session, SAMPLE_VIDEO, SAMPLE_VIDEO, &channel, None)
                .unwrap()
        });
    });
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_normalization,
    benchmark_session_ingest,
    benchmark_pipeline,
    benchmark_sample_video,
);
criterion::criterion_main!(benches);
