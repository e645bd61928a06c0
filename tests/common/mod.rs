//! Shared helpers for integration tests.
//!
//! Most pipeline tests run on [`SyntheticSource`], which generates small
//! 4:2:0 frames in memory, so they need no fixture files.

#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Packet, Rational,
    codec::{Flags as CodecFlags, Id, context::Context as CodecContext},
    format::{Flags as FormatFlags, Pixel},
    frame::Video as VideoFrame,
};
use ffvmaf::{
    FrameSource, PipelineConfig, PixelFormat, PreviewConfig, StreamInfo, VmafError,
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 36;
pub const FRAMES_PER_SECOND: f64 = 25.0;

/// Pipeline configuration with a small canonical geometry.
pub fn small_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_canonical_resolution(WIDTH, HEIGHT)
        .with_preview(PreviewConfig {
            width: 32,
            height: 18,
            pixel_format: PixelFormat::Rgb8,
        })
}

/// A model whose only features are luma PSNR and motion consistency.
pub fn model_json(lookahead: u32) -> String {
    format!(
        r#"{{
            "name": "test_model",
            "score_range": {{ "min": 0.0, "max": 100.0 }},
            "lookahead": {lookahead},
            "psnr_ceiling_db": 60.0,
            "motion_tolerance": 8.0,
            "features": [
                {{ "name": "psnr_y", "weight": 0.8 }},
                {{ "name": "motion_consistency", "weight": 0.2 }}
            ],
            "clip": true
        }}"#
    )
}

/// Luma sample of the generated pattern.
pub fn luma_at(x: usize, y: usize, index: u32) -> u8 {
    ((x * 3 + y * 5 + index as usize * 7) % 200 + 16) as u8
}

/// A generated 4:2:0 frame. `distortion` is added to every luma sample.
pub fn yuv_frame(width: u32, height: u32, index: u32, distortion: u8) -> VideoFrame {
    let mut frame = VideoFrame::new(Pixel::YUV420P, width, height);
    for plane in 0..3 {
        let stride = frame.stride(plane);
        let (plane_width, plane_height) = if plane == 0 {
            (width as usize, height as usize)
        } else {
            (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
        };
        let data = frame.data_mut(plane);
        for y in 0..plane_height {
            for x in 0..plane_width {
                data[y * stride + x] = if plane == 0 {
                    luma_at(x, y, index).saturating_add(distortion)
                } else {
                    128
                };
            }
        }
    }
    frame.set_pts(Some(index as i64));
    frame
}

/// A [`FrameSource`] producing generated frames.
pub struct SyntheticSource {
    info: StreamInfo,
    available: u32,
    produced: u32,
    distortion: fn(u32) -> u8,
    fail_at: Option<u32>,
    delay: Duration,
    frame: VideoFrame,
}

impl SyntheticSource {
    /// A source of `frames` frames whose declared frame count matches.
    pub fn new(width: u32, height: u32, frames: u32) -> Self {
        let mut info = StreamInfo::new(
            width,
            height,
            Pixel::YUV420P,
            FRAMES_PER_SECOND,
            Duration::from_secs_f64(frames as f64 / FRAMES_PER_SECOND),
        );
        info.frame_count = frames as u64;
        info.codec = "synthetic".to_string();
        Self {
            info,
            available: frames,
            produced: 0,
            distortion: |_| 0,
            fail_at: None,
            delay: Duration::ZERO,
            frame: VideoFrame::empty(),
        }
    }

    /// Canonical-size source.
    pub fn canonical(frames: u32) -> Self {
        Self::new(WIDTH, HEIGHT, frames)
    }

    /// Declare a different frame count than the source will produce.
    pub fn declaring(mut self, frame_count: u64) -> Self {
        self.info.frame_count = frame_count;
        self
    }

    /// Add a per-frame luma distortion.
    pub fn distorted(mut self, distortion: fn(u32) -> u8) -> Self {
        self.distortion = distortion;
        self
    }

    /// Fail to decode the frame at `index`.
    pub fn failing_at(mut self, index: u32) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Sleep for `delay` before producing each frame.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn produced(&self) -> u32 {
        self.produced
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_video_frame(&mut self) -> Result<Option<&VideoFrame>, VmafError> {
        if self.fail_at == Some(self.produced) {
            return Err(VmafError::VideoDecodeError(format!(
                "synthetic failure at frame {}",
                self.produced
            )));
        }
        if self.produced == self.available {
            return Ok(None);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let distortion = (self.distortion)(self.produced);
        self.frame = yuv_frame(self.info.width, self.info.height, self.produced, distortion);
        self.produced += 1;
        Ok(Some(&self.frame))
    }
}

/// Distortion that varies with the frame index, so scores differ per frame.
pub fn varying_distortion(index: u32) -> u8 {
    [0, 6, 12, 3][(index % 4) as usize]
}

/// Encode `frames` generated frames as MPEG-4 Part 2 in AVI at `path`.
pub fn encode_clip(
    path: &Path,
    width: u32,
    height: u32,
    frames: u32,
) -> Result<(), ffmpeg_next::Error> {
    ffmpeg_next::init()?;
    let time_base = Rational::new(1, FRAMES_PER_SECOND as i32);

    let mut output = ffmpeg_next::format::output(path)?;
    let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);
    let codec =
        ffmpeg_next::encoder::find(Id::MPEG4).ok_or(ffmpeg_next::Error::EncoderNotFound)?;

    let mut stream = output.add_stream(codec)?;
    let stream_index = stream.index();
    let mut encoder = CodecContext::from_parameters(stream.parameters())?
        .encoder()
        .video()?;
    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_time_base(time_base);
    encoder.set_frame_rate(Some(Rational::new(FRAMES_PER_SECOND as i32, 1)));
    encoder.set_bit_rate(4_000_000);
    if needs_global_header {
        encoder.set_flags(CodecFlags::GLOBAL_HEADER);
    }
    let mut encoder = encoder.open_as(codec)?;
    stream.set_parameters(&encoder);
    stream.set_time_base(time_base);

    output.write_header()?;
    let stream_time_base = output
        .stream(stream_index)
        .map(|stream| stream.time_base())
        .ok_or(ffmpeg_next::Error::StreamNotFound)?;

    let mut packet = Packet::empty();
    for index in 0..frames {
        encoder.send_frame(&yuv_frame(width, height, index, 0))?;
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(stream_index);
            packet.rescale_ts(time_base, stream_time_base);
            packet.write_interleaved(&mut output)?;
        }
    }
    encoder.send_eof()?;
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        packet.rescale_ts(time_base, stream_time_base);
        packet.write_interleaved(&mut output)?;
    }
    output.write_trailer()
}

/// A freshly encoded canonical-size clip inside a temporary directory.
pub fn generated_clip(frames: u32) -> (tempfile::TempDir, PathBuf) {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join(format!("clip_{frames}.avi"));
    encode_clip(&path, WIDTH, HEIGHT, frames).expect("Failed to encode test clip");
    (directory, path)
}
