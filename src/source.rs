//! Decoded video frame sources.
//!
//! A [`FrameSource`] yields decoded frames of one video stream in
//! presentation order, one per call. [`MediaSource`] is the FFmpeg-backed
//! implementation: it demuxes a file (or an in-memory container), selects the
//! first decodable video stream, and runs the decoder's send/receive loop
//! until exactly one new frame is available.
//!
//! # Example
//!
//! ```no_run
//! use ffvmaf::{FrameSource, MediaSource};
//!
//! let mut source = MediaSource::open("reference.mp4")?;
//! println!("~{} frames", source.info().frame_count);
//! while let Some(frame) = source.next_video_frame()? {
//!     println!("{}x{} pts={:?}", frame.width(), frame.height(), frame.pts());
//! }
//! # Ok::<(), ffvmaf::VmafError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
};

use crate::{conversion, error::VmafError, memory_input::MemoryInput};

/// Consecutive unreadable packets tolerated before decoding is abandoned.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 64;

/// What stream selection does with one container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamChoice {
    /// Not a video stream.
    Ignore,
    /// A video stream no decoder is available for.
    Unsupported,
    /// A decodable video stream.
    Select,
}

/// Decoder availability is only consulted for video streams, so audio,
/// subtitle and data tracks never look like unsupported codecs.
fn classify_stream(medium: Type, has_decoder: impl FnOnce() -> bool) -> StreamChoice {
    if medium != Type::Video {
        StreamChoice::Ignore
    } else if has_decoder() {
        StreamChoice::Select
    } else {
        StreamChoice::Unsupported
    }
}

/// Metadata of the video stream a source decodes.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct StreamInfo {
    /// Index of the selected stream within its container.
    pub stream_index: usize,
    /// Declared frame width in pixels.
    pub width: u32,
    /// Declared frame height in pixels.
    pub height: u32,
    /// Declared pixel format of decoded frames.
    pub pixel_format: Pixel,
    /// Declared (real base) frame rate.
    pub frames_per_second: f64,
    /// Container duration.
    pub duration: Duration,
    /// Estimated frame count, `round(frames_per_second × duration)`.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
}

impl StreamInfo {
    /// Build stream info, estimating the frame count from rate and duration.
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: Pixel,
        frames_per_second: f64,
        duration: Duration,
    ) -> Self {
        Self {
            stream_index: 0,
            width,
            height,
            pixel_format,
            frames_per_second,
            duration,
            frame_count: conversion::estimate_frame_count(frames_per_second, duration),
            codec: "unknown".to_string(),
        }
    }
}

/// A pull-based source of decoded video frames.
///
/// The returned frame borrows the source's reusable decode buffer: it is
/// valid until the next call to [`next_video_frame`](FrameSource::next_video_frame),
/// which overwrites it. Calls are not idempotent; each one advances the
/// underlying stream.
pub trait FrameSource {
    /// Metadata of the decoded stream.
    fn info(&self) -> &StreamInfo;

    /// Decode the next video frame.
    ///
    /// Returns `Ok(None)` once the stream is exhausted; end-of-stream is a
    /// normal termination signal, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VmafError::VideoDecodeError`] if the decoder rejects a packet
    /// or fails while producing a frame.
    fn next_video_frame(&mut self) -> Result<Option<&VideoFrame>, VmafError>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn info(&self) -> &StreamInfo {
        (**self).info()
    }

    fn next_video_frame(&mut self) -> Result<Option<&VideoFrame>, VmafError> {
        (**self).next_video_frame()
    }
}

enum Demuxer {
    File(Input),
    Memory(MemoryInput),
}

impl Demuxer {
    fn input(&self) -> &Input {
        match self {
            Demuxer::File(input) => input,
            Demuxer::Memory(input) => input,
        }
    }

    fn input_mut(&mut self) -> &mut Input {
        match self {
            Demuxer::File(input) => input,
            Demuxer::Memory(input) => input,
        }
    }
}

/// FFmpeg-backed [`FrameSource`] over one media input.
pub struct MediaSource {
    demuxer: Demuxer,
    decoder: VideoDecoder,
    info: StreamInfo,
    frame: VideoFrame,
    eof_sent: bool,
    exhausted: bool,
    read_errors: u32,
    path: PathBuf,
}

impl Debug for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaSource")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("eof_sent", &self.eof_sent)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl MediaSource {
    /// Open a media file and prepare a decoder for its first video stream.
    ///
    /// # Errors
    ///
    /// - [`VmafError::FileOpen`] if the file is missing or not a container
    ///   FFmpeg can parse.
    /// - [`VmafError::NoVideoStream`] if no stream is both video and
    ///   decodable.
    /// - [`VmafError::InvalidDimensions`] if the stream declares no
    ///   resolution.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VmafError> {
        let path = path.as_ref().to_path_buf();
        crate::ffmpeg::init()?;

        log::debug!("Opening media file: {}", path.display());
        let input = ffmpeg_next::format::input(&path).map_err(|error| VmafError::FileOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        Self::from_demuxer(Demuxer::File(input), path)
    }

    /// Open a container held entirely in memory.
    ///
    /// The bytes are read through a custom AVIO adapter with seek support,
    /// so formats whose index sits at the end of the file (e.g. MP4 with a
    /// trailing `moov` box) work as well as streamable ones.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, VmafError> {
        crate::ffmpeg::init()?;
        log::debug!("Opening in-memory media input ({} bytes)", data.len());
        let input = MemoryInput::open(data)?;
        Self::from_demuxer(Demuxer::Memory(input), PathBuf::from("<memory>"))
    }

    fn from_demuxer(demuxer: Demuxer, path: PathBuf) -> Result<Self, VmafError> {
        let input = demuxer.input();

        let duration_microseconds = input.duration();
        let duration = if duration_microseconds > 0 {
            Duration::from_micros(duration_microseconds as u64)
        } else {
            Duration::ZERO
        };

        // First stream that is video and has a decoder. Streams whose codec
        // is unsupported are skipped rather than failing the open.
        let mut selected = None;
        for stream in input.streams() {
            let parameters = stream.parameters();
            let has_decoder = || ffmpeg_next::codec::decoder::find(parameters.id()).is_some();
            match classify_stream(parameters.medium(), has_decoder) {
                StreamChoice::Ignore => continue,
                StreamChoice::Unsupported => {
                    log::warn!(
                        "Skipping video stream {} in {}: unsupported codec {:?}",
                        stream.index(),
                        path.display(),
                        parameters.id(),
                    );
                    continue;
                }
                StreamChoice::Select => {}
            }
            selected = Some((stream.index(), parameters, stream.rate(), stream.avg_frame_rate()));
            break;
        }

        let (stream_index, parameters, rate, average_rate) =
            selected.ok_or_else(|| VmafError::NoVideoStream(path.clone()))?;

        let decoder_context = CodecContext::from_parameters(parameters).map_err(|error| {
            VmafError::ResourceAllocation(format!(
                "decoder context for stream {stream_index} of {}: {error}",
                path.display()
            ))
        })?;
        let decoder = decoder_context.decoder().video().map_err(|error| {
            VmafError::ResourceAllocation(format!(
                "video decoder for stream {stream_index} of {}: {error}",
                path.display()
            ))
        })?;

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(VmafError::InvalidDimensions {
                path,
                width,
                height,
            });
        }

        let mut frames_per_second = conversion::rational_to_f64(rate);
        if frames_per_second <= 0.0 {
            frames_per_second = conversion::rational_to_f64(average_rate);
        }

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = StreamInfo {
            stream_index,
            width,
            height,
            pixel_format: decoder.format(),
            frames_per_second,
            duration,
            frame_count: conversion::estimate_frame_count(frames_per_second, duration),
            codec,
        };

        log::info!(
            "Opened {}: stream {}, {}x{} {:?}, {:.3} fps, {:.2}s, ~{} frames, codec={}",
            path.display(),
            info.stream_index,
            info.width,
            info.height,
            info.pixel_format,
            info.frames_per_second,
            info.duration.as_secs_f64(),
            info.frame_count,
            info.codec,
        );

        Ok(Self {
            demuxer,
            decoder,
            info,
            frame: VideoFrame::empty(),
            eof_sent: false,
            exhausted: false,
            read_errors: 0,
            path,
        })
    }

    /// Path this source was opened from (`<memory>` for byte buffers).
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for MediaSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_video_frame(&mut self) -> Result<Option<&VideoFrame>, VmafError> {
        if self.exhausted {
            return Ok(None);
        }

        loop {
            // Drain a frame the decoder already holds before feeding more input.
            match self.decoder.receive_frame(&mut self.frame) {
                Ok(()) => return Ok(Some(&self.frame)),
                Err(FfmpegError::Eof) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(FfmpegError::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {}
                Err(error) => {
                    self.exhausted = true;
                    return Err(VmafError::VideoDecodeError(format!(
                        "{}: {error}",
                        self.path.display()
                    )));
                }
            }

            if self.eof_sent {
                // EOF was sent and the decoder reports no more frames.
                self.exhausted = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(self.demuxer.input_mut()) {
                Ok(()) => {
                    self.read_errors = 0;
                    if packet.stream() != self.info.stream_index {
                        continue;
                    }
                    self.decoder.send_packet(&packet).map_err(|error| {
                        self.exhausted = true;
                        VmafError::VideoDecodeError(format!(
                            "{}: rejected packet: {error}",
                            self.path.display()
                        ))
                    })?;
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof().map_err(|error| {
                        VmafError::VideoDecodeError(format!(
                            "{}: could not signal end of stream: {error}",
                            self.path.display()
                        ))
                    })?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    // Demux hiccups are not fatal; the next read usually recovers.
                    self.read_errors += 1;
                    if self.read_errors > MAX_CONSECUTIVE_READ_ERRORS {
                        self.exhausted = true;
                        return Err(VmafError::VideoDecodeError(format!(
                            "{}: demuxer keeps failing: {error}",
                            self.path.display()
                        )));
                    }
                    log::debug!("Skipping unreadable packet in {}: {error}", self.path.display());
                }
            }
        }
    }
}
