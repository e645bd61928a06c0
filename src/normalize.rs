//! Frame normalization to the canonical comparison format and to previews.
//!
//! [`FrameNormalizer::to_canonical`] brings a decoded frame to the canonical
//! resolution in 8-bit planar 4:2:0. Frames that already match are passed
//! through untouched; everything else is resampled with a bicubic kernel.
//! [`FrameNormalizer::to_preview`] then shrinks an *already canonical* frame
//! into a small packed [`PreviewFrame`], so previews show exactly the pixels
//! that were scored.

use ffmpeg_next::{
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::{
    config::{PipelineConfig, PixelFormat, PreviewConfig, Resolution},
    conversion,
    error::VmafError,
};

/// Pixel format of canonical frames.
pub const CANONICAL_PIXEL_FORMAT: Pixel = Pixel::YUV420P;

/// Input geometry a cached scaler was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerKey {
    format: Pixel,
    width: u32,
    height: u32,
}

impl ScalerKey {
    fn of(frame: &VideoFrame) -> Self {
        Self {
            format: frame.format(),
            width: frame.width(),
            height: frame.height(),
        }
    }
}

/// A packed, tightly strided preview image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Packed pixel format of `data`.
    pub pixel_format: PixelFormat,
    /// Row-major pixel data, `width × bytes_per_pixel` bytes per row.
    pub data: Vec<u8>,
}

impl PreviewFrame {
    /// Allocate a zero-filled preview buffer.
    pub fn new(config: &PreviewConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            pixel_format: config.pixel_format,
            data: vec![0; config.buffer_len()],
        }
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel()
    }

    /// Copy the preview into an [`image::DynamicImage`], e.g. to save it.
    pub fn to_image(&self) -> Result<DynamicImage, VmafError> {
        let data = self.data.clone();
        let image = match self.pixel_format {
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(self.width, self.height, data).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(self.width, self.height, data).map(DynamicImage::ImageRgba8)
            }
            PixelFormat::Gray8 => {
                GrayImage::from_raw(self.width, self.height, data).map(DynamicImage::ImageLuma8)
            }
        };
        image.ok_or_else(|| {
            VmafError::ResourceAllocation(format!(
                "{}x{} {:?} preview image ({} bytes)",
                self.width,
                self.height,
                self.pixel_format,
                self.data.len()
            ))
        })
    }
}

/// The four caller-owned extrema preview buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBuffers {
    /// Reference frame of the highest-scoring pair.
    pub max_reference: PreviewFrame,
    /// Test frame of the highest-scoring pair.
    pub max_test: PreviewFrame,
    /// Reference frame of the lowest-scoring pair.
    pub min_reference: PreviewFrame,
    /// Test frame of the lowest-scoring pair.
    pub min_test: PreviewFrame,
}

impl PreviewBuffers {
    /// Allocate four zero-filled buffers with the given geometry.
    pub fn new(config: &PreviewConfig) -> Self {
        Self {
            max_reference: PreviewFrame::new(config),
            max_test: PreviewFrame::new(config),
            min_reference: PreviewFrame::new(config),
            min_test: PreviewFrame::new(config),
        }
    }
}

/// Rescales decoded frames to the canonical format and canonical frames to
/// previews.
///
/// Each normalizer caches one canonical scaler keyed on the input format and
/// size, so a stream that keeps its geometry builds its scaler once. Use one
/// normalizer per stream.
pub struct FrameNormalizer {
    canonical: Resolution,
    preview: PreviewConfig,
    canonical_scaler: Option<(ScalerKey, ScalingContext)>,
    canonical_frame: VideoFrame,
    preview_scaler: Option<ScalingContext>,
    preview_frame: VideoFrame,
}

impl std::fmt::Debug for FrameNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameNormalizer")
            .field("canonical", &self.canonical)
            .field("preview", &self.preview)
            .field(
                "canonical_scaler",
                &self.canonical_scaler.as_ref().map(|(key, _)| key),
            )
            .finish_non_exhaustive()
    }
}

impl FrameNormalizer {
    /// Create a normalizer for the configured canonical and preview geometry.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            canonical: config.canonical,
            preview: config.preview,
            canonical_scaler: None,
            canonical_frame: VideoFrame::empty(),
            preview_scaler: None,
            preview_frame: VideoFrame::empty(),
        }
    }

    /// Canonical resolution this normalizer produces.
    pub fn canonical_resolution(&self) -> Resolution {
        self.canonical
    }

    /// Whether `frame` is already at the canonical resolution and format.
    pub fn is_canonical(&self, frame: &VideoFrame) -> bool {
        frame.format() == CANONICAL_PIXEL_FORMAT
            && frame.width() == self.canonical.width
            && frame.height() == self.canonical.height
    }

    /// Bring `frame` to the canonical resolution and pixel format.
    ///
    /// A frame that is already canonical is returned as-is (same buffer, no
    /// copy). Otherwise the result lives in the normalizer's scratch frame
    /// and is overwritten by the next call.
    ///
    /// # Errors
    ///
    /// - [`VmafError::ResourceAllocation`] if a scaler cannot be created for
    ///   the input format.
    /// - [`VmafError::ScaleError`] if rescaling fails.
    pub fn to_canonical<'a>(&'a mut self, frame: &'a VideoFrame) -> Result<&'a VideoFrame, VmafError> {
        if self.is_canonical(frame) {
            return Ok(frame);
        }

        let key = ScalerKey::of(frame);
        let rebuild = !matches!(&self.canonical_scaler, Some((cached, _)) if *cached == key);
        if rebuild {
            log::debug!(
                "Building canonical scaler {:?} {}x{} -> {:?} {}x{}",
                key.format,
                key.width,
                key.height,
                CANONICAL_PIXEL_FORMAT,
                self.canonical.width,
                self.canonical.height,
            );
            let scaler = ScalingContext::get(
                key.format,
                key.width,
                key.height,
                CANONICAL_PIXEL_FORMAT,
                self.canonical.width,
                self.canonical.height,
                ScalingFlags::BICUBIC,
            )
            .map_err(|error| {
                VmafError::ResourceAllocation(format!(
                    "scaler from {:?} {}x{}: {error}",
                    key.format, key.width, key.height
                ))
            })?;
            self.canonical_scaler = Some((key, scaler));
        }

        let Some((_, scaler)) = self.canonical_scaler.as_mut() else {
            return Err(VmafError::ResourceAllocation("canonical scaler".to_string()));
        };
        scaler
            .run(frame, &mut self.canonical_frame)
            .map_err(|error| VmafError::ScaleError(error.to_string()))?;
        Ok(&self.canonical_frame)
    }

    /// Downsample a canonical frame into `output`.
    ///
    /// `output` is resized to the configured preview geometry if needed.
    ///
    /// # Errors
    ///
    /// Returns [`VmafError::ScaleError`] if `canonical` is not canonical (raw
    /// decoded frames must go through [`to_canonical`](Self::to_canonical)
    /// first) or if rescaling fails.
    pub fn to_preview(
        &mut self,
        canonical: &VideoFrame,
        output: &mut PreviewFrame,
    ) -> Result<(), VmafError> {
        if !self.is_canonical(canonical) {
            return Err(VmafError::ScaleError(format!(
                "preview source must be canonical {}x{} {:?}, got {}x{} {:?}",
                self.canonical.width,
                self.canonical.height,
                CANONICAL_PIXEL_FORMAT,
                canonical.width(),
                canonical.height(),
                canonical.format(),
            )));
        }

        if self.preview_scaler.is_none() {
            let scaler = ScalingContext::get(
                CANONICAL_PIXEL_FORMAT,
                self.canonical.width,
                self.canonical.height,
                self.preview.pixel_format.to_ffmpeg_pixel(),
                self.preview.width,
                self.preview.height,
                ScalingFlags::BICUBIC,
            )
            .map_err(|error| VmafError::ResourceAllocation(format!("preview scaler: {error}")))?;
            self.preview_scaler = Some(scaler);
        }
        let Some(scaler) = self.preview_scaler.as_mut() else {
            return Err(VmafError::ResourceAllocation("preview scaler".to_string()));
        };
        scaler
            .run(canonical, &mut self.preview_frame)
            .map_err(|error| VmafError::ScaleError(error.to_string()))?;

        if output.width != self.preview.width
            || output.height != self.preview.height
            || output.pixel_format != self.preview.pixel_format
        {
            *output = PreviewFrame::new(&self.preview);
        }

        let row_bytes = output.stride();
        let copied = conversion::copy_plane(
            self.preview_frame.data(0),
            self.preview_frame.stride(0),
            &mut output.data,
            row_bytes,
            row_bytes,
            output.height as usize,
        );
        if !copied {
            return Err(VmafError::ScaleError(
                "scaled preview is smaller than its declared geometry".to_string(),
            ));
        }
        Ok(())
    }
}
