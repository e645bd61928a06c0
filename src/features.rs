//! Scoring pictures and the elementary features computed on them.
//!
//! A [`Picture`] is an owned, tightly packed copy of a canonical frame. The
//! engine keeps pictures in its lookahead window after the decoder has
//! reused the frame they were copied from.

use ffmpeg_next::frame::Video as VideoFrame;

use crate::{conversion, error::VmafError, normalize::CANONICAL_PIXEL_FORMAT};

/// Largest value of an 8-bit sample.
const PEAK: f64 = 255.0;

/// An owned 8-bit planar 4:2:0 picture with tightly packed planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    width: u32,
    height: u32,
    planes: [Vec<u8>; 3],
}

impl Picture {
    /// Copy a canonical frame into a new picture.
    ///
    /// Rows are copied one at a time using the frame's stride, so row
    /// padding in the decoded frame never reaches the picture.
    ///
    /// # Errors
    ///
    /// Returns [`VmafError::PictureCopy`] if the frame is not 8-bit planar
    /// 4:2:0 or its planes are shorter than its geometry implies.
    pub fn from_frame(frame: &VideoFrame) -> Result<Self, VmafError> {
        if frame.format() != CANONICAL_PIXEL_FORMAT {
            return Err(VmafError::PictureCopy(format!(
                "expected {CANONICAL_PIXEL_FORMAT:?} frame, got {:?}",
                frame.format()
            )));
        }
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(VmafError::PictureCopy("frame has no pixels".to_string()));
        }

        let mut planes: [Vec<u8>; 3] = Default::default();
        for (index, plane) in planes.iter_mut().enumerate() {
            let (plane_width, plane_height) = plane_dimensions(width, height, index);
            *plane = vec![0; plane_width * plane_height];
            let copied = conversion::copy_plane(
                frame.data(index),
                frame.stride(index),
                plane,
                plane_width,
                plane_width,
                plane_height,
            );
            if !copied {
                return Err(VmafError::PictureCopy(format!(
                    "plane {index} of {width}x{height} frame is truncated"
                )));
            }
        }

        Ok(Self {
            width,
            height,
            planes,
        })
    }

    /// Build a picture from tightly packed planes.
    pub fn from_planes(
        width: u32,
        height: u32,
        luma: Vec<u8>,
        blue_chroma: Vec<u8>,
        red_chroma: Vec<u8>,
    ) -> Result<Self, VmafError> {
        let planes = [luma, blue_chroma, red_chroma];
        for (index, plane) in planes.iter().enumerate() {
            let (plane_width, plane_height) = plane_dimensions(width, height, index);
            if plane.len() != plane_width * plane_height {
                return Err(VmafError::PictureCopy(format!(
                    "plane {index} has {} bytes, {width}x{height} needs {}",
                    plane.len(),
                    plane_width * plane_height
                )));
            }
        }
        Ok(Self {
            width,
            height,
            planes,
        })
    }

    /// Luma width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Luma height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tightly packed plane `index` (0 = Y, 1 = Cb, 2 = Cr).
    pub fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index]
    }
}

/// Width and height of plane `index` of a 4:2:0 picture.
pub(crate) fn plane_dimensions(width: u32, height: u32, index: usize) -> (usize, usize) {
    if index == 0 {
        (width as usize, height as usize)
    } else {
        (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
    }
}

/// Peak signal-to-noise ratio of two planes in dB, capped at `ceiling_db`.
///
/// Identical planes have no noise and score the ceiling.
pub(crate) fn plane_psnr(reference: &[u8], distorted: &[u8], ceiling_db: f64) -> f64 {
    let count = reference.len().min(distorted.len());
    if count == 0 {
        return ceiling_db;
    }
    let squared_error: u64 = reference
        .iter()
        .zip(distorted)
        .map(|(&a, &b)| {
            let difference = a.abs_diff(b) as u64;
            difference * difference
        })
        .sum();
    if squared_error == 0 {
        return ceiling_db;
    }
    let mean_squared_error = squared_error as f64 / count as f64;
    (10.0 * (PEAK * PEAK / mean_squared_error).log10()).min(ceiling_db)
}

/// PSNR of all three planes of a picture pair, in plane order.
pub(crate) fn picture_psnr(reference: &Picture, distorted: &Picture, ceiling_db: f64) -> [f64; 3] {
    #[cfg(feature = "rayon")]
    {
        crate::rayon::picture_psnr(reference, distorted, ceiling_db)
    }
    #[cfg(not(feature = "rayon"))]
    {
        [0, 1, 2].map(|index| {
            plane_psnr(reference.plane(index), distorted.plane(index), ceiling_db)
        })
    }
}

/// Mean absolute luma difference between two consecutive pictures.
pub(crate) fn luma_motion(previous: &Picture, current: &Picture) -> f64 {
    let previous = previous.plane(0);
    let current = current.plane(0);
    let count = previous.len().min(current.len());
    if count == 0 {
        return 0.0;
    }
    let total: u64 = previous
        .iter()
        .zip(current)
        .map(|(&a, &b)| a.abs_diff(b) as u64)
        .sum();
    total as f64 / count as f64
}
