//! Internal conversion helpers.
//!
//! Stride-aware plane copying and frame-count estimation shared by the
//! source, normalizer, and scoring modules.

use std::time::Duration;

use ffmpeg_next::Rational;

/// Copy `rows` rows of `row_bytes` bytes between two strided planes.
///
/// FFmpeg frames carry per-row padding, so the source and destination
/// strides generally differ from each other and from `row_bytes`. Each row
/// is stepped independently: `source_stride` through the source and
/// `destination_stride` through the destination. Only `row_bytes` bytes of
/// each row are touched, so padding is never read or written.
///
/// Returns `false` without copying anything if either plane is too short
/// for the requested geometry.
pub(crate) fn copy_plane(
    source: &[u8],
    source_stride: usize,
    destination: &mut [u8],
    destination_stride: usize,
    row_bytes: usize,
    rows: usize,
) -> bool {
    if rows == 0 || row_bytes == 0 {
        return true;
    }
    if source_stride < row_bytes || destination_stride < row_bytes {
        return false;
    }
    let source_needed = (rows - 1) * source_stride + row_bytes;
    let destination_needed = (rows - 1) * destination_stride + row_bytes;
    if source.len() < source_needed || destination.len() < destination_needed {
        return false;
    }

    if source_stride == row_bytes && destination_stride == row_bytes {
        // Both tightly packed: one copy.
        destination[..source_needed].copy_from_slice(&source[..source_needed]);
        return true;
    }

    for row in 0..rows {
        let source_start = row * source_stride;
        let destination_start = row * destination_stride;
        destination[destination_start..destination_start + row_bytes]
            .copy_from_slice(&source[source_start..source_start + row_bytes]);
    }
    true
}

/// Convert an FFmpeg rational to `f64`, or `0.0` if the denominator is zero.
pub(crate) fn rational_to_f64(rational: Rational) -> f64 {
    if rational.denominator() == 0 {
        0.0
    } else {
        rational.numerator() as f64 / rational.denominator() as f64
    }
}

/// Estimate a stream's frame count as `round(frame_rate × duration)`.
pub(crate) fn estimate_frame_count(frames_per_second: f64, duration: Duration) -> u64 {
    if !frames_per_second.is_finite() || frames_per_second <= 0.0 {
        return 0;
    }
    (frames_per_second * duration.as_secs_f64()).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_plane_steps_each_stride_independently() {
        // 3 rows of 2 meaningful bytes, source padded to 4, destination to 3.
        let source = [1, 2, 0xAA, 0xAA, 3, 4, 0xAA, 0xAA, 5, 6];
        let mut destination = [0u8; 8];

        assert!(copy_plane(&source, 4, &mut destination, 3, 2, 3));
        assert_eq!(destination, [1, 2, 0, 3, 4, 0, 5, 6]);
    }

    #[test]
    fn copy_plane_rejects_short_source() {
        let source = [1, 2, 3];
        let mut destination = [0u8; 8];
        assert!(!copy_plane(&source, 4, &mut destination, 4, 2, 2));
        assert_eq!(destination, [0u8; 8]);
    }

    #[test]
    fn estimate_rounds_to_nearest_frame() {
        assert_eq!(estimate_frame_count(29.97, Duration::from_secs(10)), 300);
        assert_eq!(estimate_frame_count(25.0, Duration::from_millis(2_400)), 60);
        assert_eq!(estimate_frame_count(0.0, Duration::from_secs(10)), 0);
    }

    #[test]
    fn zero_denominator_rational_is_zero() {
        assert_eq!(rational_to_f64(Rational::new(30, 0)), 0.0);
        assert_eq!(rational_to_f64(Rational::new(30_000, 1_001)), 30_000.0 / 1_001.0);
    }
}
