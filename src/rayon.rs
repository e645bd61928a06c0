//! Parallel feature computation.
//!
//! With the `rayon` feature enabled the three planes of a picture pair are
//! measured on the rayon thread pool. Ingestion itself stays strictly
//! ordered; only the work inside one ingest call is spread out.

use ::rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::features::{Picture, plane_psnr};

/// Per-plane PSNR of a picture pair, computed in parallel.
pub(crate) fn picture_psnr(reference: &Picture, distorted: &Picture, ceiling_db: f64) -> [f64; 3] {
    let values: Vec<f64> = (0..3usize)
        .into_par_iter()
        .map(|index| plane_psnr(reference.plane(index), distorted.plane(index), ceiling_db))
        .collect();
    [values[0], values[1], values[2]]
}
