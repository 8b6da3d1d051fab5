//! Content-based weights: local deviation from a smoothed image.
//!
//! `W = F2 * (I - F1 * I)^2`, where `F1` and `F2` are smoothing filters. Regions
//! with fine structure score high; flat or blurred regions score low.

use rayon::prelude::*;

use super::filter::{box_kernel_1d, convolve_separable, gaussian_kernel_1d};
use super::WeightVolume;
use crate::error::Result;
use crate::Volume;

/// Gaussian smoothing with `sigma1`, then Gaussian smoothing of the squared residual with `sigma2`.
pub fn gauss_content(volume: &Volume, sigma1: f32, sigma2: f32) -> Result<WeightVolume> {
    const NAME: &str = "gauss content";
    content(
        volume,
        &gaussian_kernel_1d(sigma1),
        &gaussian_kernel_1d(sigma2),
        NAME,
    )
}

/// Same as [`gauss_content`] with box means of radius `radius1` and `radius2`.
pub fn average_content(volume: &Volume, radius1: usize, radius2: usize) -> Result<WeightVolume> {
    const NAME: &str = "average content";
    content(volume, &box_kernel_1d(radius1), &box_kernel_1d(radius2), NAME)
}

fn content(
    volume: &Volume,
    first: &[f32],
    second: &[f32],
    strategy: &'static str,
) -> Result<WeightVolume> {
    let mut residual = convolve_separable(volume, first, strategy)?;

    residual
        .pixels_mut()
        .par_iter_mut()
        .zip(volume.pixels().par_iter())
        .for_each(|(smoothed, &value)| {
            let diff = value - *smoothed;
            *smoothed = diff * diff;
        });

    convolve_separable(&residual, second, strategy)
}
