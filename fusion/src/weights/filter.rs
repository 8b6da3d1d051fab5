//! Separable 3D filters with clamp-to-edge borders, used by the content weights.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::Volume;

/// Normalized 1D Gaussian kernel with radius `ceil(3 * sigma)`.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = (3.0 * sigma).ceil() as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..2 * radius + 1)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Uniform kernel averaging `2 * radius + 1` samples.
pub fn box_kernel_1d(radius: usize) -> Vec<f32> {
    let size = 2 * radius + 1;
    vec![1.0 / size as f32; size]
}

/// Allocates a zeroed volume, reporting failure as a weight allocation error.
pub(crate) fn try_volume(dims: [usize; 3], strategy: &'static str) -> Result<Volume> {
    Volume::try_new_default(dims[0], dims[1], dims[2]).map_err(|e| {
        Error::WeightAllocationFailure {
            strategy,
            voxels: e.len,
        }
    })
}

/// Convolves `src` with `kernel` along x, y and z in turn.
pub fn convolve_separable(src: &Volume, kernel: &[f32], strategy: &'static str) -> Result<Volume> {
    let mut a = try_volume(src.dims(), strategy)?;
    let mut b = try_volume(src.dims(), strategy)?;

    convolve_axis(src, &mut a, 0, kernel);
    convolve_axis(&a, &mut b, 1, kernel);
    convolve_axis(&b, &mut a, 2, kernel);

    Ok(a)
}

/// One 1D pass along `axis`, parallel over output z-planes.
fn convolve_axis(src: &Volume, dst: &mut Volume, axis: usize, kernel: &[f32]) {
    debug_assert_eq!(src.dims(), dst.dims());
    if dst.is_empty() {
        return;
    }

    let [width, height, _] = src.dims();
    let len = src.dims()[axis] as i64;
    let radius = (kernel.len() / 2) as i64;
    let plane_len = dst.plane_len();

    dst.pixels_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(z, plane)| {
            for y in 0..height {
                for x in 0..width {
                    let pos = [x, y, z];
                    let center = pos[axis] as i64;
                    let mut sum = 0.0f32;
                    for (k, &coeff) in kernel.iter().enumerate() {
                        let mut p = pos;
                        p[axis] = (center + k as i64 - radius).clamp(0, len - 1) as usize;
                        sum += coeff * src[(p[0], p[1], p[2])];
                    }
                    plane[y * width + x] = sum;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_kernel_normalized_and_symmetric() {
        let kernel = gaussian_kernel_1d(1.5);
        assert_eq!(kernel.len(), 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..kernel.len() / 2 {
            assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-7);
        }
        assert!(kernel[5] > kernel[4]);
    }

    #[test]
    #[should_panic(expected = "Sigma must be positive")]
    fn test_gaussian_kernel_rejects_zero_sigma() {
        gaussian_kernel_1d(0.0);
    }

    #[test]
    fn test_constant_volume_is_preserved() {
        let v = Volume::new_filled(5, 4, 3, 7.0);
        for kernel in [gaussian_kernel_1d(2.0), box_kernel_1d(3)] {
            let out = convolve_separable(&v, &kernel, "test").unwrap();
            assert!(out.iter().all(|&x| (x - 7.0).abs() < 1e-4));
        }
    }

    #[test]
    fn test_box_mean_of_impulse() {
        let mut v = Volume::new_default(5, 5, 5);
        v[(2, 2, 2)] = 27.0;
        let out = convolve_separable(&v, &box_kernel_1d(1), "test").unwrap();

        assert!((out[(2, 2, 2)] - 1.0).abs() < 1e-5);
        assert!((out[(1, 3, 1)] - 1.0).abs() < 1e-5);
        assert_eq!(out[(0, 2, 2)], 0.0);
    }

    #[test]
    fn test_clamp_to_edge() {
        // Ramp along z: clamping keeps the edge value from being pulled towards zero.
        let mut v = Volume::new_default(1, 1, 3);
        v[(0, 0, 0)] = 3.0;
        v[(0, 0, 1)] = 3.0;
        v[(0, 0, 2)] = 6.0;
        let out = convolve_separable(&v, &box_kernel_1d(1), "test").unwrap();
        assert!((out[(0, 0, 0)] - 3.0).abs() < 1e-5);
        assert!((out[(0, 0, 2)] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_volume() {
        let v = Volume::new_default(0, 4, 4);
        let out = convolve_separable(&v, &box_kernel_1d(1), "test").unwrap();
        assert!(out.is_empty());
    }
}
