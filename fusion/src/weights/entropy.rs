//! Local Shannon entropy of intensities as a sharpness weight.
//!
//! Intensities are quantized into `bins` levels spanning the volume's min/max
//! range. For each voxel the histogram of the cubic window around it (clipped to
//! the volume) is kept up to date while sliding along x, together with
//! `S = sum(c * ln c)` over its counts, so `H = ln n - S / n` costs O(1) per voxel
//! on top of the column updates.

use rayon::prelude::*;

use common::buffer3::Buffer3;

use super::filter::try_volume;
use super::WeightVolume;
use crate::error::{Error, Result};
use crate::Volume;

const NAME: &str = "entropy";

pub fn entropy(volume: &Volume, window: usize, bins: usize) -> Result<WeightVolume> {
    if window == 0 || bins < 2 {
        return Err(Error::InvalidConfig(format!(
            "entropy needs window > 0 and bins > 1 (window {window}, bins {bins})"
        )));
    }

    let dims = volume.dims();
    let mut out = try_volume(dims, NAME)?;
    if volume.is_empty() {
        return Ok(out);
    }

    let levels = quantize(volume, bins)?;
    let radius = window / 2;
    let side = 2 * radius + 1;
    let x_log_x: Vec<f64> = (0..=side * side * side)
        .map(|c| if c == 0 { 0.0 } else { c as f64 * (c as f64).ln() })
        .collect();

    let [width, height, depth] = dims;
    let plane_len = out.plane_len();

    out.pixels_mut()
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(z, plane)| {
            let zs = z.saturating_sub(radius)..=(z + radius).min(depth - 1);
            let mut hist = Window {
                counts: vec![0u32; bins],
                n: 0,
                s: 0.0,
                x_log_x: &x_log_x,
            };

            for y in 0..height {
                let ys = y.saturating_sub(radius)..=(y + radius).min(height - 1);
                hist.reset();

                let column = |hist: &mut Window<'_>, x: usize, add: bool| {
                    for zz in zs.clone() {
                        for yy in ys.clone() {
                            hist.update(levels[(x, yy, zz)] as usize, add);
                        }
                    }
                };

                for x in 0..=radius.min(width - 1) {
                    column(&mut hist, x, true);
                }

                for x in 0..width {
                    if x > radius {
                        column(&mut hist, x - radius - 1, false);
                    }
                    if x > 0 && x + radius < width {
                        column(&mut hist, x + radius, true);
                    }
                    plane[y * width + x] = hist.entropy();
                }
            }
        });

    Ok(out)
}

/// Maps intensities to `0..bins`, all zeros for a constant volume.
fn quantize(volume: &Volume, bins: usize) -> Result<Buffer3<u32>> {
    let [w, h, d] = volume.dims();
    let mut levels = Buffer3::<u32>::try_new_default(w, h, d).map_err(|e| {
        Error::WeightAllocationFailure {
            strategy: NAME,
            voxels: e.len,
        }
    })?;

    let (min, max) = volume
        .pixels()
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !(range > 0.0) {
        return Ok(levels);
    }

    let top = (bins - 1) as f32;
    levels
        .pixels_mut()
        .par_iter_mut()
        .zip(volume.pixels().par_iter())
        .for_each(|(level, &v)| {
            *level = ((v - min) / range * top).round().clamp(0.0, top) as u32;
        });

    Ok(levels)
}

struct Window<'a> {
    counts: Vec<u32>,
    n: usize,
    s: f64,
    x_log_x: &'a [f64],
}

impl Window<'_> {
    fn reset(&mut self) {
        self.counts.fill(0);
        self.n = 0;
        self.s = 0.0;
    }

    #[inline]
    fn update(&mut self, bin: usize, add: bool) {
        let c = self.counts[bin] as usize;
        let next = if add { c + 1 } else { c - 1 };
        self.s += self.x_log_x[next] - self.x_log_x[c];
        self.counts[bin] = next as u32;
        if add {
            self.n += 1;
        } else {
            self.n -= 1;
        }
    }

    fn entropy(&self) -> f32 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        (n.ln() - self.s / n).max(0.0) as f32
    }
}
