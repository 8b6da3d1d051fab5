//! Intensity sampling at sub-voxel view coordinates.
//!
//! Coordinates are voxel centers: voxel `(i, j, k)` sits at `(i, j, k)`. Samples
//! outside the grid clamp to the nearest edge voxel, which matters for points up
//! to half a voxel outside that still round into the grid.

use glam::{DVec3, I64Vec3};
use serde::{Deserialize, Serialize};

use crate::Volume;

/// Interpolation method, used consistently for a whole fusion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Value of the nearest voxel.
    Nearest,
    /// Trilinear interpolation of the eight surrounding voxels.
    #[default]
    Linear,
}

impl Interpolation {
    #[inline]
    pub fn sample(self, volume: &Volume, p: DVec3) -> f32 {
        if volume.is_empty() {
            return 0.0;
        }
        match self {
            Interpolation::Nearest => sample_nearest(volume, p),
            Interpolation::Linear => sample_linear(volume, p),
        }
    }
}

/// Rounds to the nearest voxel, halves rounding up (`-0.5 -> 0`, `2.5 -> 3`).
#[inline]
pub fn nearest_voxel(p: DVec3) -> I64Vec3 {
    (p + 0.5).floor().as_i64vec3()
}

#[inline]
fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64 - 1) as usize
}

#[inline]
fn sample_nearest(volume: &Volume, p: DVec3) -> f32 {
    let v = nearest_voxel(p);
    volume[(
        clamp_index(v.x, volume.width()),
        clamp_index(v.y, volume.height()),
        clamp_index(v.z, volume.depth()),
    )]
}

#[inline]
fn sample_linear(volume: &Volume, p: DVec3) -> f32 {
    let base = p.floor();
    let frac = p - base;
    let b = base.as_i64vec3();

    let x0 = clamp_index(b.x, volume.width());
    let x1 = clamp_index(b.x + 1, volume.width());
    let y0 = clamp_index(b.y, volume.height());
    let y1 = clamp_index(b.y + 1, volume.height());
    let z0 = clamp_index(b.z, volume.depth());
    let z1 = clamp_index(b.z + 1, volume.depth());

    let fx = frac.x as f32;
    let fy = frac.y as f32;
    let fz = frac.z as f32;

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

    let c00 = lerp(volume[(x0, y0, z0)], volume[(x1, y0, z0)], fx);
    let c10 = lerp(volume[(x0, y1, z0)], volume[(x1, y1, z0)], fx);
    let c01 = lerp(volume[(x0, y0, z1)], volume[(x1, y0, z1)], fx);
    let c11 = lerp(volume[(x0, y1, z1)], volume[(x1, y1, z1)], fx);

    let c0 = lerp(c00, c10, fy);
    let c1 = lerp(c01, c11, fy);

    lerp(c0, c1, fz)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_x(w: usize, h: usize, d: usize) -> Volume {
        let mut v = Volume::new_default(w, h, d);
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    v[(x, y, z)] = x as f32 * 10.0;
                }
            }
        }
        v
    }

    #[test]
    fn test_nearest_voxel_rounds_half_up() {
        assert_eq!(nearest_voxel(DVec3::new(-0.5, 0.49, 2.5)), I64Vec3::new(0, 0, 3));
        assert_eq!(nearest_voxel(DVec3::new(-0.51, 1.0, -1.5)), I64Vec3::new(-1, 1, -1));
    }

    #[test]
    fn test_integer_coordinates_are_exact() {
        let v = ramp_x(4, 3, 2);
        for method in [Interpolation::Nearest, Interpolation::Linear] {
            assert_eq!(method.sample(&v, DVec3::new(2.0, 1.0, 1.0)), 20.0);
        }
    }

    #[test]
    fn test_linear_interpolates_between_voxels() {
        let v = ramp_x(4, 3, 2);
        let s = Interpolation::Linear.sample(&v, DVec3::new(1.25, 0.5, 0.5));
        assert!((s - 12.5).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_picks_closest_voxel() {
        let v = ramp_x(4, 3, 2);
        assert_eq!(Interpolation::Nearest.sample(&v, DVec3::new(1.6, 0.0, 0.0)), 20.0);
    }

    #[test]
    fn test_clamps_at_edges() {
        let v = ramp_x(4, 3, 2);
        assert_eq!(Interpolation::Linear.sample(&v, DVec3::new(-0.4, 0.0, 0.0)), 0.0);
        assert_eq!(Interpolation::Linear.sample(&v, DVec3::new(3.4, 2.0, 1.0)), 30.0);
        assert_eq!(Interpolation::Nearest.sample(&v, DVec3::new(9.0, 9.0, 9.0)), 30.0);
    }

    #[test]
    fn test_empty_volume_samples_zero() {
        let v = Volume::new_default(0, 0, 0);
        assert_eq!(Interpolation::Linear.sample(&v, DVec3::ZERO), 0.0);
    }
}
