//! Synthetic bead datasets.
//!
//! Beads are points in output space. Each view sees them through its own
//! transform, rendered as small Gaussian spheres, which gives fusion a ground
//! truth to check against.

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::transform::Affine3;
use crate::view::{View, ViewInfo};
use crate::Volume;

pub const DEFAULT_SEED: u64 = 4_363_456_634_634;

#[derive(Debug, Clone)]
pub struct BeadSimulation {
    beads: Vec<DVec3>,
    /// Peak value of a bead.
    pub intensity: f32,
    pub sigma: f64,
    /// Voxels around a bead's center that are drawn.
    pub radius: usize,
}

impl BeadSimulation {
    pub fn new(beads: Vec<DVec3>) -> Self {
        Self {
            beads,
            intensity: 255.0,
            sigma: 1.5,
            radius: 5,
        }
    }

    /// `count` beads uniformly inside the box `[min, max)`.
    pub fn random(count: usize, min: DVec3, max: DVec3, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = max - min;
        let beads = (0..count)
            .map(|_| {
                let unit = DVec3::new(
                    rng.random::<f64>(),
                    rng.random::<f64>(),
                    rng.random::<f64>(),
                );
                min + unit * size
            })
            .collect();
        Self::new(beads)
    }

    pub fn beads(&self) -> &[DVec3] {
        &self.beads
    }

    /// Renders the beads into a view of `size` voxels whose transform maps view
    /// voxels to output space.
    pub fn render(&self, size: [usize; 3], view_to_output: &Affine3) -> Result<Volume> {
        let to_view = view_to_output
            .inverse()
            .ok_or_else(|| Error::NonInvertibleTransform {
                view: format!("simulated view {view_to_output}"),
            })?;

        let mut volume = Volume::new_default(size[0], size[1], size[2]);
        for &bead in &self.beads {
            self.add_gaussian_sphere(&mut volume, to_view.apply(bead));
        }
        Ok(volume)
    }

    fn add_gaussian_sphere(&self, volume: &mut Volume, center: DVec3) {
        let r = self.radius as i64;
        let c = center.round().as_i64vec3();
        let two_sigma_sq = 2.0 * self.sigma * self.sigma;

        for z in c.z - r..=c.z + r {
            for y in c.y - r..=c.y + r {
                for x in c.x - r..=c.x + r {
                    if !volume.contains(x, y, z) {
                        continue;
                    }
                    let d_sq = (DVec3::new(x as f64, y as f64, z as f64) - center).length_squared();
                    let value = self.intensity * (-d_sq / two_sigma_sq).exp() as f32;
                    volume[(x as usize, y as usize, z as usize)] += value;
                }
            }
        }
    }

    /// Views of a cube of `size` voxels rotated about the vertical axis through
    /// its center, one per angle in degrees. The 0 degree view coincides with
    /// output space.
    pub fn rotated_views(&self, size: usize, angles: &[u32], channel: u32) -> Result<Vec<View>> {
        let center = DVec3::splat((size as f64 - 1.0) * 0.5);
        angles
            .iter()
            .map(|&angle| {
                let transform =
                    Affine3::rotation_y_around(center, (angle as f64).to_radians());
                let volume = self.render([size; 3], &transform)?;
                Ok(View::from_volume(
                    ViewInfo::new(format!("angle {angle}"), channel, angle, 0),
                    volume,
                    transform,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_beads_are_seeded_and_inside_box() {
        let min = DVec3::new(2.0, 3.0, 4.0);
        let max = DVec3::new(10.0, 9.0, 8.0);
        let a = BeadSimulation::random(50, min, max, 1);
        let b = BeadSimulation::random(50, min, max, 1);

        assert_eq!(a.beads(), b.beads());
        for &p in a.beads() {
            assert!(p.cmpge(min).all() && p.cmplt(max).all());
        }
    }

    #[test]
    fn test_render_peaks_at_bead() {
        let sim = BeadSimulation::new(vec![DVec3::new(8.0, 6.0, 7.0)]);
        let volume = sim.render([16, 12, 14], &Affine3::identity()).unwrap();

        assert!((volume[(8, 6, 7)] - 255.0).abs() < 1e-3);
        assert!(volume[(9, 6, 7)] < volume[(8, 6, 7)]);
        assert_eq!(volume[(0, 0, 0)], 0.0);
    }

    #[test]
    fn test_render_through_translation() {
        let sim = BeadSimulation::new(vec![DVec3::new(10.0, 5.0, 5.0)]);
        // The view starts at x = 4 in output space, so the bead sits at view x = 6.
        let t = Affine3::translation(DVec3::new(4.0, 0.0, 0.0));
        let volume = sim.render([12, 12, 12], &t).unwrap();
        assert!((volume[(6, 5, 5)] - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_render_rejects_singular_transform() {
        let sim = BeadSimulation::new(vec![DVec3::ZERO]);
        let flat = Affine3::scale(DVec3::new(0.0, 1.0, 1.0));
        assert!(matches!(
            sim.render([4, 4, 4], &flat),
            Err(Error::NonInvertibleTransform { .. })
        ));
    }

    #[test]
    fn test_rotated_views_share_beads() {
        let sim = BeadSimulation::new(vec![DVec3::new(12.0, 8.0, 10.0)]);
        let views = sim.rotated_views(21, &[0, 90], 0).unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].info().angle, 90);

        // The bead maps back to the same output position from every view.
        for view in &views {
            let volume = view.load().unwrap();
            let (idx, _) = volume
                .pixels()
                .iter()
                .enumerate()
                .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
            let x = idx % 21;
            let y = (idx / 21) % 21;
            let z = idx / (21 * 21);
            let p = view
                .transform()
                .apply(DVec3::new(x as f64, y as f64, z as f64));
            assert!((p - DVec3::new(12.0, 8.0, 10.0)).length() < 1e-6);
        }
    }
}
