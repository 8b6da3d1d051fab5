//! Smooth blending towards view borders.
//!
//! Each view's weight falls off with a cosine ramp as the sampled point nears
//! one of its faces, so seams between overlapping views disappear.

use std::f64::consts::PI;

use glam::DVec3;

use super::CombinedWeightener;
use crate::config::{BlendConfig, BlendWidth};
use crate::view::View;

/// Weight for a point `distance` voxels inside the blend zone of `width` voxels.
///
/// 0 at or below 0, 1 at or beyond `width`, cosine ramp in between.
#[inline]
pub fn blend_falloff(distance: f64, width: f64) -> f64 {
    if distance <= 0.0 {
        0.0
    } else if distance >= width {
        1.0
    } else {
        ((1.0 - distance / width) * PI).cos() * 0.5 + 0.5
    }
}

/// Per-worker blending state for one set of views.
///
/// Without a border, a point seen by a single view, or only by views whose
/// raw weights are all 0, gets weight 1 for those views so the normalized
/// output has no holes. With a border the raw falloff is always returned, and
/// the border stays black.
#[derive(Debug, Clone)]
pub struct Blending {
    sizes: Vec<DVec3>,
    widths: Vec<DVec3>,
    border: DVec3,
    fill_gaps: bool,
    weights: Vec<f32>,
}

impl Blending {
    pub fn new(views: &[&View], config: &BlendConfig) -> Self {
        let sizes: Vec<DVec3> = views
            .iter()
            .map(|v| {
                let [w, h, d] = v.size();
                DVec3::new(w as f64, h as f64, d as f64)
            })
            .collect();

        let widths = sizes
            .iter()
            .map(|&size| match config.width {
                BlendWidth::Relative(fraction) => size * 0.5 * fraction,
                BlendWidth::Absolute(w) => DVec3::from_array(w),
            })
            .collect();

        let border = DVec3::from_array(config.border);
        Self {
            weights: vec![0.0; sizes.len()],
            sizes,
            widths,
            border,
            fill_gaps: border == DVec3::ZERO,
        }
    }

    /// Unnormalized blend weight of view `view` at view-local `location`.
    pub fn raw_weight(&self, view: usize, location: DVec3) -> f64 {
        let size = self.sizes[view];
        let width = self.widths[view];

        let mut weight = 1.0;
        for axis in 0..3 {
            let loc = location[axis];
            let distance = loc.min(size[axis] - 1.0 - loc) - self.border[axis];
            weight *= blend_falloff(distance, width[axis]);
            if weight == 0.0 {
                break;
            }
        }
        weight
    }
}

impl CombinedWeightener for Blending {
    fn update_weights(&mut self, locations: &[DVec3], valid: &[bool]) {
        debug_assert_eq!(locations.len(), self.weights.len());
        debug_assert_eq!(valid.len(), self.weights.len());

        let valid_count = valid.iter().filter(|&&v| v).count();
        if self.fill_gaps && valid_count == 1 {
            for (w, &is_valid) in self.weights.iter_mut().zip(valid) {
                *w = if is_valid { 1.0 } else { 0.0 };
            }
            return;
        }

        let mut any_positive = false;
        for view in 0..self.weights.len() {
            let w = if valid[view] {
                self.raw_weight(view, locations[view]) as f32
            } else {
                0.0
            };
            any_positive |= w > 0.0;
            self.weights[view] = w;
        }

        // Views whose borders coincide would otherwise all drop to zero.
        if self.fill_gaps && !any_positive {
            for (w, &is_valid) in self.weights.iter_mut().zip(valid) {
                if is_valid {
                    *w = 1.0;
                }
            }
        }
    }

    #[inline]
    fn weight(&self, view: usize) -> f32 {
        self.weights[view]
    }
}
