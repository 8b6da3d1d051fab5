//! Output grid computed from the union of all transformed view bounding boxes.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::Crop;
use crate::error::{Error, Result};
use crate::view::View;

/// The voxel lattice views are fused into.
///
/// Output voxel `(x, y, z)` sits at `(index + crop_offset) * scale + min` in
/// output space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputGrid {
    pub min: DVec3,
    pub max: DVec3,
    /// `max - min`, never negative.
    pub size: DVec3,
    pub dims: [usize; 3],
    /// Crop offset in output voxels, already divided by `scale`.
    pub crop_offset: [usize; 3],
    pub scale: usize,
}

impl OutputGrid {
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Memory needed for one `f32` volume of this grid.
    pub fn bytes_per_volume(&self) -> usize {
        self.voxel_count() * std::mem::size_of::<f32>()
    }

    /// Output-space position of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> DVec3 {
        self.location_of(0, 0, 0)
    }

    #[inline]
    pub fn location_of(&self, x: usize, y: usize, z: usize) -> DVec3 {
        let scale = self.scale as f64;
        DVec3::new(
            (x + self.crop_offset[0]) as f64,
            (y + self.crop_offset[1]) as f64,
            (z + self.crop_offset[2]) as f64,
        ) * scale
            + self.min
    }
}

/// Computes the output grid from the views that take part in fusion.
///
/// A view takes part when it is connected or is the only view. Scaling divides
/// both the automatic extent and the crop by `scale` using integer division.
pub fn compute_output_grid(views: &[View], scale: usize, crop: &Crop) -> Result<OutputGrid> {
    if scale == 0 {
        return Err(Error::InvalidConfig("scale must be >= 1".to_string()));
    }

    let single_view = views.len() == 1;
    let mut min = DVec3::splat(f64::MAX);
    let mut max = DVec3::splat(f64::MIN);
    let mut participating = 0usize;

    for view in views {
        if !view.is_connected() {
            if !single_view {
                if view.used_for_registration() {
                    tracing::warn!(
                        view = view.name(),
                        "View is not connected to any other view, ignoring it for the bounding box"
                    );
                }
                continue;
            }
            tracing::warn!(
                view = view.name(),
                "Only one view given, using it although it is not connected"
            );
        }

        let [w, h, d] = view.size();
        let (lo, hi) = view
            .transform()
            .estimate_bounds(DVec3::ZERO, DVec3::new(w as f64, h as f64, d as f64));
        min = min.min(lo);
        max = max.max(hi);
        participating += 1;
    }

    if participating == 0 {
        return Err(Error::NoValidGeometry);
    }

    let size = (max - min).max(DVec3::ZERO);
    let extent = size.to_array();

    let mut dims = [0usize; 3];
    let mut crop_offset = [0usize; 3];
    for axis in 0..3 {
        dims[axis] = if crop.size[axis] == 0 {
            (extent[axis].ceil() as usize + 1) / scale
        } else {
            crop.size[axis] / scale
        };
        crop_offset[axis] = crop.offset[axis] / scale;
    }

    let grid = OutputGrid {
        min,
        max,
        size,
        dims,
        crop_offset,
        scale,
    };

    tracing::info!(
        views = participating,
        min = %grid.min,
        max = %grid.max,
        dims = ?grid.dims,
        scale,
        mib_per_volume = grid.bytes_per_volume() / (1024 * 1024),
        "Output grid computed"
    );

    Ok(grid)
}
