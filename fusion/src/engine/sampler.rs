//! Per-voxel sampling shared by both engine variants.

use std::ops::Range;

use glam::{DVec3, I64Vec3};

use crate::error::{Diagnostic, Diagnostics};
use crate::geometry::OutputGrid;
use crate::interpolation::{nearest_voxel, Interpolation};
use crate::transform::Affine3;
use crate::view::{usable_views, LoadedBatch, View};
use crate::weights::{CombinedWeightener, WeightVolume, Weighteners};

/// The views of one channel and the inverse transforms of those that take part.
#[derive(Debug)]
pub(crate) struct ChannelViews<'a> {
    pub views: Vec<&'a View>,
    /// `None` for views that never contribute: unusable or non-invertible.
    pub inverses: Vec<Option<Affine3>>,
}

impl<'a> ChannelViews<'a> {
    pub fn prepare(dataset: &'a [View], channel: u32, diagnostics: &mut Diagnostics) -> Self {
        let views: Vec<&View> = dataset
            .iter()
            .filter(|v| v.info().channel == channel)
            .collect();
        let usable = usable_views(&views, dataset);

        let inverses = views
            .iter()
            .zip(&usable)
            .map(|(view, &is_usable)| {
                if !is_usable {
                    if view.used_for_registration() {
                        tracing::warn!(view = view.name(), "View is not connected, skipping it");
                    }
                    diagnostics.push(Diagnostic::UnconnectedView {
                        view: view.name().to_string(),
                    });
                    return None;
                }

                let inverse = view.transform().inverse();
                if inverse.is_none() {
                    tracing::warn!(
                        view = view.name(),
                        transform = %view.transform(),
                        "View transform is not invertible, it will not contribute"
                    );
                    diagnostics.push(Diagnostic::NonInvertibleTransform {
                        view: view.name().to_string(),
                    });
                }
                inverse
            })
            .collect();

        Self { views, inverses }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Which views of `range` need their pixel data loaded.
    pub fn active(&self, range: Range<usize>) -> Vec<bool> {
        self.inverses[range].iter().map(Option::is_some).collect()
    }

    pub fn batch(&self, range: Range<usize>) -> &[&'a View] {
        &self.views[range]
    }
}

/// Pixel data and isolated weights of the batch currently being fused.
#[derive(Debug)]
pub(crate) struct BatchData<'a> {
    pub range: Range<usize>,
    pub loaded: LoadedBatch<'a>,
    /// Per batch view, one volume per isolated weightener. Empty when isolated
    /// weighting is off or the view is inactive.
    pub isolated: Vec<Vec<WeightVolume>>,
}

/// Maps output voxels into views and computes their weights and intensities.
///
/// Holds per-worker scratch space and combined weightener state, so every
/// worker creates its own.
pub(crate) struct VoxelSampler<'a> {
    grid: &'a OutputGrid,
    channel: &'a ChannelViews<'a>,
    batch: &'a BatchData<'a>,
    interpolation: Interpolation,
    combined: Vec<Box<dyn CombinedWeightener>>,
    /// Views whose coordinates are computed per voxel.
    relevant: Range<usize>,
    locations: Vec<DVec3>,
    voxels: Vec<I64Vec3>,
    valid: Vec<bool>,
}

impl<'a> VoxelSampler<'a> {
    pub fn new(
        grid: &'a OutputGrid,
        channel: &'a ChannelViews<'a>,
        batch: &'a BatchData<'a>,
        weighteners: &Weighteners,
        interpolation: Interpolation,
    ) -> Self {
        let combined: Vec<Box<dyn CombinedWeightener>> = weighteners
            .combined
            .iter()
            .map(|factory| factory.create_instance(&channel.views))
            .collect();

        // Combined weights need every view's position, isolated ones only the batch.
        let relevant = if combined.is_empty() {
            batch.range.clone()
        } else {
            0..channel.len()
        };

        let n = channel.len();
        Self {
            grid,
            channel,
            batch,
            interpolation,
            combined,
            relevant,
            locations: vec![DVec3::ZERO; n],
            voxels: vec![I64Vec3::ZERO; n],
            valid: vec![false; n],
        }
    }

    /// Samples output voxel `(x, y, z)` and hands `(view, weight, weight * intensity)`
    /// to `sink` for every view of `targets` that contains it.
    ///
    /// `targets` must lie inside the batch range.
    #[inline]
    pub fn sample(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        targets: Range<usize>,
        mut sink: impl FnMut(usize, f32, f32),
    ) {
        debug_assert!(
            targets.start >= self.batch.range.start && targets.end <= self.batch.range.end
        );

        let location = self.grid.location_of(x, y, z);
        let mut any_target = false;

        for i in self.relevant.clone() {
            let inside = match &self.channel.inverses[i] {
                Some(inverse) => {
                    let local = inverse.apply(location);
                    let voxel = nearest_voxel(local);
                    self.locations[i] = local;
                    self.voxels[i] = voxel;
                    let [w, h, d] = self.channel.views[i].size();
                    voxel.cmpge(I64Vec3::ZERO).all()
                        && voxel.cmplt(I64Vec3::new(w as i64, h as i64, d as i64)).all()
                }
                None => false,
            };
            self.valid[i] = inside;
            any_target |= inside && targets.contains(&i);
        }

        if !any_target {
            return;
        }

        for combined in &mut self.combined {
            combined.update_weights(&self.locations, &self.valid);
        }

        for i in targets {
            if !self.valid[i] {
                continue;
            }
            let offset = i - self.batch.range.start;
            let Some(volume) = self.batch.loaded.volume(offset) else {
                continue;
            };

            let mut weight: f32 = self.combined.iter().map(|c| c.weight(i)).product();

            let voxel = self.voxels[i];
            let (vx, vy, vz) = (voxel.x as usize, voxel.y as usize, voxel.z as usize);
            for isolated in &self.batch.isolated[offset] {
                weight *= isolated[(vx, vy, vz)];
            }

            let intensity = self.interpolation.sample(volume, self.locations[i]);
            sink(i, weight, weight * intensity);
        }
    }
}
