use rayon::prelude::*;
use rayon::ThreadPool;

use super::sampler::{BatchData, ChannelViews, VoxelSampler};
use super::{
    build_pool, for_each_batch, transition, Accumulator, EngineSettings, FusedVolume,
    FusionEngine, FusionResult, FusionState,
};
use crate::error::{Diagnostics, Result};
use crate::geometry::OutputGrid;
use crate::partition::stride_shares;
use crate::view::View;
use crate::weights::Weighteners;

/// Fuses each view of a channel into its own output volume.
///
/// Combined weights still see every view, so the per-view outputs sum to the
/// shared result's numerator. Each output holds `weight * intensity` and is not
/// divided by the weights, which come alongside it.
pub struct PerViewFusion {
    grid: OutputGrid,
    weighteners: Weighteners,
    settings: EngineSettings,
    pool: ThreadPool,
    state: FusionState,
}

impl PerViewFusion {
    pub fn new(grid: OutputGrid, weighteners: Weighteners, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        let pool = build_pool(settings.num_threads)?;

        tracing::info!(
            dims = ?grid.dims,
            batch_size = settings.batch_size,
            threads = settings.num_threads,
            isolated = ?weighteners.isolated_names(),
            combined = ?weighteners.combined_names(),
            "Per-view fusion ready"
        );

        Ok(Self {
            grid,
            weighteners,
            settings,
            pool,
            state: FusionState::Idle,
        })
    }
}

impl FusionEngine for PerViewFusion {
    fn grid(&self) -> &OutputGrid {
        &self.grid
    }

    fn state(&self) -> FusionState {
        self.state
    }

    fn fuse_channel(&mut self, views: &[View], channel: u32) -> Result<FusionResult> {
        let mut diagnostics = Diagnostics::default();
        let mut channel_views = ChannelViews::prepare(views, channel, &mut diagnostics);

        // All outputs are allocated before any view is loaded.
        let mut accumulators: Vec<Option<Accumulator>> = channel_views
            .inverses
            .iter()
            .map(|inverse| {
                inverse
                    .as_ref()
                    .map(|_| Accumulator::new(self.grid.dims))
                    .transpose()
            })
            .collect::<Result<_>>()?;
        transition(&mut self.state, FusionState::Cleared, channel);

        tracing::info!(
            channel,
            views = channel_views.len(),
            outputs = accumulators.iter().flatten().count(),
            "Fusing channel into per-view outputs"
        );

        transition(&mut self.state, FusionState::Fusing, channel);
        for_each_batch(
            &mut channel_views,
            &self.settings,
            &self.pool,
            &self.weighteners,
            &mut diagnostics,
            |channel_views, batch| {
                fuse_batch(
                    &self.grid,
                    channel_views,
                    batch,
                    &self.weighteners,
                    &self.settings,
                    &self.pool,
                    &mut accumulators,
                )
            },
        );

        // Deconvolution consumes weighted intensities, so nothing is divided.
        transition(&mut self.state, FusionState::Normalized, channel);

        // Views that failed to load lost their inverse and have no output.
        let outputs = channel_views
            .views
            .iter()
            .zip(&channel_views.inverses)
            .zip(accumulators)
            .filter_map(|((view, inverse), accumulator)| {
                inverse.as_ref()?;
                accumulator.map(|accumulator| {
                    let (image, weights) = accumulator.into_parts();
                    FusedVolume {
                        view: Some(view.info().clone()),
                        image,
                        weights,
                    }
                })
            })
            .collect();
        transition(&mut self.state, FusionState::Done, channel);

        Ok(FusionResult {
            channel,
            grid: self.grid,
            outputs,
            diagnostics,
        })
    }
}

/// View `i` of the batch is fused by worker `i % num_threads`.
fn fuse_batch(
    grid: &OutputGrid,
    channel: &ChannelViews<'_>,
    batch: &BatchData<'_>,
    weighteners: &Weighteners,
    settings: &EngineSettings,
    pool: &ThreadPool,
    accumulators: &mut [Option<Accumulator>],
) {
    let [width, height, depth] = grid.dims;
    let start = batch.range.start;
    let targets = accumulators[batch.range.clone()]
        .iter_mut()
        .enumerate()
        .filter_map(|(offset, accumulator)| accumulator.as_mut().map(|a| (start + offset, a)));
    let shares = stride_shares(targets, settings.num_threads);

    pool.install(|| {
        shares.into_par_iter().for_each(|share| {
            let mut sampler =
                VoxelSampler::new(grid, channel, batch, weighteners, settings.interpolation);

            for (_, (view, accumulator)) in share {
                let mut idx = 0;
                for z in 0..depth {
                    for y in 0..height {
                        for x in 0..width {
                            sampler.sample(x, y, z, view..view + 1, |_, w, value| {
                                accumulator.add(idx, value, w);
                            });
                            idx += 1;
                        }
                    }
                }
            }
        });
    });
}
