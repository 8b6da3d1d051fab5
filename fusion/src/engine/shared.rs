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

/// Fuses all views of a channel into one normalized volume.
///
/// Output z-plane `z` is owned by worker `z % num_threads` for the whole batch,
/// so each voxel sums its views in the same order regardless of thread count.
pub struct SharedOutputFusion {
    grid: OutputGrid,
    weighteners: Weighteners,
    settings: EngineSettings,
    pool: ThreadPool,
    /// Taken by the result of a channel and reallocated for the next one.
    accumulator: Option<Accumulator>,
    state: FusionState,
}

impl SharedOutputFusion {
    /// Allocates the accumulator up front, so a grid that does not fit in
    /// memory fails here with [`crate::Error::OutputAllocationFailure`].
    pub fn new(grid: OutputGrid, weighteners: Weighteners, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        let accumulator = Accumulator::new(grid.dims)?;
        let pool = build_pool(settings.num_threads)?;

        tracing::info!(
            dims = ?grid.dims,
            batch_size = settings.batch_size,
            threads = settings.num_threads,
            isolated = ?weighteners.isolated_names(),
            combined = ?weighteners.combined_names(),
            "Shared output fusion ready"
        );

        Ok(Self {
            grid,
            weighteners,
            settings,
            pool,
            accumulator: Some(accumulator),
            state: FusionState::Idle,
        })
    }
}

impl FusionEngine for SharedOutputFusion {
    fn grid(&self) -> &OutputGrid {
        &self.grid
    }

    fn state(&self) -> FusionState {
        self.state
    }

    fn fuse_channel(&mut self, views: &[View], channel: u32) -> Result<FusionResult> {
        let mut accumulator = match self.accumulator.take() {
            Some(mut accumulator) => {
                accumulator.clear();
                accumulator
            }
            None => Accumulator::new(self.grid.dims)?,
        };
        transition(&mut self.state, FusionState::Cleared, channel);

        let mut diagnostics = Diagnostics::default();
        let mut channel_views = ChannelViews::prepare(views, channel, &mut diagnostics);
        tracing::info!(channel, views = channel_views.len(), "Fusing channel");

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
                    &mut accumulator,
                )
            },
        );

        self.pool.install(|| accumulator.normalize());
        transition(&mut self.state, FusionState::Normalized, channel);

        let (image, weights) = accumulator.into_parts();
        transition(&mut self.state, FusionState::Done, channel);

        Ok(FusionResult {
            channel,
            grid: self.grid,
            outputs: vec![FusedVolume {
                view: None,
                image,
                weights,
            }],
            diagnostics,
        })
    }
}

fn fuse_batch(
    grid: &OutputGrid,
    channel: &ChannelViews<'_>,
    batch: &BatchData<'_>,
    weighteners: &Weighteners,
    settings: &EngineSettings,
    pool: &ThreadPool,
    accumulator: &mut Accumulator,
) {
    let [width, height, _] = grid.dims;
    let shares = stride_shares(accumulator.planes_mut(), settings.num_threads);

    pool.install(|| {
        shares.into_par_iter().for_each(|share| {
            let mut sampler =
                VoxelSampler::new(grid, channel, batch, weighteners, settings.interpolation);

            for (z, (intensity, weight)) in share {
                for y in 0..height {
                    for x in 0..width {
                        let idx = y * width + x;
                        sampler.sample(x, y, z, batch.range.clone(), |_, w, value| {
                            intensity[idx] += value;
                            weight[idx] += w;
                        });
                    }
                }
            }
        });
    });
}
