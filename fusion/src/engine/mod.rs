//! Fusion engine: streams batches of views into accumulators over the output grid.
//!
//! Two variants share the batching, loading, weighting and sampling machinery:
//!
//! - [`SharedOutputFusion`] accumulates every view into one volume and
//!   normalizes by the summed weights.
//! - [`PerViewFusion`] keeps one weighted volume per view, as input for
//!   multi-view deconvolution or for per-view export.
//!
//! Each channel moves through [`FusionState`] `Idle -> Cleared -> Fusing ->
//! Normalized -> Done`. Batches run one after another; inside a batch the work
//! is split across a fixed rayon pool with stride partitioning, so results do
//! not depend on scheduling.

mod accumulator;
mod per_view;
mod sampler;
mod shared;


use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::{Diagnostic, Diagnostics, Error, Result};
use crate::geometry::OutputGrid;
use crate::interpolation::Interpolation;
use crate::partition::batches;
use crate::view::{LoadedBatch, View, ViewInfo};
use crate::weights::{WeightVolume, Weighteners};
use crate::Volume;

pub use accumulator::Accumulator;
pub use per_view::PerViewFusion;
pub use shared::SharedOutputFusion;

use sampler::{BatchData, ChannelViews};

/// Where an engine is in fusing the current channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum FusionState {
    Idle,
    Cleared,
    Fusing,
    Normalized,
    Done,
}

/// Runtime parameters of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub interpolation: Interpolation,
    /// Views resident at the same time.
    pub batch_size: usize,
    pub num_threads: usize,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.num_threads == 0 {
            return Err(Error::InvalidConfig(format!(
                "batch_size and num_threads must be >= 1 ({self:?})"
            )));
        }
        Ok(())
    }
}

/// One fused volume and the weights that produced it.
#[derive(Debug, Clone)]
pub struct FusedVolume {
    /// The source view for per-view outputs, `None` for the shared output.
    pub view: Option<ViewInfo>,
    pub image: Volume,
    /// Summed weights per output voxel.
    pub weights: Volume,
}

/// Everything produced by fusing one channel.
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub channel: u32,
    pub grid: OutputGrid,
    pub outputs: Vec<FusedVolume>,
    pub diagnostics: Diagnostics,
}

pub trait FusionEngine: Send {
    fn grid(&self) -> &OutputGrid;

    fn state(&self) -> FusionState;

    /// Fuses the views of `views` that belong to `channel`.
    ///
    /// `views` is the full dataset; views of other channels are only consulted
    /// to decide whether a view without its own registration may be used.
    fn fuse_channel(&mut self, views: &[View], channel: u32) -> Result<FusionResult>;
}

pub fn build_pool(num_threads: usize) -> Result<ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("fusion-{i}"))
        .build()?;
    Ok(pool)
}

fn transition(state: &mut FusionState, next: FusionState, channel: u32) {
    let from = *state;
    tracing::debug!(channel, from = %from, to = %next, "Fusion state");
    *state = next;
}

/// Loads each batch of `channel` in turn and hands it to `fuse`.
///
/// A view that fails to load is dropped from `channel` for the remaining
/// batches. Isolated weighting is switched off for the remaining batches after
/// the first failure to compute it.
fn for_each_batch<'v>(
    channel: &mut ChannelViews<'v>,
    settings: &EngineSettings,
    pool: &ThreadPool,
    weighteners: &Weighteners,
    diagnostics: &mut Diagnostics,
    mut fuse: impl FnMut(&ChannelViews<'v>, &BatchData<'v>),
) {
    let mut isolated_enabled = weighteners.has_isolated();

    for range in batches(channel.len(), settings.batch_size) {
        let active = channel.active(range.clone());
        if !active.iter().any(|&a| a) {
            continue;
        }

        tracing::debug!(
            first = range.start,
            last = range.end - 1,
            views = range.len(),
            "Fusing batch"
        );

        let (loaded, failed) = LoadedBatch::load(channel.batch(range.clone()), &active);
        for (offset, error) in failed {
            let index = range.start + offset;
            let view: &'v View = channel.views[index];
            tracing::warn!(
                view = view.name(),
                error = %error,
                "Cannot load view, it will not contribute"
            );
            diagnostics.push(Diagnostic::ViewLoadFailed {
                view: view.name().to_string(),
                reason: error.to_string(),
            });
            channel.inverses[index] = None;
        }
        if !loaded.any_loaded() {
            continue;
        }

        let isolated = compute_isolated_weights(
            pool,
            weighteners,
            &loaded,
            &mut isolated_enabled,
            diagnostics,
        );

        let batch = BatchData {
            range,
            loaded,
            isolated,
        };
        fuse(channel, &batch);
    }
}

/// Isolated weight volumes for every loaded view of the batch, computed in parallel.
///
/// On failure, logs, records a diagnostic and clears `enabled`.
fn compute_isolated_weights(
    pool: &ThreadPool,
    weighteners: &Weighteners,
    loaded: &LoadedBatch<'_>,
    enabled: &mut bool,
    diagnostics: &mut Diagnostics,
) -> Vec<Vec<WeightVolume>> {
    let empty = || -> Vec<Vec<WeightVolume>> { (0..loaded.len()).map(|_| Vec::new()).collect() };
    if !*enabled {
        return empty();
    }

    let computed: Result<Vec<Vec<WeightVolume>>> = pool.install(|| {
        loaded
            .volumes()
            .par_iter()
            .map(|volume| match volume {
                Some(volume) => weighteners
                    .isolated
                    .iter()
                    .map(|w| w.create_instance(volume))
                    .collect(),
                None => Ok(Vec::new()),
            })
            .collect()
    });

    match computed {
        Ok(weights) => weights,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Cannot compute isolated weights, continuing without them"
            );
            diagnostics.push(Diagnostic::IsolatedWeightsDisabled {
                reason: e.to_string(),
            });
            *enabled = false;
            empty()
        }
    }
}
