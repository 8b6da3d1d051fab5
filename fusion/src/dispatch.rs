//! Drives a fusion run: picks the engine variant and batch size, fuses each
//! channel and routes the results.

use std::collections::BTreeSet;

use crate::config::FusionConfig;
use crate::engine::{EngineSettings, FusionEngine, PerViewFusion, SharedOutputFusion};
use crate::error::Result;
use crate::geometry::{compute_output_grid, OutputGrid};
use crate::output::OutputSink;
use crate::view::View;
use crate::weights::Weighteners;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum FusionVariant {
    /// One normalized volume for all views.
    SharedOutput,
    /// One weighted volume per view.
    PerView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionPlan {
    pub variant: FusionVariant,
    /// Views resident at the same time.
    pub batch_size: usize,
}

/// Fuses a dataset according to one [`FusionConfig`].
#[derive(Debug, Clone)]
pub struct FusionControl {
    config: FusionConfig,
    weighteners: Weighteners,
}

impl FusionControl {
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        let weighteners = Weighteners::from_strategies(&config.weights, config.is_deconvolution);
        Ok(Self {
            config,
            weighteners,
        })
    }

    /// Replaces the configured weight providers.
    pub fn with_weighteners(mut self, weighteners: Weighteners) -> Self {
        self.weighteners = weighteners;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn weighteners(&self) -> &Weighteners {
        &self.weighteners
    }

    /// Engine variant and batch size for a channel of `num_views` views.
    ///
    /// Deconvolution and multiple outputs need per-view volumes. Deconvolution
    /// loads either one view at a time or all of them; otherwise
    /// `parallel_views` caps the batch.
    pub fn plan(config: &FusionConfig, num_views: usize) -> FusionPlan {
        let variant = if config.is_deconvolution || config.multiple_distinct_outputs {
            FusionVariant::PerView
        } else {
            FusionVariant::SharedOutput
        };

        let batch_size = if config.is_deconvolution {
            if config.sequential_batching {
                1
            } else {
                num_views
            }
        } else {
            config.parallel_views.min(num_views)
        };

        FusionPlan {
            variant,
            batch_size: batch_size.max(1),
        }
    }

    /// Channels to fuse in ascending order: the configured ones, or every
    /// channel present in `views` when none are configured.
    pub fn channels(&self, views: &[View]) -> Vec<u32> {
        let channels: BTreeSet<u32> = if self.config.channels.is_empty() {
            views.iter().map(|v| v.info().channel).collect()
        } else {
            self.config.channels.iter().copied().collect()
        };
        channels.into_iter().collect()
    }

    pub fn build_engine(&self, grid: OutputGrid, plan: FusionPlan) -> Result<Box<dyn FusionEngine>> {
        let settings = EngineSettings {
            interpolation: self.config.interpolation,
            batch_size: plan.batch_size,
            num_threads: self.config.num_threads,
        };

        let engine: Box<dyn FusionEngine> = match plan.variant {
            FusionVariant::SharedOutput => Box::new(SharedOutputFusion::new(
                grid,
                self.weighteners.clone(),
                settings,
            )?),
            FusionVariant::PerView => {
                Box::new(PerViewFusion::new(grid, self.weighteners.clone(), settings)?)
            }
        };
        Ok(engine)
    }

    /// Fuses every selected channel of `views` and hands each result to `sink`.
    ///
    /// The output grid is computed once from all views, so every channel lands
    /// on the same lattice. In deconvolution mode only the first channel is fused.
    pub fn run(&self, views: &[View], sink: &mut dyn OutputSink) -> Result<OutputGrid> {
        let grid = compute_output_grid(views, self.config.scale, &self.config.crop)?;

        let channels = self.channels(views);
        let max_views = channels
            .iter()
            .map(|&c| views.iter().filter(|v| v.info().channel == c).count())
            .max()
            .unwrap_or(0);
        let plan = Self::plan(&self.config, max_views);

        tracing::info!(
            variant = %plan.variant,
            batch_size = plan.batch_size,
            channels = ?channels,
            timepoint = self.config.timepoint,
            "Starting fusion"
        );

        let mut engine = self.build_engine(grid, plan)?;

        for channel in channels {
            let result = engine.fuse_channel(views, channel)?;
            for note in result.diagnostics.notes() {
                tracing::info!(channel, %note, "Fusion diagnostic");
            }
            sink.accept(self.config.timepoint, result)?;

            if self.config.is_deconvolution {
                tracing::info!(channel, "Deconvolution input prepared for the first channel only");
                break;
            }
        }

        Ok(grid)
    }
}
