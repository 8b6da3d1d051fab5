//! Weight providers.
//!
//! Two kinds of weights multiply into a view's contribution at an output point:
//!
//! - **Isolated** weights depend on one view's content only. They are computed
//!   once per view per batch as a volume over the view's grid and looked up at
//!   the rounded view-local voxel.
//! - **Combined** weights depend on where the point lies in every view at once,
//!   e.g. blending near borders. Each worker owns its own stateful instance that
//!   is updated once per output point.

mod blending;
mod content;
mod entropy;
mod filter;

use std::fmt::Debug;
use std::sync::Arc;

use glam::DVec3;

use crate::config::{CombinedStrategy, IsolatedStrategy, WeightStrategies};
use crate::error::Result;
use crate::view::View;
use crate::Volume;

pub use blending::{blend_falloff, Blending};
pub use content::{average_content, gauss_content};
pub use entropy::entropy;
pub use filter::{box_kernel_1d, convolve_separable, gaussian_kernel_1d};

/// Scalar weight field over one view's voxel grid.
pub type WeightVolume = Volume;

/// Computes a weight volume from a single view's pixel data.
pub trait IsolatedWeightener: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Raw weights sized like `volume`. Fails with
    /// [`Error::WeightAllocationFailure`](crate::Error::WeightAllocationFailure)
    /// when the buffers cannot be allocated.
    fn create_instance(&self, volume: &Volume) -> Result<WeightVolume>;
}

/// Per-worker weighter over all views of a channel.
pub trait CombinedWeightener: Send {
    /// Called once per output point with every view's exact view-local
    /// location and whether that location lies inside the view.
    fn update_weights(&mut self, locations: &[DVec3], valid: &[bool]);

    /// Weight of view `view` at the last updated point.
    fn weight(&self, view: usize) -> f32;
}

/// Creates [`CombinedWeightener`]s for a set of views.
pub trait CombinedWeightenerFactory: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn create_instance(&self, views: &[&View]) -> Box<dyn CombinedWeightener>;
}

impl IsolatedWeightener for IsolatedStrategy {
    fn name(&self) -> &'static str {
        match self {
            IsolatedStrategy::Entropy { .. } => "entropy",
            IsolatedStrategy::GaussContent { .. } => "gauss content",
            IsolatedStrategy::AverageContent { .. } => "average content",
        }
    }

    fn create_instance(&self, volume: &Volume) -> Result<WeightVolume> {
        let mut weights = match *self {
            IsolatedStrategy::Entropy { window, bins } => entropy(volume, window, bins)?,
            IsolatedStrategy::GaussContent { sigma1, sigma2 } => {
                gauss_content(volume, sigma1, sigma2)?
            }
            IsolatedStrategy::AverageContent { radius1, radius2 } => {
                average_content(volume, radius1, radius2)?
            }
        };
        normalize_weights(&mut weights);
        Ok(weights)
    }
}

impl CombinedWeightenerFactory for CombinedStrategy {
    fn name(&self) -> &'static str {
        match self {
            CombinedStrategy::Blending(_) => "blending",
        }
    }

    fn create_instance(&self, views: &[&View]) -> Box<dyn CombinedWeightener> {
        match self {
            CombinedStrategy::Blending(config) => Box::new(Blending::new(views, config)),
        }
    }
}

/// Scales weights into `[0, 1]` by their maximum.
///
/// A volume without any positive weight becomes all ones so that a view
/// without measurable content still contributes.
pub fn normalize_weights(weights: &mut WeightVolume) {
    let max = weights
        .pixels()
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(0.0f32, f32::max);

    if max > 0.0 {
        for w in weights.pixels_mut() {
            *w = if w.is_finite() { (*w / max).clamp(0.0, 1.0) } else { 0.0 };
        }
    } else {
        weights.fill(1.0);
    }
}

/// The weight providers of one fusion run.
#[derive(Debug, Clone, Default)]
pub struct Weighteners {
    pub isolated: Vec<Arc<dyn IsolatedWeightener>>,
    pub combined: Vec<Arc<dyn CombinedWeightenerFactory>>,
}

impl Weighteners {
    pub fn new(
        isolated: Vec<Arc<dyn IsolatedWeightener>>,
        combined: Vec<Arc<dyn CombinedWeightenerFactory>>,
    ) -> Self {
        Self { isolated, combined }
    }

    /// Resolves configured strategies. Deconvolution keeps a black border
    /// around every view's blend zone.
    pub fn from_strategies(strategies: &WeightStrategies, is_deconvolution: bool) -> Self {
        let isolated = strategies
            .isolated
            .iter()
            .map(|&s| Arc::new(s) as Arc<dyn IsolatedWeightener>)
            .collect();

        let combined = strategies
            .combined
            .iter()
            .map(|&s| {
                let s = match s {
                    CombinedStrategy::Blending(blend) if is_deconvolution => {
                        CombinedStrategy::Blending(blend.for_deconvolution())
                    }
                    other => other,
                };
                Arc::new(s) as Arc<dyn CombinedWeightenerFactory>
            })
            .collect();

        Self { isolated, combined }
    }

    pub fn has_isolated(&self) -> bool {
        !self.isolated.is_empty()
    }

    pub fn has_combined(&self) -> bool {
        !self.combined.is_empty()
    }

    pub fn isolated_names(&self) -> Vec<&'static str> {
        self.isolated.iter().map(|w| w.name()).collect()
    }

    pub fn combined_names(&self) -> Vec<&'static str> {
        self.combined.iter().map(|w| w.name()).collect()
    }
}
