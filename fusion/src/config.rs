//! Configuration for a fusion run.
//!
//! The core holds no global defaults: every call receives one fully specified
//! [`FusionConfig`]. All types serialize with serde so the surrounding tooling can
//! remember previous choices.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interpolation::Interpolation;

/// Extra border, in voxels on each axis, kept black around the sample in
/// deconvolution mode so the point spread function does not see hard edges.
pub const DECONVOLUTION_BLEND_BORDER: f64 = 15.0;

// =============================================================================
// Output region
// =============================================================================

/// Crop of the output bounding box, in unscaled output-space voxels.
///
/// A zero size on an axis means "use the full bounding box" on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Crop {
    pub offset: [usize; 3],
    pub size: [usize; 3],
}

impl Crop {
    pub fn new(offset: [usize; 3], size: [usize; 3]) -> Self {
        Self { offset, size }
    }
}

// =============================================================================
// Weighting strategies
// =============================================================================

/// Per-view weights computed from a single view's content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IsolatedStrategy {
    /// Local Shannon entropy over a cubic window of `window` voxels per side.
    Entropy { window: usize, bins: usize },
    /// Gaussian-smoothed squared difference to a Gaussian-smoothed image.
    GaussContent { sigma1: f32, sigma2: f32 },
    /// Box-mean variant of [`IsolatedStrategy::GaussContent`], radii in voxels.
    AverageContent { radius1: usize, radius2: usize },
}

impl IsolatedStrategy {
    pub fn entropy() -> Self {
        Self::Entropy {
            window: 9,
            bins: 256,
        }
    }

    pub fn gauss_content() -> Self {
        Self::GaussContent {
            sigma1: 20.0,
            sigma2: 40.0,
        }
    }

    pub fn average_content() -> Self {
        Self::AverageContent {
            radius1: 10,
            radius2: 20,
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            IsolatedStrategy::Entropy { window, bins } => {
                if window == 0 || bins < 2 {
                    return Err(Error::InvalidConfig(format!(
                        "entropy needs window >= 1 and bins >= 2 (got {window}, {bins})"
                    )));
                }
            }
            IsolatedStrategy::GaussContent { sigma1, sigma2 } => {
                if !(sigma1 > 0.0 && sigma2 > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "gauss content sigmas must be positive (got {sigma1}, {sigma2})"
                    )));
                }
            }
            IsolatedStrategy::AverageContent { .. } => {}
        }
        Ok(())
    }
}

/// Extent of the blending falloff zone along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BlendWidth {
    /// Fraction of half the view's extent on each axis.
    Relative(f64),
    /// Fixed number of view voxels on each axis.
    Absolute([f64; 3]),
}

/// Linear blending near view borders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendConfig {
    /// Distance from each face, in view voxels, that gets zero weight.
    pub border: [f64; 3],
    pub width: BlendWidth,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            border: [0.0; 3],
            width: BlendWidth::Relative(0.3),
        }
    }
}

impl BlendConfig {
    pub fn absolute(margin: f64) -> Self {
        Self {
            border: [0.0; 3],
            width: BlendWidth::Absolute([margin; 3]),
        }
    }

    /// The same blend with [`DECONVOLUTION_BLEND_BORDER`] added to the border.
    pub fn for_deconvolution(mut self) -> Self {
        for b in &mut self.border {
            *b += DECONVOLUTION_BLEND_BORDER;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        let ok = match self.width {
            BlendWidth::Relative(f) => f > 0.0,
            BlendWidth::Absolute(w) => w.iter().all(|&v| v > 0.0),
        };
        if !ok || self.border.iter().any(|&b| !(b >= 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "blend width must be positive and border non-negative ({self:?})"
            )));
        }
        Ok(())
    }
}

/// Weights computed jointly for all views covering an output point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CombinedStrategy {
    Blending(BlendConfig),
}

/// Which weighteners a run uses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightStrategies {
    pub isolated: Vec<IsolatedStrategy>,
    pub combined: Vec<CombinedStrategy>,
}

impl WeightStrategies {
    /// Linear blending only.
    pub fn blending() -> Self {
        Self {
            isolated: Vec::new(),
            combined: vec![CombinedStrategy::Blending(BlendConfig::default())],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.isolated.is_empty() && self.combined.is_empty()
    }
}

// =============================================================================
// Run configuration
// =============================================================================

/// Everything one fusion run needs besides the views themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Isotropic downsampling factor of the output grid (>= 1).
    pub scale: usize,
    pub crop: Crop,
    /// Upper bound on views resident at the same time (>= 1).
    pub parallel_views: usize,
    /// Produce per-view inputs for multi-view deconvolution.
    pub is_deconvolution: bool,
    /// In deconvolution mode, load views one at a time.
    pub sequential_batching: bool,
    /// Produce one output per view instead of a single fused volume.
    pub multiple_distinct_outputs: bool,
    pub interpolation: Interpolation,
    pub weights: WeightStrategies,
    /// Worker threads; defaults to the available hardware parallelism.
    pub num_threads: usize,
    /// Channel ids to fuse. Empty fuses every channel present.
    pub channels: Vec<u32>,
    /// Timepoint the views belong to, used for output naming.
    pub timepoint: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            scale: 1,
            crop: Crop::default(),
            parallel_views: 1,
            is_deconvolution: false,
            sequential_batching: false,
            multiple_distinct_outputs: false,
            interpolation: Interpolation::Linear,
            weights: WeightStrategies::blending(),
            num_threads: default_num_threads(),
            channels: Vec::new(),
            timepoint: 0,
        }
    }
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl FusionConfig {
    pub fn with_scale(mut self, scale: usize) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_crop(mut self, crop: Crop) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_parallel_views(mut self, parallel_views: usize) -> Self {
        self.parallel_views = parallel_views;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_weights(mut self, weights: WeightStrategies) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_channels(mut self, channels: Vec<u32>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_deconvolution(mut self, sequential_batching: bool) -> Self {
        self.is_deconvolution = true;
        self.sequential_batching = sequential_batching;
        self
    }

    pub fn with_multiple_outputs(mut self) -> Self {
        self.multiple_distinct_outputs = true;
        self
    }

    pub fn with_timepoint(mut self, timepoint: u32) -> Self {
        self.timepoint = timepoint;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 {
            return Err(Error::InvalidConfig("scale must be >= 1".to_string()));
        }
        if self.parallel_views == 0 {
            return Err(Error::InvalidConfig(
                "parallel_views must be >= 1".to_string(),
            ));
        }
        if self.num_threads == 0 {
            return Err(Error::InvalidConfig("num_threads must be >= 1".to_string()));
        }
        for strategy in &self.weights.isolated {
            strategy.validate()?;
        }
        for CombinedStrategy::Blending(blend) in &self.weights.combined {
            blend.validate()?;
        }
        Ok(())
    }
}
