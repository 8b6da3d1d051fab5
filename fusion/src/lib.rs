//! Fusion - weighted multi-view fusion of registered 3D microscopy volumes.
//!
//! Each view is a 3D image with an affine transform into a shared output space.
//! The library computes the output grid covering all views, then fills it voxel
//! by voxel with a weighted average of the interpolated view intensities:
//! - Output grid from the union of view bounding boxes, with crop and downsampling
//! - Pluggable weights: per-view content weights (entropy, Gaussian/average
//!   content) and cross-view blending near view borders
//! - Bounded memory through batches of resident views, deterministic
//!   multi-threading through stride partitioning
//! - A shared normalized output, or per-view weighted outputs for deconvolution
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fusion::{FusionConfig, FusionControl, MemorySink};
//!
//! let control = FusionControl::new(FusionConfig::default().with_parallel_views(2))?;
//! let mut sink = MemorySink::new();
//! let grid = control.run(&views, &mut sink)?;
//!
//! println!("Fused {} channels into {:?}", sink.results.len(), grid.dims);
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod interpolation;
pub mod output;
pub mod partition;
pub mod simulation;
pub mod transform;
pub mod view;
pub mod weights;

/// Dense 3D intensity volume, x fastest.
pub type Volume = common::buffer3::Buffer3<f32>;

// ============================================================================
// Configuration and control
// ============================================================================

pub use config::{
    BlendConfig, BlendWidth, CombinedStrategy, Crop, FusionConfig, IsolatedStrategy,
    WeightStrategies, DECONVOLUTION_BLEND_BORDER,
};
pub use dispatch::{FusionControl, FusionPlan, FusionVariant};

// ============================================================================
// Data model
// ============================================================================

pub use geometry::{compute_output_grid, OutputGrid};
pub use interpolation::Interpolation;
pub use transform::Affine3;
pub use view::{LoadedBatch, MemorySource, View, ViewInfo, VolumeSource};

// ============================================================================
// Engine and results
// ============================================================================

pub use engine::{
    EngineSettings, FusedVolume, FusionEngine, FusionResult, FusionState, PerViewFusion,
    SharedOutputFusion,
};
pub use error::{Diagnostic, Diagnostics, Error, Result};
pub use output::{MemorySink, OutputSink, RawDirectorySink};

// ============================================================================
// Weights
// ============================================================================

pub use weights::{
    CombinedWeightener, CombinedWeightenerFactory, IsolatedWeightener, WeightVolume, Weighteners,
};
