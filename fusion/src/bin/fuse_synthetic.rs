//! Simulates a four-angle bead dataset, fuses it and writes the result as raw volumes.
//!
//! Usage: `fuse_synthetic [OUTPUT_DIR] [SCALE]`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::DVec3;

use common::log_setup::setup_logging;
use fusion::simulation::{BeadSimulation, DEFAULT_SEED};
use fusion::{
    FusionConfig, FusionControl, IsolatedStrategy, RawDirectorySink, WeightStrategies,
};

const VIEW_SIZE: usize = 64;
const ANGLES: [u32; 4] = [0, 45, 90, 135];
const BEADS: usize = 200;

fn main() -> Result<()> {
    setup_logging("info", Path::new("logs"), "fusion")?;

    let mut args = std::env::args().skip(1);
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fused_output"));
    let scale = match args.next() {
        Some(s) => s.parse::<usize>().context("SCALE must be a positive integer")?,
        None => 1,
    };

    let margin = VIEW_SIZE as f64 * 0.2;
    let simulation = BeadSimulation::random(
        BEADS,
        DVec3::splat(margin),
        DVec3::splat(VIEW_SIZE as f64 - margin),
        DEFAULT_SEED,
    );
    let views = simulation.rotated_views(VIEW_SIZE, &ANGLES, 0)?;
    tracing::info!(views = views.len(), beads = BEADS, "Simulated dataset");

    let mut weights = WeightStrategies::blending();
    weights.isolated.push(IsolatedStrategy::entropy());

    let config = FusionConfig::default()
        .with_scale(scale)
        .with_parallel_views(2)
        .with_weights(weights);
    let control = FusionControl::new(config)?;

    let mut sink = RawDirectorySink::new(&output_dir);
    let grid = control.run(&views, &mut sink)?;

    tracing::info!(
        dims = ?grid.dims,
        output = %output_dir.display(),
        "Fusion finished"
    );
    Ok(())
}
