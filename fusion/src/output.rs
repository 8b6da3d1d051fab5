//! Destinations for fused channels.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{FusedVolume, FusionResult};
use crate::error::{Error, Result};
use crate::geometry::OutputGrid;
use crate::view::ViewInfo;
use crate::Volume;

/// Receives each fused channel as soon as it is done.
pub trait OutputSink {
    fn accept(&mut self, timepoint: u32, result: FusionResult) -> Result<()>;
}

/// Keeps every result in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub results: Vec<(u32, FusionResult)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for MemorySink {
    fn accept(&mut self, timepoint: u32, result: FusionResult) -> Result<()> {
        self.results.push((timepoint, result));
        Ok(())
    }
}

/// `img_tl{timepoint}_ch{channel}`, with `_angle{angle}` for per-view outputs.
pub fn output_name(timepoint: u32, channel: u32, view: Option<&ViewInfo>) -> String {
    match view {
        Some(view) => format!("img_tl{timepoint}_ch{channel}_angle{}", view.angle),
        None => format!("img_tl{timepoint}_ch{channel}"),
    }
}

/// Sidecar describing a raw volume file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVolumeHeader {
    pub name: String,
    /// `[width, height, depth]`, x fastest.
    pub dims: [usize; 3],
    pub sample_format: String,
    pub timepoint: u32,
    pub channel: u32,
    pub view: Option<ViewInfo>,
    pub grid: OutputGrid,
    /// File holding the summed weights, written for per-view outputs.
    pub weights_file: Option<String>,
}

/// Writes each output as `<name>.f32` (little-endian, x fastest) plus a
/// `<name>.json` header.
///
/// With `per_timepoint_dir`, files go into `<root>/<timepoint>/`.
#[derive(Debug, Clone)]
pub struct RawDirectorySink {
    root: PathBuf,
    per_timepoint_dir: bool,
}

impl RawDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            per_timepoint_dir: false,
        }
    }

    pub fn with_timepoint_dirs(mut self) -> Self {
        self.per_timepoint_dir = true;
        self
    }

    pub fn directory_for(&self, timepoint: u32) -> PathBuf {
        if self.per_timepoint_dir {
            self.root.join(timepoint.to_string())
        } else {
            self.root.clone()
        }
    }

    fn write_output(
        &self,
        dir: &Path,
        timepoint: u32,
        result: &FusionResult,
        output: &FusedVolume,
    ) -> Result<()> {
        let name = output_name(timepoint, result.channel, output.view.as_ref());

        write_raw(&dir.join(format!("{name}.f32")), &output.image)?;

        let weights_file = match output.view {
            Some(_) => {
                let file = format!("{name}_weights.f32");
                write_raw(&dir.join(&file), &output.weights)?;
                Some(file)
            }
            None => None,
        };

        let header = RawVolumeHeader {
            name: name.clone(),
            dims: output.image.dims(),
            sample_format: "f32le".to_string(),
            timepoint,
            channel: result.channel,
            view: output.view.clone(),
            grid: result.grid,
            weights_file,
        };
        let header_path = dir.join(format!("{name}.json"));
        let json = serde_json::to_string_pretty(&header).map_err(|e| Error::WriteOutput {
            path: header_path.clone(),
            source: e.into(),
        })?;
        fs::write(&header_path, json).map_err(|source| Error::WriteOutput {
            path: header_path.clone(),
            source,
        })?;

        tracing::info!(path = %dir.join(format!("{name}.f32")).display(), "Saved fused volume");
        Ok(())
    }
}

impl OutputSink for RawDirectorySink {
    fn accept(&mut self, timepoint: u32, result: FusionResult) -> Result<()> {
        let dir = self.directory_for(timepoint);
        fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreation {
            path: dir.clone(),
            source,
        })?;

        for output in &result.outputs {
            self.write_output(&dir, timepoint, &result, output)?;
        }
        Ok(())
    }
}

fn write_raw(path: &Path, volume: &Volume) -> Result<()> {
    let to_err = |source| Error::WriteOutput {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(to_err)?);
    for value in volume.pixels() {
        writer.write_all(&value.to_le_bytes()).map_err(to_err)?;
    }
    writer.flush().map_err(to_err)
}
