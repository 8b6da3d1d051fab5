//! Views: registered input volumes with metadata and on-demand pixel data.

use std::fmt;
use std::io;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transform::Affine3;
use crate::Volume;

/// Identity of a view inside its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ViewInfo {
    pub name: String,
    pub channel: u32,
    pub angle: u32,
    pub illumination: u32,
    pub timepoint: u32,
}

impl ViewInfo {
    pub fn new(name: impl Into<String>, channel: u32, angle: u32, timepoint: u32) -> Self {
        Self {
            name: name.into(),
            channel,
            angle,
            illumination: 0,
            timepoint,
        }
    }
}

impl fmt::Display for ViewInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (tp={}, ch={}, angle={}, ill={})",
            self.name, self.timepoint, self.channel, self.angle, self.illumination
        )
    }
}

/// Provider of a view's pixel data.
///
/// `load` is called when a batch containing the view starts and `unload` once the
/// batch is done with it, on success and failure alike.
pub trait VolumeSource: Send + Sync + fmt::Debug {
    fn load(&self) -> io::Result<Arc<Volume>>;

    fn unload(&self) {}
}

/// Pixel data that is already resident.
#[derive(Debug, Clone)]
pub struct MemorySource {
    volume: Arc<Volume>,
}

impl MemorySource {
    pub fn new(volume: Volume) -> Self {
        Self {
            volume: Arc::new(volume),
        }
    }
}

impl VolumeSource for MemorySource {
    fn load(&self) -> io::Result<Arc<Volume>> {
        Ok(Arc::clone(&self.volume))
    }
}

/// An input volume with its registration.
///
/// Metadata and the transform are always available; pixel data is only
/// resident between [`LoadedBatch::load`] and the batch's drop.
#[derive(Debug, Clone)]
pub struct View {
    info: ViewInfo,
    size: [usize; 3],
    calibration: DVec3,
    transform: Affine3,
    connected_views: usize,
    used_for_registration: bool,
    source: Arc<dyn VolumeSource>,
}

impl View {
    /// A view registered to at least one other view and used for registration.
    pub fn new(
        info: ViewInfo,
        size: [usize; 3],
        transform: Affine3,
        source: Arc<dyn VolumeSource>,
    ) -> Self {
        Self {
            info,
            size,
            calibration: DVec3::ONE,
            transform,
            connected_views: 1,
            used_for_registration: true,
            source,
        }
    }

    pub fn from_volume(info: ViewInfo, volume: Volume, transform: Affine3) -> Self {
        let size = volume.dims();
        Self::new(info, size, transform, Arc::new(MemorySource::new(volume)))
    }

    /// Number of other views this one is linked to, and whether it took part in registration.
    pub fn with_connectivity(mut self, connected_views: usize, used_for_registration: bool) -> Self {
        self.connected_views = connected_views;
        self.used_for_registration = used_for_registration;
        self
    }

    /// Physical voxel size, kept as metadata for downstream placement.
    pub fn with_calibration(mut self, calibration: DVec3) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn info(&self) -> &ViewInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn calibration(&self) -> DVec3 {
        self.calibration
    }

    pub fn transform(&self) -> &Affine3 {
        &self.transform
    }

    pub fn connected_views(&self) -> usize {
        self.connected_views
    }

    pub fn is_connected(&self) -> bool {
        self.connected_views > 0
    }

    pub fn used_for_registration(&self) -> bool {
        self.used_for_registration
    }

    /// Loads pixel data and checks it against the declared grid size.
    pub fn load(&self) -> Result<Arc<Volume>> {
        let volume = self.source.load().map_err(|source| Error::VolumeLoad {
            view: self.info.name.clone(),
            source,
        })?;

        if volume.dims() != self.size {
            self.source.unload();
            return Err(Error::VolumeLoad {
                view: self.info.name.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "expected {:?} voxels, source provided {:?}",
                        self.size,
                        volume.dims()
                    ),
                ),
            });
        }

        Ok(volume)
    }

    fn unload(&self) {
        self.source.unload();
    }
}

/// Decides which of `views` take part in fusion.
///
/// A view is used when it is connected to another view or is the only view of
/// the dataset. A view that was not used for registration is still fused when a
/// view of the same angle and timepoint was.
pub fn usable_views(views: &[&View], dataset: &[View]) -> Vec<bool> {
    let single_view = dataset.len() == 1;
    views
        .iter()
        .map(|view| {
            let mut usable = view.is_connected() || single_view;
            if !view.used_for_registration() {
                usable |= dataset.iter().any(|other| {
                    other.used_for_registration()
                        && other.info.angle == view.info.angle
                        && other.info.timepoint == view.info.timepoint
                });
            }
            usable
        })
        .collect()
}

/// Pixel data of one batch of views.
///
/// Views are unloaded when the batch is dropped.
#[derive(Debug)]
pub struct LoadedBatch<'a> {
    views: Vec<&'a View>,
    volumes: Vec<Option<Arc<Volume>>>,
}

impl<'a> LoadedBatch<'a> {
    /// Loads every view whose `active` flag is set.
    ///
    /// Inactive views and views that fail to load stay `None`. The failures
    /// are returned with the view's offset in the batch.
    pub fn load(views: &[&'a View], active: &[bool]) -> (Self, Vec<(usize, Error)>) {
        let mut batch = Self {
            views: views.to_vec(),
            volumes: Vec::with_capacity(views.len()),
        };
        let mut failed = Vec::new();

        for (offset, &view) in views.iter().enumerate() {
            if !active.get(offset).copied().unwrap_or(false) {
                batch.volumes.push(None);
                continue;
            }

            tracing::debug!(view = view.name(), "Loading view");
            match view.load() {
                Ok(volume) => batch.volumes.push(Some(volume)),
                Err(e) => {
                    batch.volumes.push(None);
                    failed.push((offset, e));
                }
            }
        }

        (batch, failed)
    }

    /// Whether any view of the batch has pixel data.
    pub fn any_loaded(&self) -> bool {
        self.volumes.iter().any(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn volume(&self, offset: usize) -> Option<&Volume> {
        self.volumes[offset].as_deref()
    }

    pub fn volumes(&self) -> &[Option<Arc<Volume>>] {
        &self.volumes
    }
}

impl Drop for LoadedBatch<'_> {
    fn drop(&mut self) {
        for (view, volume) in self.views.iter().zip(&mut self.volumes) {
            if volume.take().is_some() {
                tracing::debug!(view = view.name(), "Unloading view");
                view.unload();
            }
        }
    }
}
