//! Error and diagnostic types for fusion operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while computing the output grid, fusing, or routing results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No connected view contributes to the output bounding box")]
    NoValidGeometry,

    #[error("Not enough memory for {strategy} weights ({voxels} voxels)")]
    WeightAllocationFailure {
        strategy: &'static str,
        voxels: usize,
    },

    #[error("Transform of view '{view}' is not invertible")]
    NonInvertibleTransform { view: String },

    #[error("Cannot allocate output volume of {dims:?} voxels")]
    OutputAllocationFailure { dims: [usize; 3] },

    #[error("Failed to load view '{view}': {source}")]
    VolumeLoad {
        view: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create directory '{path}': {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal degradation that happened during a fusion call.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Isolated weighting was switched off for the rest of the call.
    IsolatedWeightsDisabled { reason: String },
    /// The view's transform could not be inverted; it contributed nothing.
    NonInvertibleTransform { view: String },
    /// The view has no registration link and was left out.
    UnconnectedView { view: String },
    /// The view's pixel data could not be loaded; it contributed nothing from then on.
    ViewLoadFailed { view: String, reason: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::IsolatedWeightsDisabled { reason } => {
                write!(f, "isolated weights disabled: {reason}")
            }
            Diagnostic::NonInvertibleTransform { view } => {
                write!(f, "view '{view}' skipped: transform not invertible")
            }
            Diagnostic::UnconnectedView { view } => {
                write!(f, "view '{view}' skipped: not connected to any other view")
            }
            Diagnostic::ViewLoadFailed { view, reason } => {
                write!(f, "view '{view}' skipped: {reason}")
            }
        }
    }
}

/// Diagnostic notes attached to a best-effort result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    notes: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, note: Diagnostic) {
        self.notes.push(note);
    }

    pub fn notes(&self) -> &[Diagnostic] {
        &self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn contains(&self, predicate: impl Fn(&Diagnostic) -> bool) -> bool {
        self.notes.iter().any(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_valid_geometry_message() {
        let err = Error::NoValidGeometry;
        assert_eq!(
            err.to_string(),
            "No connected view contributes to the output bounding box"
        );
    }

    #[test]
    fn test_weight_allocation_message() {
        let err = Error::WeightAllocationFailure {
            strategy: "entropy",
            voxels: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("entropy"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_output_allocation_message() {
        let err = Error::OutputAllocationFailure {
            dims: [512, 256, 128],
        };
        assert!(err.to_string().contains("[512, 256, 128]"));
    }

    #[test]
    fn test_directory_creation_source_chain() {
        use std::error::Error as StdError;

        let err = Error::DirectoryCreation {
            path: PathBuf::from("/read-only/out"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert!(err.to_string().contains("/read-only/out"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_diagnostics_collects_notes() {
        let mut diagnostics = Diagnostics::default();
        assert!(diagnostics.is_empty());

        diagnostics.push(Diagnostic::NonInvertibleTransform {
            view: "angle 45".to_string(),
        });

        assert_eq!(diagnostics.notes().len(), 1);
        assert!(diagnostics.contains(|n| matches!(n, Diagnostic::NonInvertibleTransform { .. })));
        assert!(diagnostics.notes()[0].to_string().contains("angle 45"));
    }
}
