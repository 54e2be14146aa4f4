//! Error types for image loading, overlay ingestion, configuration and
//! sidecar persistence.
//!
//! None of these are fatal to an annotation session: callers log them and
//! degrade to drawing less or ignoring the input.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to fetch or decode one image candidate.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Reading a local file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status} {status_text}")]
    Http {
        /// Status code of the response
        status: u16,
        /// Status text of the response
        status_text: String,
    },

    /// The request could not be performed at all
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The bytes were fetched but are not a decodable image
    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// The candidate list was empty
    #[error("No image candidates given")]
    EmptyCandidates,
}

/// Reasons a detection record cannot be turned into a drawable overlay.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    /// None of `segmentation`, `true_rbox` or `bbox` is populated
    #[error("Detection '{label}' has no shape")]
    NoShape {
        /// Label of the offending record
        label: String,
    },

    /// `bbox` does not have exactly four numbers
    #[error("Bounding box needs 4 numbers, got {len}")]
    BadBoundingBox {
        /// Number of values found
        len: usize,
    },

    /// `true_rbox` does not have exactly eight numbers
    #[error("Rotated box needs 8 numbers, got {len}")]
    BadRotatedBox {
        /// Number of values found
        len: usize,
    },

    /// Every polygon in `segmentation` has fewer than four vertices
    #[error("Segmentation has no polygon with at least 4 vertices")]
    NoValidPolygon,

    /// A coordinate is NaN or infinite
    #[error("Non-finite coordinate in detection '{label}'")]
    NonFinite {
        /// Label of the offending record
        label: String,
    },
}

/// Errors reading or validating the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error reading or writing the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Categories are enabled but none are listed
    #[error("Categories are enabled but the category list is empty")]
    NoCategories,

    /// The hit radius must be a positive finite number of pixels
    #[error("Invalid hit radius: {0}")]
    BadHitRadius(f32),
}

/// Errors reading or writing an annotation sidecar file.
#[derive(Error, Debug)]
pub enum SidecarError {
    /// I/O error reading or writing the sidecar
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// Sidecar path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SidecarError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
