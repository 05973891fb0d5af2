//! Load-time errors.
//!
//! Everything that can keep a renderable object from ever becoming ready is a
//! [`LoadError`]. Errors raised while preparing an object are fatal for that
//! object only: the scene logs them and keeps loading the rest.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("animation clip `{clip}` does not exist in the source data (available: {available:?})")]
    ClipNotFound { clip: String, available: Vec<String> },

    #[error("unsupported feature configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("invalid object data: {0}")]
    InvalidObjectData(String),

    #[error("cannot decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot read glTF file {path}: {source}")]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    #[error("device error: {0}")]
    Device(String),

    #[error("loading was abandoned before it completed")]
    Cancelled,
}

impl LoadError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoadError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }
}
