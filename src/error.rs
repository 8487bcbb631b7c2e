// src/error.rs
//! Error taxonomy for the storage engine.
//!
//! Only `StorageError` ever reaches a caller. Archive and cleanup failures are
//! logged by the sweep that hit them and retried on the next natural sweep.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage root (or an entity directory under it) could not be prepared.
    #[error("cannot prepare storage directory {}: {source}", path.display())]
    Init {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Creating or appending to a daily log failed.
    #[error("cannot write daily log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("entity name {0:?} has no usable characters")]
    InvalidEntity(String),
}

impl StorageError {
    pub(crate) fn init(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Init {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive io on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip container: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
