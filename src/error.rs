//! Error types for CellarDB
//!
//! Provides a unified error type for all operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using CellarError
pub type Result<T> = std::result::Result<T, CellarError>;

/// Unified error type for CellarDB operations
#[derive(Debug, Error)]
pub enum CellarError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error during {op} on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} {key} has been deleted")]
    Deleted { entity: &'static str, key: String },

    #[error("{entity} {key} is already deleted")]
    AlreadyDeleted { entity: &'static str, key: String },

    #[error("duplicate {entity} key {key}")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("record payload of {len} bytes exceeds maximum of {max}")]
    RecordTooLarge { len: usize, max: usize },

    #[error("{entity} id space exhausted")]
    IdSpaceExhausted { entity: &'static str },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("corrupt file {} at offset {offset}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index capacity exceeded: {0}")]
    IndexCapacity(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CellarError {
    pub(crate) fn corrupt(path: &Path, offset: u64, reason: impl Into<String>) -> Self {
        CellarError::Corrupt {
            path: path.to_path_buf(),
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        CellarError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn deleted(entity: &'static str, key: impl ToString) -> Self {
        CellarError::Deleted {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn already_deleted(entity: &'static str, key: impl ToString) -> Self {
        CellarError::AlreadyDeleted {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        CellarError::DuplicateKey {
            entity,
            key: key.to_string(),
        }
    }

    /// True for errors that mean "the bytes on disk are not what we expected"
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CellarError::Corrupt { .. })
    }
}

impl From<bincode::Error> for CellarError {
    fn from(e: bincode::Error) -> Self {
        CellarError::Serialization(e.to_string())
    }
}

/// Attach an operation name and path to a raw `std::io::Result`
pub trait IoContext<T> {
    fn io_context(self, op: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| CellarError::Io {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}
