// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bindings file {path:?} is locked by another process")]
    StoreLocked { path: PathBuf },

    #[error("bindings store unusable: {0}")]
    StoreUnusable(String),

    #[error("invalid binding record: {0}")]
    InvalidRecord(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
