// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Why a candidate device was dropped from this pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("{alias}: devmap size is unknown")]
    UnknownSize { alias: String },

    #[error("{alias}: problem assembling map: {reason}")]
    Assembly { alias: String, reason: String },
}

/// Conditions that end a coalescing pass early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalesceError {
    /// A member path is locked by another process; retry on a later pass.
    #[error("{alias}: in use")]
    DeviceBusy { alias: String },
}
