// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmErrorKind {
    /// Resource held by someone else; try again on a later pass.
    Busy,
    NotFound,
    CommandFailed,
    Io,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct DmError {
    pub kind: DmErrorKind,
    pub message: String,
}

impl DmError {
    pub fn new(kind: DmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(DmErrorKind::Busy, message)
    }

    pub fn is_busy(&self) -> bool {
        self.kind == DmErrorKind::Busy
    }
}

impl From<std::io::Error> for DmError {
    fn from(err: std::io::Error) -> Self {
        Self::new(DmErrorKind::Io, err.to_string())
    }
}
