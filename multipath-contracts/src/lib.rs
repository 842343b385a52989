// SPDX-License-Identifier: GPL-3.0-only

//! Narrow interfaces the reconciliation engine drives.
//!
//! The engine never talks to the kernel or to device nodes directly. It goes
//! through [`DeviceMapper`] for map operations and [`PathLocker`] for the
//! per-path advisory locks taken while a map is created.

pub mod error;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DmError, DmErrorKind};
pub use traits::{DeviceMapper, MapOp, PathLocker};
