// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for multipath management
//!
//! This crate owns everything that touches the host directly:
//! - The bindings file (alias ↔ wwid records) with its record lock
//! - Alias resolution on top of the bindings file
//! - Device-mapper operations through `dmsetup`
//! - Advisory locks on path device nodes
//!
//! Map operations and node locks require root.

pub mod bindings;
pub mod devmapper;
pub mod error;
pub mod path_lock;

pub use bindings::{AliasResolver, BindingStore, LockRetry, Lookup};
pub use devmapper::DmsetupCli;
pub use error::{Result, SysError};
pub use path_lock::FlockPathLocker;
