// SPDX-License-Identifier: GPL-3.0-only

//! Persistent alias bindings.
//!
//! One process at a time holds the bindings file open under an exclusive
//! record lock. Every lookup rescans the file from the start, so nothing is
//! cached across invocations and records appended by other processes are
//! always seen.

mod resolver;
mod store;

pub use resolver::AliasResolver;
pub use store::{BindingStore, LockRetry, Lookup};
