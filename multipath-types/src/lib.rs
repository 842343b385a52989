// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for multipath device aggregation
//!
//! This crate defines the types shared by every layer of the stack:
//!
//! - **multipath-sys**: persists [`Binding`] records and drives the kernel
//! - **multipath-engine**: coalesces [`Path`]s into [`MultipathDevice`]s and
//!   decides the [`Action`] each one needs
//! - **multipath-cli**: reads discovery snapshots and the [`Config`] file
//!
//! ## Ownership
//!
//! Paths are owned by the discovery layer and live in one flat table
//! (`Vec<Path>`). Devices and path groups only ever refer to paths by their
//! index in that table, and a path refers back to the device that claimed it
//! through a [`DeviceHandle`]. Nothing holds a reference that a device removal
//! could leave dangling.

pub mod action;
pub mod binding;
pub mod config;
pub mod multipath;
pub mod path;
pub mod pathgroup;

pub use action::Action;
pub use binding::{
    BINDINGS_FILE_HEADER, Binding, BindingLine, DEFAULT_BINDINGS_FILE, RESERVED_ALIAS_PREFIX,
    parse_binding_line, reserved_alias_id,
};
pub use config::{
    BlacklistSection, Config, Defaults, Failback, HwEntry, MultipathEntry, NoPathRetry,
    PathGroupingPolicy, RrWeight,
};
pub use multipath::{DEFAULT_TARGET, MultipathDevice, Snapshot, find_by_alias, find_by_wwid};
pub use path::{DeviceHandle, DmPathState, Path, PathState};
pub use pathgroup::{GroupId, PathGroup, PathGroupStatus};
