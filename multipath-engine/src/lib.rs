// SPDX-License-Identifier: GPL-3.0-only

//! Multipath reconciliation engine
//!
//! Turns a flat table of discovered paths into multipath devices and brings
//! the kernel's device-mapper state in line with them:
//!
//! 1. [`coalesce`] groups paths by wwid into candidate devices
//! 2. [`setup`] runs the [`propsel`] selectors and a [`pgpolicy`] and
//!    assembles target parameters
//! 3. [`select`] diffs each candidate against the active maps and picks an
//!    [`Action`](multipath_types::Action)
//! 4. [`apply`] carries the action out through the
//!    [`DeviceMapper`](multipath_contracts::DeviceMapper) contract
//!
//! All configuration arrives through an explicit [`ConfigContext`].

pub mod apply;
pub mod blacklist;
pub mod coalesce;
pub mod context;
pub mod error;
pub mod pgpolicy;
pub mod print;
pub mod propsel;
pub mod select;
pub mod setup;

pub use apply::{ApplyOutcome, domap, reinstate_paths};
pub use blacklist::Blacklist;
pub use coalesce::{CoalesceReport, Coalescer, DeviceOutcome};
pub use context::{ConfigContext, DEFAULT_CONFIG_FILE, RunOptions};
pub use error::{CoalesceError, ConfigError, SetupError};
pub use print::format_map;
pub use select::select_action;
pub use setup::setup_map;
