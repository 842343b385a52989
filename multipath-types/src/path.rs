// SPDX-License-Identifier: GPL-3.0-only

//! Raw block-device paths as reported by discovery.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Checker verdict for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    #[default]
    Unchecked,
    Down,
    Up,
    Shaky,
    Ghost,
}

impl PathState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "undef",
            Self::Down => "faulty",
            Self::Up => "ready",
            Self::Shaky => "shaky",
            Self::Ghost => "ghost",
        }
    }
}

/// Path state as last seen in the kernel map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmPathState {
    #[default]
    Undef,
    Active,
    Failed,
}

impl DmPathState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undef => "undef",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

/// Index of a device in the table built by one coalescing pass.
///
/// Paths point back at the device that claimed them with this handle instead
/// of a reference, so dropping a device never leaves a dangling path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub usize);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One OS-visible route to a storage device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// Kernel device name (e.g. "sdc"). Empty once the path left sysfs.
    #[serde(default)]
    pub dev: String,

    /// "major:minor" identity used in map tables.
    pub dev_t: String,

    /// World-wide identifier of the storage device behind this path.
    #[serde(default)]
    pub wwid: String,

    /// Size in 512-byte sectors; zero when unknown.
    #[serde(default)]
    pub size: u64,

    /// Priority reported by the prioritizer. Negative means unusable.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub state: PathState,

    #[serde(default)]
    pub dm_state: DmPathState,

    #[serde(default)]
    pub vendor: String,

    #[serde(default)]
    pub product: String,

    #[serde(default)]
    pub serial: String,

    /// Device that claimed this path during the current pass.
    #[serde(skip)]
    pub owner: Option<DeviceHandle>,
}

impl Path {
    /// Build a path with only its identity filled in.
    pub fn new(dev: impl Into<String>, dev_t: impl Into<String>, wwid: impl Into<String>) -> Self {
        Self {
            dev: dev.into(),
            dev_t: dev_t.into(),
            wwid: wwid.into(),
            size: 0,
            priority: 0,
            state: PathState::Unchecked,
            dm_state: DmPathState::Undef,
            vendor: String::new(),
            product: String::new(),
            serial: String::new(),
            owner: None,
        }
    }

    /// True when the wwid carries no identity at all (empty or all NUL).
    pub fn has_null_wwid(&self) -> bool {
        self.wwid.bytes().all(|b| b == 0)
    }

    /// A path whose device name is gone has vanished from sysfs.
    pub fn is_present(&self) -> bool {
        !self.dev.is_empty()
    }

    pub fn is_up(&self) -> bool {
        self.state == PathState::Up
    }
}
