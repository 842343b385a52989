// SPDX-License-Identifier: GPL-3.0-only

//! Multipath device aggregates.

use serde::Deserialize;

use crate::action::Action;
use crate::config::{Failback, HwEntry, MultipathEntry, NoPathRetry, PathGroupingPolicy, RrWeight};
use crate::path::{Path, PathState};
use crate::pathgroup::PathGroup;

/// Device-mapper target type of every map this stack manages.
pub const DEFAULT_TARGET: &str = "multipath";

fn first_group() -> usize {
    1
}

/// Logical device presenting the path groups of one wwid.
///
/// Candidates are rebuilt from visible paths on every pass; the kernel table
/// is the only durable record. Active devices are read back from a discovery
/// snapshot, which is why only the kernel-visible fields deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultipathDevice {
    pub wwid: String,

    pub alias: String,

    /// Size in 512-byte sectors.
    #[serde(default)]
    pub size: u64,

    /// Members collected during coalescing, before grouping.
    #[serde(default)]
    pub paths: Vec<usize>,

    #[serde(default)]
    pub groups: Vec<PathGroup>,

    /// 1-based index of the group to activate.
    #[serde(skip)]
    pub best_group: usize,

    /// 1-based index of the group the kernel will use next.
    #[serde(default = "first_group")]
    pub next_group: usize,

    #[serde(default)]
    pub features: String,

    #[serde(default)]
    pub hwhandler: String,

    #[serde(default)]
    pub selector: String,

    #[serde(default)]
    pub minio: u32,

    #[serde(skip)]
    pub nr_active: usize,

    #[serde(skip)]
    pub pg_policy: PathGroupingPolicy,

    #[serde(skip)]
    pub failback: Failback,

    #[serde(skip)]
    pub rr_weight: RrWeight,

    #[serde(skip)]
    pub no_path_retry: NoPathRetry,

    /// Serialized target parameters.
    #[serde(skip)]
    pub params: String,

    #[serde(skip)]
    pub action: Action,

    #[serde(skip)]
    pub entry: Option<MultipathEntry>,

    #[serde(skip)]
    pub hw: Option<HwEntry>,
}

impl MultipathDevice {
    pub fn new(wwid: impl Into<String>) -> Self {
        Self {
            wwid: wwid.into(),
            best_group: 1,
            next_group: 1,
            ..Self::default()
        }
    }

    /// Path-table indices of every grouped member, in group order.
    pub fn grouped_paths(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flat_map(|group| group.paths.iter().copied())
    }

    /// Number of grouped members in `state`.
    pub fn path_count(&self, table: &[Path], state: PathState) -> usize {
        self.grouped_paths()
            .filter_map(|index| table.get(index))
            .filter(|path| path.state == state)
            .count()
    }

    /// A device is dead when none of its grouped paths is still in sysfs.
    pub fn is_dead(&self, table: &[Path]) -> bool {
        !self
            .grouped_paths()
            .filter_map(|index| table.get(index))
            .any(Path::is_present)
    }
}

/// Position of the active device named `alias`.
pub fn find_by_alias(devices: &[MultipathDevice], alias: &str) -> Option<usize> {
    devices.iter().position(|device| device.alias == alias)
}

/// Position of the active device bound to `wwid`.
pub fn find_by_wwid(devices: &[MultipathDevice], wwid: &str) -> Option<usize> {
    devices.iter().position(|device| device.wwid == wwid)
}

/// Discovery output: the path table and the maps currently in the kernel.
///
/// Groups of `maps` reference paths by their index in `paths`. Paths that the
/// kernel still lists but sysfs no longer shows appear with an empty `dev`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub paths: Vec<Path>,

    #[serde(default)]
    pub maps: Vec<MultipathDevice>,
}
