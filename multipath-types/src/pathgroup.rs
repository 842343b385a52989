// SPDX-License-Identifier: GPL-3.0-only

//! Path groups: sets of paths treated as equally preferred.

use serde::{Deserialize, Serialize};

use crate::path::{Path, PathState};

/// Kernel-side status of a path group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathGroupStatus {
    #[default]
    Undef,
    Enabled,
    Disabled,
    Active,
}

impl PathGroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undef => "undef",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Active => "active",
        }
    }
}

/// Order-independent identity of a group's membership.
///
/// Built by folding a stable hash of each member's `dev_t` with XOR, so two
/// groups holding the same paths compare equal regardless of member order or
/// of which process computed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupId(pub u64);

/// Ordered collection of path-table indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathGroup {
    pub paths: Vec<usize>,

    #[serde(default)]
    pub status: PathGroupStatus,

    /// Sum of member priorities, refreshed by best-group selection.
    #[serde(default)]
    pub priority: i64,
}

impl PathGroup {
    pub fn new(paths: Vec<usize>) -> Self {
        Self {
            paths,
            status: PathGroupStatus::Undef,
            priority: 0,
        }
    }

    pub fn id(&self, table: &[Path]) -> GroupId {
        GroupId(
            self.paths
                .iter()
                .filter_map(|&index| table.get(index))
                .fold(0, |acc, path| acc ^ fnv1a(path.dev_t.as_bytes())),
        )
    }

    /// Recompute `priority` from members that are not down.
    pub fn refresh_priority(&mut self, table: &[Path]) -> i64 {
        self.priority = self
            .paths
            .iter()
            .filter_map(|&index| table.get(index))
            .filter(|path| path.state != PathState::Down)
            .map(|path| i64::from(path.priority))
            .sum();
        self.priority
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
