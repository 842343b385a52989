// SPDX-License-Identifier: GPL-3.0-only

//! Configuration file model.
//!
//! The file is TOML. Every policy knob is optional so that property selection
//! can tell "not set in this layer" apart from a value, and fall through from
//! a per-wwid `[[multipaths]]` entry to a per-hardware `[[devices]]` entry to
//! `[defaults]` and finally to the built-in default.
//!
//! ```toml
//! [defaults]
//! user_friendly_names = true
//! path_grouping_policy = "group_by_prio"
//! no_path_retry = "queue"
//!
//! [blacklist]
//! wwid = ["^3600508e0+$"]
//!
//! [[multipaths]]
//! wwid = "3600a0b800011a1ee0000e0a24a1a5f2b"
//! alias = "oradata"
//!
//! [[devices]]
//! vendor = "NETAPP"
//! product = "LUN.*"
//! features = "1 queue_if_no_path"
//! hardware_handler = "1 alua"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::binding::DEFAULT_BINDINGS_FILE;

/// How paths of one device are partitioned into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathGroupingPolicy {
    #[default]
    Failover,
    Multibus,
    GroupBySerial,
    GroupByPrio,
}

impl PathGroupingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failover => "failover",
            Self::Multibus => "multibus",
            Self::GroupBySerial => "group_by_serial",
            Self::GroupByPrio => "group_by_prio",
        }
    }
}

impl fmt::Display for PathGroupingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathGroupingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failover" => Ok(Self::Failover),
            "multibus" => Ok(Self::Multibus),
            "group_by_serial" => Ok(Self::GroupBySerial),
            "group_by_prio" => Ok(Self::GroupByPrio),
            other => Err(format!("unknown path grouping policy: {other}")),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrKeyword {
    Number(u32),
    Keyword(String),
}

/// When to fail back to the best path group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "NumberOrKeyword")]
pub enum Failback {
    #[default]
    Manual,
    Immediate,
    /// Wait this many seconds before failing back.
    Deferred(u32),
}

impl TryFrom<NumberOrKeyword> for Failback {
    type Error = String;

    fn try_from(value: NumberOrKeyword) -> Result<Self, Self::Error> {
        match value {
            NumberOrKeyword::Number(secs) => Ok(Self::Deferred(secs)),
            NumberOrKeyword::Keyword(word) => match word.as_str() {
                "manual" => Ok(Self::Manual),
                "immediate" => Ok(Self::Immediate),
                other => Err(format!("invalid failback value: {other}")),
            },
        }
    }
}

/// Queueing behaviour when every path is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "NumberOrKeyword")]
pub enum NoPathRetry {
    #[default]
    Undef,
    Fail,
    Queue,
    /// Keep queueing for this many checker intervals.
    Retries(u32),
}

impl NoPathRetry {
    pub fn is_set(&self) -> bool {
        *self != Self::Undef
    }
}

impl TryFrom<NumberOrKeyword> for NoPathRetry {
    type Error = String;

    fn try_from(value: NumberOrKeyword) -> Result<Self, Self::Error> {
        match value {
            NumberOrKeyword::Number(0) => Ok(Self::Fail),
            NumberOrKeyword::Number(n) => Ok(Self::Retries(n)),
            NumberOrKeyword::Keyword(word) => match word.as_str() {
                "fail" => Ok(Self::Fail),
                "queue" => Ok(Self::Queue),
                other => Err(format!("invalid no_path_retry value: {other}")),
            },
        }
    }
}

/// Round-robin weighting across paths of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RrWeight {
    #[default]
    Uniform,
    Priorities,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub user_friendly_names: bool,
    pub bindings_file: PathBuf,
    pub path_grouping_policy: Option<PathGroupingPolicy>,
    pub path_selector: Option<String>,
    pub features: Option<String>,
    pub hardware_handler: Option<String>,
    pub failback: Option<Failback>,
    pub rr_weight: Option<RrWeight>,
    pub rr_min_io: Option<u32>,
    pub no_path_retry: Option<NoPathRetry>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            user_friendly_names: false,
            bindings_file: PathBuf::from(DEFAULT_BINDINGS_FILE),
            path_grouping_policy: None,
            path_selector: None,
            features: None,
            hardware_handler: None,
            failback: None,
            rr_weight: None,
            rr_min_io: None,
            no_path_retry: None,
        }
    }
}

/// Regular expressions matched against wwids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct BlacklistSection {
    pub wwid: Vec<String>,
}

/// Per-wwid settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MultipathEntry {
    pub wwid: String,
    pub alias: Option<String>,
    pub path_grouping_policy: Option<PathGroupingPolicy>,
    pub path_selector: Option<String>,
    pub failback: Option<Failback>,
    pub rr_weight: Option<RrWeight>,
    pub rr_min_io: Option<u32>,
    pub no_path_retry: Option<NoPathRetry>,
}

/// Per-hardware settings, matched on vendor and product regexes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct HwEntry {
    pub vendor: String,
    pub product: String,
    pub path_grouping_policy: Option<PathGroupingPolicy>,
    pub path_selector: Option<String>,
    pub features: Option<String>,
    pub hardware_handler: Option<String>,
    pub failback: Option<Failback>,
    pub rr_weight: Option<RrWeight>,
    pub rr_min_io: Option<u32>,
    pub no_path_retry: Option<NoPathRetry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub blacklist: BlacklistSection,
    pub blacklist_exceptions: BlacklistSection,
    pub multipaths: Vec<MultipathEntry>,
    pub devices: Vec<HwEntry>,
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Per-wwid entry, if one is configured.
    pub fn find_multipath_entry(&self, wwid: &str) -> Option<&MultipathEntry> {
        self.multipaths.iter().find(|entry| entry.wwid == wwid)
    }
}
