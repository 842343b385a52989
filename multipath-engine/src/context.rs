// SPDX-License-Identifier: GPL-3.0-only

//! Explicit configuration context.
//!
//! Everything a selector or the coalescer reads from configuration comes from
//! a [`ConfigContext`] passed in by the caller; there is no process-wide
//! configuration state.

use std::io::ErrorKind;
use std::path::Path;

use multipath_sys::AliasResolver;
use multipath_types::{Config, HwEntry, MultipathEntry, PathGroupingPolicy};
use regex::Regex;
use tracing::debug;

use crate::blacklist::Blacklist;
use crate::error::ConfigError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/multipath.toml";

/// Per-invocation switches that do not come from the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute and print maps without touching the kernel.
    pub dry_run: bool,
    /// Grouping policy forced from the command line.
    pub pg_policy: Option<PathGroupingPolicy>,
}

#[derive(Debug, Clone)]
struct HwMatcher {
    vendor: Regex,
    product: Regex,
}

#[derive(Debug, Clone)]
pub struct ConfigContext {
    config: Config,
    options: RunOptions,
    blacklist: Blacklist,
    hw_matchers: Vec<HwMatcher>,
    aliases: AliasResolver,
}

impl ConfigContext {
    pub fn new(config: Config, options: RunOptions) -> Result<Self, ConfigError> {
        let blacklist = Blacklist::new(&config.blacklist, &config.blacklist_exceptions)?;
        let hw_matchers = config
            .devices
            .iter()
            .map(|hwe| {
                Ok(HwMatcher {
                    vendor: compile(&hwe.vendor)?,
                    product: compile(&hwe.product)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let aliases = AliasResolver::new(&config.defaults.bindings_file);

        Ok(Self {
            config,
            options,
            blacklist,
            hw_matchers,
            aliases,
        })
    }

    /// Load the TOML file at `path`. A missing file means built-in defaults.
    pub fn load(path: &Path, options: RunOptions) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Config::from_toml_str(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not found, using built-in defaults", path.display());
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::new(config, options)
    }

    /// Replace the alias resolver, e.g. to point at another bindings file.
    pub fn with_alias_resolver(mut self, aliases: AliasResolver) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn aliases(&self) -> &AliasResolver {
        &self.aliases
    }

    pub fn is_blacklisted(&self, wwid: &str) -> bool {
        self.blacklist.is_blacklisted(wwid)
    }

    pub fn find_mpe(&self, wwid: &str) -> Option<&MultipathEntry> {
        self.config.find_multipath_entry(wwid)
    }

    /// First hardware entry whose vendor and product patterns both match.
    pub fn find_hwe(&self, vendor: &str, product: &str) -> Option<&HwEntry> {
        self.hw_matchers
            .iter()
            .position(|m| m.vendor.is_match(vendor) && m.product.is_match(product))
            .map(|index| &self.config.devices[index])
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
