// SPDX-License-Identifier: GPL-3.0-only

use multipath_types::BlacklistSection;
use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Compiled wwid blacklist with its exceptions.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    deny: Vec<Regex>,
    allow: Vec<Regex>,
}

impl Blacklist {
    pub fn new(deny: &BlacklistSection, allow: &BlacklistSection) -> Result<Self, ConfigError> {
        Ok(Self {
            deny: compile(&deny.wwid)?,
            allow: compile(&allow.wwid)?,
        })
    }

    /// An exception match always wins over a blacklist match.
    pub fn is_blacklisted(&self, wwid: &str) -> bool {
        if self.allow.iter().any(|re| re.is_match(wwid)) {
            return false;
        }
        let denied = self.deny.iter().any(|re| re.is_match(wwid));
        if denied {
            debug!("{}: wwid blacklisted", wwid);
        }
        denied
    }
}
