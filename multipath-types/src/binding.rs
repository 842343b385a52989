// SPDX-License-Identifier: GPL-3.0-only

//! Alias binding records and their on-disk line format.
//!
//! The bindings file holds one record per line:
//!
//! ```text
//! <alias> <wwid> [ignored...] [# comment]
//! ```
//!
//! Anything from `#` to the end of the line is a comment. Lines with fewer
//! than two whitespace-separated tokens are malformed and skipped.

use serde::{Deserialize, Serialize};

/// Default location of the bindings file.
pub const DEFAULT_BINDINGS_FILE: &str = "/var/lib/multipath/bindings";

/// Prefix of aliases minted by the binding store (`mpath0`, `mpath1`, ...).
pub const RESERVED_ALIAS_PREFIX: &str = "mpath";

/// Written once when the bindings file is created.
pub const BINDINGS_FILE_HEADER: &str = "\
# Multipath bindings, Version : 1.0
# NOTE: this file is automatically maintained by the multipath program.
# You should not need to edit this file in normal circumstances.
#
# Format:
# alias wwid
#
";

/// A persisted (alias, wwid) association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Numeric suffix when the alias follows the reserved `mpath<N>` pattern.
    pub id: Option<u64>,
    pub alias: String,
    pub wwid: String,
}

impl Binding {
    pub fn new(alias: impl Into<String>, wwid: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            id: reserved_alias_id(&alias),
            alias,
            wwid: wwid.into(),
        }
    }

    /// Alias minted for a freshly allocated id.
    pub fn reserved_alias(id: u64) -> String {
        format!("{RESERVED_ALIAS_PREFIX}{id}")
    }

    /// Record line as appended to the bindings file.
    pub fn to_line(&self) -> String {
        format!("{} {}\n", self.alias, self.wwid)
    }
}

/// Classification of one bindings-file line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLine<'a> {
    /// Empty or comment-only.
    Blank,
    /// An alias token without a wwid.
    Malformed { alias: &'a str },
    Record { alias: &'a str, wwid: &'a str },
}

impl<'a> BindingLine<'a> {
    pub fn alias(&self) -> Option<&'a str> {
        match self {
            Self::Blank => None,
            Self::Malformed { alias } | Self::Record { alias, .. } => Some(alias),
        }
    }
}

pub fn parse_binding_line(line: &str) -> BindingLine<'_> {
    let content = match line.find(['#', '\n', '\r']) {
        Some(end) => &line[..end],
        None => line,
    };
    let mut tokens = content.split([' ', '\t']).filter(|token| !token.is_empty());

    let Some(alias) = tokens.next() else {
        return BindingLine::Blank;
    };
    match tokens.next() {
        Some(wwid) => BindingLine::Record { alias, wwid },
        None => BindingLine::Malformed { alias },
    }
}

/// Numeric suffix of an alias following the reserved pattern.
///
/// Only the leading digits after the prefix count, so `mpath12a` yields 12.
/// Signed or overflowing suffixes do not take part in id allocation.
pub fn reserved_alias_id(alias: &str) -> Option<u64> {
    let rest = alias.strip_prefix(RESERVED_ALIAS_PREFIX)?;
    let rest = rest.strip_prefix('+').unwrap_or(rest);
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    rest[..digits].parse().ok()
}
