// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use multipath_types::DEFAULT_BINDINGS_FILE;
use tracing::{debug, error};

use super::store::{BindingStore, LockRetry};
use crate::error::Result;

/// Stable aliases for wwids, backed by the bindings file.
///
/// Each call opens, locks, scans and closes the file. Failures are logged
/// and reported as `None`; callers fall back to the raw wwid.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    path: PathBuf,
    retry: LockRetry,
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BINDINGS_FILE)
    }
}

impl AliasResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: LockRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: LockRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Alias bound to `wwid`, allocating a new one when none exists.
    pub fn resolve_alias(&self, wwid: &str) -> Option<String> {
        if wwid.is_empty() {
            debug!("Cannot find binding for empty WWID");
            return None;
        }
        self.try_resolve_alias(wwid)
            .inspect_err(|e| error!("Cannot resolve alias for [{}]: {}", wwid, e))
            .ok()
    }

    /// Wwid bound to `alias`, if any.
    pub fn resolve_wwid(&self, alias: &str) -> Option<String> {
        if alias.is_empty() {
            debug!("Cannot find binding for empty alias");
            return None;
        }
        self.try_resolve_wwid(alias)
            .inspect_err(|e| error!("Cannot resolve wwid for [{}]: {}", alias, e))
            .ok()
            .flatten()
    }

    pub fn try_resolve_alias(&self, wwid: &str) -> Result<String> {
        let mut store = self.open()?;
        let lookup = store.find_by_wwid(wwid)?;
        match lookup.found {
            Some(alias) => Ok(alias),
            None => store.allocate(wwid, lookup.next_id),
        }
    }

    pub fn try_resolve_wwid(&self, alias: &str) -> Result<Option<String>> {
        Ok(self.open()?.find_by_alias(alias)?.found)
    }

    pub fn open(&self) -> Result<BindingStore> {
        BindingStore::open_with(&self.path, self.retry)
    }
}
