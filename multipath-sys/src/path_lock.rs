// SPDX-License-Identifier: GPL-3.0-only

//! Advisory locks on path device nodes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::PathBuf;

use multipath_contracts::{DmError, PathLocker};
use multipath_types::Path;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

/// Takes `flock(LOCK_EX | LOCK_NB)` on `/dev/<dev>` for each path.
///
/// Locks are released when [`PathLocker::unlock`] drops the held handle.
pub struct FlockPathLocker {
    dev_root: PathBuf,
    held: RefCell<HashMap<String, Flock<File>>>,
}

impl Default for FlockPathLocker {
    fn default() -> Self {
        Self::with_dev_root("/dev")
    }
}

impl fmt::Debug for FlockPathLocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlockPathLocker")
            .field("dev_root", &self.dev_root)
            .field("held", &self.held.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FlockPathLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look device nodes up under `dev_root` instead of `/dev`.
    pub fn with_dev_root(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            held: RefCell::default(),
        }
    }

    pub fn held_count(&self) -> usize {
        self.held.borrow().len()
    }
}

impl PathLocker for FlockPathLocker {
    fn try_lock(&self, path: &Path) -> Result<(), DmError> {
        // vanished from sysfs, no node to lock
        if !path.is_present() {
            return Ok(());
        }
        let node = self.dev_root.join(&path.dev);
        // Only contention counts; a node we cannot open or lock is not in use.
        let file = match File::open(&node) {
            Ok(file) => file,
            Err(e) => {
                debug!("{}: cannot open for locking: {}", node.display(), e);
                return Ok(());
            }
        };

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                self.held.borrow_mut().insert(path.dev.clone(), lock);
                Ok(())
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                Err(DmError::busy(format!("{} is locked", path.dev)))
            }
            Err((_, errno)) => {
                debug!("{}: flock failed: {}", node.display(), errno);
                Ok(())
            }
        }
    }

    fn unlock(&self, path: &Path) {
        self.held.borrow_mut().remove(&path.dev);
    }
}
