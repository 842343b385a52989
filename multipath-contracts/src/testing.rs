// SPDX-License-Identifier: GPL-3.0-only

//! In-memory fakes that record every call.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use multipath_types::Path;

use crate::{DeviceMapper, DmError, DmErrorKind, MapOp, PathLocker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmCall {
    AddMap {
        op: MapOp,
        name: String,
        params: String,
        size: u64,
        uuid: Option<String>,
    },
    Resume(String),
    SwitchGroup(String, usize),
    Flush(String, Option<String>),
    SuppressLog,
    RestoreLog,
    Reinstate(String, String),
    QueueIfNoPath(String, bool),
}

/// Device mapper that keeps a set of present map names.
#[derive(Debug, Default)]
pub struct RecordingDeviceMapper {
    pub calls: RefCell<Vec<DmCall>>,
    pub present: RefCell<BTreeSet<String>>,
    /// Fail table loads; a create still leaves an empty map behind.
    pub fail_add: Cell<bool>,
    pub fail_resume: Cell<bool>,
}

impl RecordingDeviceMapper {
    pub fn with_maps<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let dm = Self::default();
        dm.present
            .borrow_mut()
            .extend(names.into_iter().map(str::to_string));
        dm
    }

    pub fn calls(&self) -> Vec<DmCall> {
        self.calls.borrow().clone()
    }

    pub fn flushed(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                DmCall::Flush(name, _) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DmCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl DeviceMapper for RecordingDeviceMapper {
    fn map_present(&self, name: &str) -> bool {
        self.present.borrow().contains(name)
    }

    fn add_map(
        &self,
        op: MapOp,
        name: &str,
        _target: &str,
        params: &str,
        size: u64,
        uuid: Option<&str>,
    ) -> Result<(), DmError> {
        self.record(DmCall::AddMap {
            op,
            name: name.to_string(),
            params: params.to_string(),
            size,
            uuid: uuid.map(str::to_string),
        });
        if op == MapOp::Create {
            self.present.borrow_mut().insert(name.to_string());
        }
        if self.fail_add.get() {
            return Err(DmError::new(
                DmErrorKind::CommandFailed,
                "table load failed",
            ));
        }
        Ok(())
    }

    fn resume(&self, name: &str) -> Result<(), DmError> {
        self.record(DmCall::Resume(name.to_string()));
        if self.fail_resume.get() {
            return Err(DmError::new(DmErrorKind::CommandFailed, "resume failed"));
        }
        Ok(())
    }

    fn switch_group(&self, name: &str, group: usize) -> Result<(), DmError> {
        self.record(DmCall::SwitchGroup(name.to_string(), group));
        Ok(())
    }

    fn flush_map(&self, name: &str, target: Option<&str>) -> Result<(), DmError> {
        self.record(DmCall::Flush(name.to_string(), target.map(str::to_string)));
        if self.present.borrow_mut().remove(name) {
            Ok(())
        } else {
            Err(DmError::new(DmErrorKind::NotFound, name))
        }
    }

    fn suppress_log(&self) {
        self.record(DmCall::SuppressLog);
    }

    fn restore_log(&self) {
        self.record(DmCall::RestoreLog);
    }

    fn reinstate_path(&self, name: &str, dev_t: &str) -> Result<(), DmError> {
        self.record(DmCall::Reinstate(name.to_string(), dev_t.to_string()));
        Ok(())
    }

    fn queue_if_no_path(&self, name: &str, enable: bool) -> Result<(), DmError> {
        self.record(DmCall::QueueIfNoPath(name.to_string(), enable));
        Ok(())
    }
}

/// Path locker where some device names are already held elsewhere.
#[derive(Debug, Default)]
pub struct RecordingPathLocker {
    pub busy: RefCell<BTreeSet<String>>,
    pub held: RefCell<BTreeSet<String>>,
    pub released: RefCell<Vec<String>>,
}

impl RecordingPathLocker {
    pub fn with_busy<'a>(devs: impl IntoIterator<Item = &'a str>) -> Self {
        let locker = Self::default();
        locker
            .busy
            .borrow_mut()
            .extend(devs.into_iter().map(str::to_string));
        locker
    }
}

impl PathLocker for RecordingPathLocker {
    fn try_lock(&self, path: &Path) -> Result<(), DmError> {
        if self.busy.borrow().contains(&path.dev) {
            return Err(DmError::busy(format!("{} is locked", path.dev)));
        }
        self.held.borrow_mut().insert(path.dev.clone());
        Ok(())
    }

    fn unlock(&self, path: &Path) {
        if self.held.borrow_mut().remove(&path.dev) {
            self.released.borrow_mut().push(path.dev.clone());
        }
    }
}
