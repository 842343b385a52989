// SPDX-License-Identifier: GPL-3.0-only

use multipath_types::Path;

use crate::DmError;

/// Table load flavour for [`DeviceMapper::add_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOp {
    /// Create the device and load its table in one go.
    Create,
    /// Load a new inactive table into an existing device.
    Reload,
}

/// Kernel device-mapper operations consumed by the map applier.
pub trait DeviceMapper {
    fn map_present(&self, name: &str) -> bool;

    /// `uuid` is only used on create, to tag the map with its wwid.
    fn add_map(
        &self,
        op: MapOp,
        name: &str,
        target: &str,
        params: &str,
        size: u64,
        uuid: Option<&str>,
    ) -> Result<(), DmError>;

    fn resume(&self, name: &str) -> Result<(), DmError>;

    /// `group` is 1-based.
    fn switch_group(&self, name: &str, group: usize) -> Result<(), DmError>;

    /// Remove a map. With `target` set, only maps of that target type go.
    fn flush_map(&self, name: &str, target: Option<&str>) -> Result<(), DmError>;

    fn suppress_log(&self);

    fn restore_log(&self);

    fn reinstate_path(&self, name: &str, dev_t: &str) -> Result<(), DmError>;

    fn queue_if_no_path(&self, name: &str, enable: bool) -> Result<(), DmError>;
}

/// Non-blocking advisory locks on path device nodes.
pub trait PathLocker {
    /// Fails with [`DmErrorKind::Busy`](crate::DmErrorKind::Busy) when
    /// another holder has the node locked.
    fn try_lock(&self, path: &Path) -> Result<(), DmError>;

    fn unlock(&self, path: &Path);
}
