// SPDX-License-Identifier: GPL-3.0-only

//! Map applier: carries a decided action out against device-mapper.

use multipath_contracts::{DeviceMapper, MapOp, PathLocker};
use multipath_types::{
    Action, DEFAULT_TARGET, DmPathState, MultipathDevice, Path, PathGroupStatus, PathState,
};
use tracing::{debug, error, info};

use crate::context::ConfigContext;
use crate::error::CoalesceError;
use crate::print::format_map;

/// Result of applying one device's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing touched; the map was printed instead.
    DryRun,
    /// Create or reload was attempted and failed.
    Failed,
    /// Create or reload succeeded.
    Applied,
    /// The map already exists in the wanted shape (or only switched group).
    AlreadyExisting,
}

impl ApplyOutcome {
    /// Whether the map is live in the kernel after this step.
    pub fn map_is_live(&self) -> bool {
        matches!(self, Self::Applied | Self::AlreadyExisting)
    }
}

/// Advisory locks on every member path, released on drop.
struct PathLockSet<'a> {
    locker: &'a dyn PathLocker,
    table: &'a [Path],
    locked: Vec<usize>,
}

impl<'a> PathLockSet<'a> {
    fn acquire(
        locker: &'a dyn PathLocker,
        mpp: &MultipathDevice,
        table: &'a [Path],
    ) -> Result<Self, CoalesceError> {
        let mut set = Self {
            locker,
            table,
            locked: Vec::new(),
        };
        for index in mpp.grouped_paths() {
            let Some(path) = table.get(index) else {
                continue;
            };
            match locker.try_lock(path) {
                Ok(()) => set.locked.push(index),
                Err(e) if e.is_busy() => {
                    debug!("{}: in use ({})", mpp.alias, e);
                    return Err(CoalesceError::DeviceBusy {
                        alias: mpp.alias.clone(),
                    });
                }
                Err(e) => debug!("{}: cannot lock {}: {}", mpp.alias, path.dev, e),
            }
        }
        Ok(set)
    }
}

impl Drop for PathLockSet<'_> {
    fn drop(&mut self) {
        for &index in &self.locked {
            self.locker.unlock(&self.table[index]);
        }
    }
}

/// Apply `mpp.action`.
///
/// Returns [`CoalesceError::DeviceBusy`] when a member path is locked by
/// another process; the caller should retry on a later pass.
pub fn domap(
    ctx: &ConfigContext,
    dm: &dyn DeviceMapper,
    locker: &dyn PathLocker,
    mpp: &MultipathDevice,
    table: &[Path],
) -> Result<ApplyOutcome, CoalesceError> {
    // last chance to quit before touching the devmaps
    if ctx.options().dry_run {
        print!("{}", format_map(mpp, table));
        return Ok(ApplyOutcome::DryRun);
    }

    let applied = match mpp.action {
        Action::Undefined | Action::Nothing => return Ok(ApplyOutcome::AlreadyExisting),
        Action::SwitchGroup => {
            if let Err(e) = dm.switch_group(&mpp.alias, mpp.best_group) {
                error!("{}: switch group failed: {}", mpp.alias, e);
            }
            // paths skipped earlier because of their group may be eligible now
            reinstate_paths(dm, mpp, table);
            return Ok(ApplyOutcome::AlreadyExisting);
        }
        Action::Create => create_map(dm, locker, mpp, table)?,
        Action::Reload => dm
            .add_map(
                MapOp::Reload,
                &mpp.alias,
                DEFAULT_TARGET,
                &mpp.params,
                mpp.size,
                None,
            )
            .and_then(|()| dm.resume(&mpp.alias))
            .inspect_err(|e| error!("{}: reload failed: {}", mpp.alias, e))
            .is_ok(),
    };

    if !applied {
        return Ok(ApplyOutcome::Failed);
    }

    if let Err(e) = dm.switch_group(&mpp.alias, mpp.best_group) {
        error!("{}: switch group failed: {}", mpp.alias, e);
    }
    info!("{}: {}\n{}", mpp.alias, mpp.action, format_map(mpp, table));
    Ok(ApplyOutcome::Applied)
}

fn create_map(
    dm: &dyn DeviceMapper,
    locker: &dyn PathLocker,
    mpp: &MultipathDevice,
    table: &[Path],
) -> Result<bool, CoalesceError> {
    let locks = PathLockSet::acquire(locker, mpp, table)?;
    dm.suppress_log();

    let created = if dm.map_present(&mpp.alias) {
        debug!("{}: map already present", mpp.alias);
        false
    } else {
        match dm.add_map(
            MapOp::Create,
            &mpp.alias,
            DEFAULT_TARGET,
            &mpp.params,
            mpp.size,
            Some(&mpp.wwid),
        ) {
            Ok(()) => true,
            Err(e) => {
                // create is device creation plus table load; a failed load
                // leaves an empty map behind
                if dm.map_present(&mpp.alias) {
                    debug!(
                        "{}: failed to load map (a path might be in use): {}",
                        mpp.alias, e
                    );
                    if let Err(e) = dm.flush_map(&mpp.alias, None) {
                        error!("{}: cannot remove empty map: {}", mpp.alias, e);
                    }
                } else {
                    error!("{}: create failed: {}", mpp.alias, e);
                }
                false
            }
        }
    };

    drop(locks);
    dm.restore_log();
    Ok(created)
}

/// Reinstate failed paths, except non-up paths in active or disabled groups.
pub fn reinstate_paths(dm: &dyn DeviceMapper, mpp: &MultipathDevice, table: &[Path]) {
    for group in &mpp.groups {
        let held_back = matches!(
            group.status,
            PathGroupStatus::Disabled | PathGroupStatus::Active
        );
        for path in group.paths.iter().filter_map(|&index| table.get(index)) {
            if path.state != PathState::Up && held_back {
                continue;
            }
            if path.dm_state == DmPathState::Failed
                && let Err(e) = dm.reinstate_path(&mpp.alias, &path.dev_t)
            {
                error!("error reinstating {}: {}", path.dev, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use multipath_contracts::testing::{DmCall, RecordingDeviceMapper, RecordingPathLocker};
    use multipath_types::{Config, PathGroup};

    use super::*;
    use crate::context::RunOptions;

    fn ctx() -> ConfigContext {
        ConfigContext::new(Config::default(), RunOptions::default()).unwrap()
    }

    fn table() -> Vec<Path> {
        let mut table = vec![Path::new("sdb", "8:16", "w"), Path::new("sdc", "8:32", "w")];
        for path in &mut table {
            path.state = PathState::Up;
        }
        table
    }

    fn device(action: Action) -> MultipathDevice {
        let mut mpp = MultipathDevice::new("w");
        mpp.alias = "mpath0".to_string();
        mpp.size = 2048;
        mpp.params = "0 0 1 1 round-robin 0 2 1 8:16 1000 8:32 1000".to_string();
        mpp.groups = vec![PathGroup::new(vec![0, 1])];
        mpp.best_group = 1;
        mpp.action = action;
        mpp
    }

    #[test]
    fn create_locks_loads_and_switches() {
        let dm = RecordingDeviceMapper::default();
        let locker = RecordingPathLocker::default();
        let table = table();

        let outcome = domap(&ctx(), &dm, &locker, &device(Action::Create), &table).unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            dm.calls(),
            vec![
                DmCall::SuppressLog,
                DmCall::AddMap {
                    op: MapOp::Create,
                    name: "mpath0".to_string(),
                    params: "0 0 1 1 round-robin 0 2 1 8:16 1000 8:32 1000".to_string(),
                    size: 2048,
                    uuid: Some("w".to_string()),
                },
                DmCall::RestoreLog,
                DmCall::SwitchGroup("mpath0".to_string(), 1),
            ]
        );
        assert_eq!(*locker.released.borrow(), vec!["sdb", "sdc"]);
        assert!(locker.held.borrow().is_empty());
    }

    #[test]
    fn busy_path_signals_retry_and_releases_locks() {
        let dm = RecordingDeviceMapper::default();
        let locker = RecordingPathLocker::with_busy(["sdc"]);

        let result = domap(&ctx(), &dm, &locker, &device(Action::Create), &table());

        assert_eq!(
            result,
            Err(CoalesceError::DeviceBusy {
                alias: "mpath0".to_string()
            })
        );
        assert!(dm.calls().is_empty());
        assert_eq!(*locker.released.borrow(), vec!["sdb"]);
    }

    #[test]
    fn failed_load_removes_empty_map() {
        let dm = RecordingDeviceMapper::default();
        dm.fail_add.set(true);
        let locker = RecordingPathLocker::default();

        let outcome = domap(&ctx(), &dm, &locker, &device(Action::Create), &table()).unwrap();

        assert_eq!(outcome, ApplyOutcome::Failed);
        assert_eq!(dm.flushed(), vec!["mpath0".to_string()]);
        assert!(!dm.map_present("mpath0"));
        assert_eq!(dm.calls().last(), Some(&DmCall::RestoreLog));
    }

    #[test]
    fn existing_map_is_not_recreated() {
        let dm = RecordingDeviceMapper::with_maps(["mpath0"]);
        let locker = RecordingPathLocker::default();

        let outcome = domap(&ctx(), &dm, &locker, &device(Action::Create), &table()).unwrap();

        assert_eq!(outcome, ApplyOutcome::Failed);
        assert_eq!(dm.calls(), vec![DmCall::SuppressLog, DmCall::RestoreLog]);
        assert!(locker.held.borrow().is_empty());
    }

    #[test]
    fn reload_needs_both_halves() {
        let dm = RecordingDeviceMapper::with_maps(["mpath0"]);
        let locker = RecordingPathLocker::default();
        let outcome = domap(&ctx(), &dm, &locker, &device(Action::Reload), &table()).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert!(dm.calls().contains(&DmCall::Resume("mpath0".to_string())));

        let dm = RecordingDeviceMapper::with_maps(["mpath0"]);
        dm.fail_resume.set(true);
        let outcome = domap(&ctx(), &dm, &locker, &device(Action::Reload), &table()).unwrap();
        assert_eq!(outcome, ApplyOutcome::Failed);
        assert!(
            !dm.calls()
                .iter()
                .any(|call| matches!(call, DmCall::SwitchGroup(..)))
        );
    }

    #[test]
    fn nothing_is_already_existing() {
        let dm = RecordingDeviceMapper::default();
        let locker = RecordingPathLocker::default();

        let outcome = domap(&ctx(), &dm, &locker, &device(Action::Nothing), &table()).unwrap();

        assert_eq!(outcome, ApplyOutcome::AlreadyExisting);
        assert!(dm.calls().is_empty());
    }

    #[test]
    fn switch_group_reinstates_eligible_paths() {
        let mut table = table();
        table[0].dm_state = DmPathState::Failed;
        table[1].dm_state = DmPathState::Failed;
        table[1].state = PathState::Down;
        let mut mpp = device(Action::SwitchGroup);
        mpp.groups = vec![PathGroup::new(vec![0]), PathGroup::new(vec![1])];
        mpp.groups[1].status = PathGroupStatus::Active;
        mpp.best_group = 2;
        let dm = RecordingDeviceMapper::default();
        let locker = RecordingPathLocker::default();

        let outcome = domap(&ctx(), &dm, &locker, &mpp, &table).unwrap();

        assert_eq!(outcome, ApplyOutcome::AlreadyExisting);
        assert_eq!(
            dm.calls(),
            vec![
                DmCall::SwitchGroup("mpath0".to_string(), 2),
                DmCall::Reinstate("mpath0".to_string(), "8:16".to_string()),
            ]
        );
    }

    #[test]
    fn dry_run_touches_nothing() {
        let ctx = ConfigContext::new(
            Config::default(),
            RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        )
        .unwrap();
        let dm = RecordingDeviceMapper::default();
        let locker = RecordingPathLocker::default();

        let outcome = domap(&ctx, &dm, &locker, &device(Action::Create), &table()).unwrap();

        assert_eq!(outcome, ApplyOutcome::DryRun);
        assert!(dm.calls().is_empty());
    }
}
