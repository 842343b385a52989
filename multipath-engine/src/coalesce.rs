// SPDX-License-Identifier: GPL-3.0-only

//! Path coalescing: raw paths in, reconciled multipath maps out.

use multipath_contracts::{DeviceMapper, PathLocker};
use multipath_types::{Action, DEFAULT_TARGET, DeviceHandle, MultipathDevice, NoPathRetry, Path};
use tracing::{debug, info, warn};

use crate::apply::{ApplyOutcome, domap};
use crate::context::ConfigContext;
use crate::error::CoalesceError;
use crate::propsel::select_alias;
use crate::select::select_action;
use crate::setup::setup_map;

/// One candidate built during a pass. Its position in
/// [`CoalesceReport::devices`] is the [`DeviceHandle`] its paths point to.
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub device: MultipathDevice,
    /// `None` when setup dropped the device before any action was taken.
    pub outcome: Option<ApplyOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct CoalesceReport {
    pub devices: Vec<DeviceOutcome>,
    /// Aliases of dead maps removed by the final sweep.
    pub flushed: Vec<String>,
    /// Why the pass stopped early. Devices before the one that stopped it
    /// were already applied; the sweep did not run.
    pub aborted: Option<CoalesceError>,
}

impl CoalesceReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn device(&self, handle: DeviceHandle) -> Option<&MultipathDevice> {
        self.devices.get(handle.0).map(|entry| &entry.device)
    }
}

/// Runs coalescing passes against one set of collaborators.
pub struct Coalescer<'a> {
    ctx: &'a ConfigContext,
    dm: &'a dyn DeviceMapper,
    locker: &'a dyn PathLocker,
}

impl<'a> Coalescer<'a> {
    pub fn new(
        ctx: &'a ConfigContext,
        dm: &'a dyn DeviceMapper,
        locker: &'a dyn PathLocker,
    ) -> Self {
        Self { ctx, dm, locker }
    }

    /// Group `table` by wwid, reconcile every resulting device against
    /// `current`, then flush maps left in `current` whose paths are all gone.
    ///
    /// A [`CoalesceError::DeviceBusy`] stops the pass and lands in
    /// [`CoalesceReport::aborted`]; the busy device is the last entry and
    /// paths claimed so far keep their owner.
    pub fn coalesce_paths(
        &self,
        current: &mut Vec<MultipathDevice>,
        table: &mut [Path],
    ) -> CoalesceReport {
        let mut report = CoalesceReport::default();

        for k in 0..table.len() {
            if !self.is_seed(&table[k]) {
                continue;
            }

            let handle = DeviceHandle(report.devices.len());
            let mut mpp = self.claim_paths(table, k, handle);

            let outcome = match setup_map(self.ctx, &mut mpp, table) {
                Err(e) => {
                    debug!("{}: dropped from this pass: {}", mpp.alias, e);
                    None
                }
                Ok(()) => match self.reconcile(&mut mpp, current, table) {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        warn!("{}: pass aborted: {}", mpp.alias, e);
                        report.aborted = Some(e);
                        None
                    }
                },
            };

            current.retain(|active| active.wwid != mpp.wwid);
            report.devices.push(DeviceOutcome {
                device: mpp,
                outcome,
            });
            if report.aborted.is_some() {
                return report;
            }
        }

        report.flushed = self.flush_dead_maps(current, table);
        report
    }

    fn is_seed(&self, path: &Path) -> bool {
        if path.has_null_wwid() || self.ctx.is_blacklisted(&path.wwid) {
            return false;
        }
        // already coalesced, or vanished
        path.owner.is_none() && path.size != 0
    }

    /// Start a device from `table[seed]` and pull in every later path with
    /// the same wwid.
    fn claim_paths(
        &self,
        table: &mut [Path],
        seed: usize,
        handle: DeviceHandle,
    ) -> MultipathDevice {
        let first = &table[seed];
        let mut mpp = MultipathDevice::new(first.wwid.clone());
        mpp.entry = self.ctx.find_mpe(&first.wwid).cloned();
        mpp.hw = self.ctx.find_hwe(&first.vendor, &first.product).cloned();
        select_alias(self.ctx, &mut mpp);

        mpp.size = first.size;
        if first.priority < 0 {
            mpp.action = Action::Nothing;
        }
        mpp.paths.push(seed);
        table[seed].owner = Some(handle);

        for (index, path) in table.iter_mut().enumerate().skip(seed + 1) {
            if path.wwid != mpp.wwid || path.size == 0 {
                continue;
            }
            if path.size != mpp.size {
                // never feed inconsistent sizing to the kernel
                debug!(
                    "{}: size {}, expected {}. Discard",
                    path.dev_t, path.size, mpp.size
                );
                mpp.action = Action::Nothing;
            }
            if path.priority < 0 {
                mpp.action = Action::Nothing;
            }
            mpp.paths.push(index);
            path.owner = Some(handle);
        }
        mpp
    }

    fn reconcile(
        &self,
        mpp: &mut MultipathDevice,
        current: &mut Vec<MultipathDevice>,
        table: &[Path],
    ) -> Result<ApplyOutcome, CoalesceError> {
        if !mpp.action.is_decided() {
            select_action(self.ctx, self.dm, mpp, current, table);
        }

        let outcome = domap(self.ctx, self.dm, self.locker, mpp, table)?;

        if outcome.map_is_live() && mpp.no_path_retry.is_set() {
            let queue = mpp.no_path_retry != NoPathRetry::Fail;
            if let Err(e) = self.dm.queue_if_no_path(&mpp.alias, queue) {
                warn!("{}: cannot set queue_if_no_path: {}", mpp.alias, e);
            }
        }
        Ok(outcome)
    }

    /// Flush maps with only dead paths (gone from sysfs). Maps whose paths
    /// merely failed are kept.
    fn flush_dead_maps(&self, current: &[MultipathDevice], table: &[Path]) -> Vec<String> {
        let mut flushed = Vec::new();

        for mpp in current.iter().filter(|mpp| mpp.is_dead(table)) {
            if self.ctx.options().dry_run {
                info!("{}: dead map (dry run, kept)", mpp.alias);
                continue;
            }
            match self.dm.flush_map(&mpp.alias, Some(DEFAULT_TARGET)) {
                Ok(()) => {
                    info!("remove: {} (dead)", mpp.alias);
                    flushed.push(mpp.alias.clone());
                }
                Err(e) => warn!("remove: {} (dead) failed! {}", mpp.alias, e),
            }
        }
        flushed
    }
}
