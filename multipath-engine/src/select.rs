// SPDX-License-Identifier: GPL-3.0-only

//! Topology differ and action selection.

use multipath_contracts::DeviceMapper;
use multipath_types::{
    Action, DEFAULT_TARGET, MultipathDevice, Path, PathState, find_by_alias, find_by_wwid,
};
use tracing::{debug, error, info};

use crate::context::ConfigContext;

/// True when `active` does not start with `candidate`.
///
/// Only the candidate's length is compared, so an active string that merely
/// extends the candidate (`"1 queue_if_no_path"` against `"1"`) counts as
/// unchanged. Features, hardware handler and selector are all compared
/// this way.
pub fn prefix_differs(active: &str, candidate: &str) -> bool {
    !active.starts_with(candidate)
}

/// Compare group membership in order. Returns how many active groups were
/// tried for the first candidate group that has no identical active group,
/// or zero when every candidate group has a match.
pub fn compare_groups(
    candidate: &MultipathDevice,
    active: &MultipathDevice,
    table: &[Path],
) -> usize {
    for group in &candidate.groups {
        let id = group.id(table);
        if !active.groups.iter().any(|other| other.id(table) == id) {
            return active.groups.len().max(1);
        }
    }
    0
}

/// Decide what the kernel needs for `mpp` and store it in `mpp.action`.
///
/// `current` is the freshly queried list of active maps. Stale maps that
/// share the alias but not the wwid are flushed and dropped from it.
pub fn select_action(
    ctx: &ConfigContext,
    dm: &dyn DeviceMapper,
    mpp: &mut MultipathDevice,
    current: &mut Vec<MultipathDevice>,
    table: &[Path],
) -> Action {
    mpp.action = decide(ctx, dm, mpp, current, table);
    mpp.action
}

fn decide(
    ctx: &ConfigContext,
    dm: &dyn DeviceMapper,
    mpp: &MultipathDevice,
    current: &mut Vec<MultipathDevice>,
    table: &[Path],
) -> Action {
    let dry_run = ctx.options().dry_run;

    let Some(index) = find_by_alias(current, &mpp.alias) else {
        if let Some(dup) = find_by_wwid(current, &mpp.wwid)
            && !dry_run
        {
            let dup_alias = current[dup].alias.clone();
            info!("remove: {} (dup of {})", dup_alias, mpp.alias);
            if let Err(e) = dm.flush_map(&dup_alias, Some(DEFAULT_TARGET)) {
                error!("{}: flush failed: {}", dup_alias, e);
            }
        }
        debug!("set ACT_CREATE: map does not exist");
        return Action::Create;
    };

    if find_by_wwid(current, &mpp.wwid).is_none() {
        info!("remove: {} (wwid changed)", current[index].alias);
        if !dry_run && let Err(e) = dm.flush_map(&mpp.alias, None) {
            error!("{}: flush failed: {}", mpp.alias, e);
        }
        current.remove(index);
        debug!("set ACT_CREATE: map wwid change");
        return Action::Create;
    }

    if mpp.path_count(table, PathState::Up) == 0 {
        debug!("set ACT_NOTHING: no usable path");
        return Action::Nothing;
    }

    let cmpp = &current[index];
    if cmpp.size != mpp.size {
        debug!("set ACT_RELOAD: size change");
        return Action::Reload;
    }
    // queueing features are left to the daemon when no_path_retry is set
    if !mpp.no_path_retry.is_set() && prefix_differs(&cmpp.features, &mpp.features) {
        debug!("set ACT_RELOAD: features change");
        return Action::Reload;
    }
    if prefix_differs(&cmpp.hwhandler, &mpp.hwhandler) {
        debug!("set ACT_RELOAD: hwhandler change");
        return Action::Reload;
    }
    if prefix_differs(&cmpp.selector, &mpp.selector) {
        debug!("set ACT_RELOAD: selector change");
        return Action::Reload;
    }
    if cmpp.minio != mpp.minio {
        debug!("set ACT_RELOAD: minio change ({}->{})", cmpp.minio, mpp.minio);
        return Action::Reload;
    }
    if cmpp.groups.len() != mpp.groups.len() {
        debug!("set ACT_RELOAD: number of path group change");
        return Action::Reload;
    }
    if compare_groups(mpp, cmpp, table) != 0 {
        debug!("set ACT_RELOAD: path group topology change");
        return Action::Reload;
    }
    if cmpp.next_group != mpp.best_group {
        debug!("set ACT_SWITCHPG: next path group change");
        return Action::SwitchGroup;
    }

    debug!("set ACT_NOTHING: map unchanged");
    Action::Nothing
}
