// SPDX-License-Identifier: GPL-3.0-only

//! Map setup: selectors, grouping, best group, target parameters.

use std::fmt::Write;

use multipath_types::{MultipathDevice, Path, PathState, RrWeight};
use tracing::{debug, error};

use crate::context::ConfigContext;
use crate::error::SetupError;
use crate::{pgpolicy, propsel};

/// Prepare a coalesced candidate for the differ and the applier.
pub fn setup_map(
    ctx: &ConfigContext,
    mpp: &mut MultipathDevice,
    table: &[Path],
) -> Result<(), SetupError> {
    if mpp.size == 0 {
        debug!("{}: devmap size is unknown", mpp.alias);
        return Err(SetupError::UnknownSize {
            alias: mpp.alias.clone(),
        });
    }

    propsel::select_all(ctx, mpp);

    mpp.groups.clear();
    pgpolicy::group_paths(mpp, table);

    mpp.nr_active = mpp.path_count(table, PathState::Up);
    mpp.best_group = select_path_group(mpp, table);

    mpp.params = assemble_map(mpp, table).inspect_err(|e| error!("{}", e))?;
    Ok(())
}

/// 1-based index of the group with the highest priority; the first group
/// when none scores above zero.
pub fn select_path_group(mpp: &mut MultipathDevice, table: &[Path]) -> usize {
    let mut highest = 0;
    let mut best = 1;

    for (index, group) in mpp.groups.iter_mut().enumerate() {
        if group.paths.is_empty() {
            continue;
        }
        let priority = group.refresh_priority(table);
        if priority > highest {
            highest = priority;
            best = index + 1;
        }
    }
    best
}

/// Serialize groups into multipath target parameters:
/// `<features> <hwhandler> <nr_groups> <best> (<selector> <nr_paths> 1 (<dev_t> <minio>)*)*`
pub fn assemble_map(mpp: &MultipathDevice, table: &[Path]) -> Result<String, SetupError> {
    let fail = |reason: &str| SetupError::Assembly {
        alias: mpp.alias.clone(),
        reason: reason.to_string(),
    };

    if mpp.groups.is_empty() {
        return Err(fail("no path groups"));
    }

    let mut params = format!(
        "{} {} {} {}",
        mpp.features,
        mpp.hwhandler,
        mpp.groups.len(),
        mpp.best_group
    );
    for group in &mpp.groups {
        let _ = write!(params, " {} {} 1", mpp.selector, group.paths.len());
        for &index in &group.paths {
            let path = table.get(index).ok_or_else(|| fail("path index out of range"))?;
            if path.dev_t.is_empty() {
                return Err(fail("path without dev_t"));
            }
            let minio = match mpp.rr_weight {
                RrWeight::Priorities if path.priority > 0 => {
                    mpp.minio.saturating_mul(path.priority.unsigned_abs())
                }
                _ => mpp.minio,
            };
            let _ = write!(params, " {} {}", path.dev_t, minio);
        }
    }
    Ok(params)
}
