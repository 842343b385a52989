// SPDX-License-Identifier: GPL-3.0-only

use std::fmt::Write;

use multipath_types::{MultipathDevice, Path};

/// Human-readable topology of one map.
///
/// ```text
/// mpath0 (36001405aa)
/// [size=2048][features=0][hwhandler=0]
/// \_ round-robin 0 [prio=50][active]
///  \_ 8:16 sdb [ready][active]
/// ```
pub fn format_map(mpp: &MultipathDevice, table: &[Path]) -> String {
    let mut out = String::new();

    if mpp.alias == mpp.wwid {
        let _ = writeln!(out, "{}", mpp.wwid);
    } else {
        let _ = writeln!(out, "{} ({})", mpp.alias, mpp.wwid);
    }
    let _ = writeln!(
        out,
        "[size={}][features={}][hwhandler={}]",
        mpp.size, mpp.features, mpp.hwhandler
    );

    for group in &mpp.groups {
        let _ = writeln!(
            out,
            "\\_ {} [prio={}][{}]",
            mpp.selector,
            group.priority,
            group.status.as_str()
        );
        for path in group.paths.iter().filter_map(|&index| table.get(index)) {
            let dev = if path.dev.is_empty() { "#" } else { &path.dev };
            let _ = writeln!(
                out,
                " \\_ {} {} [{}][{}]",
                path.dev_t,
                dev,
                path.state.as_str(),
                path.dm_state.as_str()
            );
        }
    }
    out
}
