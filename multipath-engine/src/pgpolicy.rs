// SPDX-License-Identifier: GPL-3.0-only

//! Path grouping policies.

use multipath_types::{MultipathDevice, Path, PathGroup, PathGroupingPolicy};

/// Partition `mpp.paths` into path groups according to `mpp.pg_policy`.
pub fn group_paths(mpp: &mut MultipathDevice, table: &[Path]) {
    mpp.groups = match mpp.pg_policy {
        PathGroupingPolicy::Failover => one_path_per_group(&mpp.paths),
        PathGroupingPolicy::Multibus => all_in_one_group(&mpp.paths),
        PathGroupingPolicy::GroupBySerial => {
            group_by_key(&mpp.paths, |index| table[index].serial.clone())
        }
        PathGroupingPolicy::GroupByPrio => {
            let mut groups = group_by_key(&mpp.paths, |index| table[index].priority);
            groups.sort_by_key(|group| std::cmp::Reverse(table[group.paths[0]].priority));
            groups
        }
    };
}

fn one_path_per_group(paths: &[usize]) -> Vec<PathGroup> {
    paths.iter().map(|&index| PathGroup::new(vec![index])).collect()
}

fn all_in_one_group(paths: &[usize]) -> Vec<PathGroup> {
    if paths.is_empty() {
        return Vec::new();
    }
    vec![PathGroup::new(paths.to_vec())]
}

/// Groups in order of first appearance of each key.
fn group_by_key<K, F>(paths: &[usize], key: F) -> Vec<PathGroup>
where
    K: PartialEq,
    F: Fn(usize) -> K,
{
    let mut keyed: Vec<(K, PathGroup)> = Vec::new();
    for &index in paths {
        let k = key(index);
        match keyed.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, group)) => group.paths.push(index),
            None => keyed.push((k, PathGroup::new(vec![index]))),
        }
    }
    keyed.into_iter().map(|(_, group)| group).collect()
}
