// SPDX-License-Identifier: GPL-3.0-only

use multipath_contracts::testing::{DmCall, RecordingDeviceMapper, RecordingPathLocker};
use multipath_contracts::{DeviceMapper, MapOp};
use multipath_engine::{ApplyOutcome, CoalesceError, Coalescer, ConfigContext, RunOptions};
use multipath_sys::AliasResolver;
use multipath_types::{Action, Config, DeviceHandle, MultipathDevice, Path, PathGroup, PathState};

const WWID_A: &str = "36001405aaaa";
const WWID_B: &str = "36001405bbbb";

fn path(dev: &str, dev_t: &str, wwid: &str) -> Path {
    let mut path = Path::new(dev, dev_t, wwid);
    path.size = 2048;
    path.state = PathState::Up;
    path
}

fn ctx(toml: &str) -> ConfigContext {
    ConfigContext::new(Config::from_toml_str(toml).unwrap(), RunOptions::default()).unwrap()
}

fn active_map(alias: &str, wwid: &str, groups: Vec<Vec<usize>>) -> MultipathDevice {
    let mut mpp = MultipathDevice::new(wwid);
    mpp.alias = alias.to_string();
    mpp.size = 2048;
    mpp.features = "0".to_string();
    mpp.hwhandler = "0".to_string();
    mpp.selector = "round-robin 0".to_string();
    mpp.minio = 1000;
    mpp.groups = groups.into_iter().map(PathGroup::new).collect();
    mpp
}

#[test]
fn same_wwid_paths_become_one_device() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut table = vec![
        path("sdb", "8:16", WWID_A),
        path("sdc", "8:32", WWID_B),
        path("sdd", "8:48", WWID_A),
    ];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    assert_eq!(report.devices.len(), 2);
    let first = &report.devices[0];
    assert_eq!(first.device.wwid, WWID_A);
    assert_eq!(first.device.paths, vec![0, 2]);
    assert_eq!(first.device.action, Action::Create);
    assert_eq!(first.outcome, Some(ApplyOutcome::Applied));
    assert_eq!(table[0].owner, Some(DeviceHandle(0)));
    assert_eq!(table[2].owner, Some(DeviceHandle(0)));
    assert_eq!(table[1].owner, Some(DeviceHandle(1)));
    assert_eq!(
        report.device(DeviceHandle(1)).map(|d| d.wwid.as_str()),
        Some(WWID_B)
    );

    let creates: Vec<String> = dm
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DmCall::AddMap {
                op: MapOp::Create,
                name,
                ..
            } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(creates, vec![WWID_A.to_string(), WWID_B.to_string()]);
}

#[test]
fn unusable_paths_are_skipped() {
    let ctx = ctx("[blacklist]\nwwid = [\"^36001405bb\"]\n");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut vanished = path("sde", "8:64", WWID_A);
    vanished.size = 0;
    let mut table = vec![
        path("sdb", "8:16", ""),
        path("sdc", "8:32", WWID_B),
        vanished,
    ];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    assert!(report.devices.is_empty());
    assert!(table.iter().all(|p| p.owner.is_none()));
    assert!(dm.calls().is_empty());
}

#[test]
fn size_mismatch_leaves_kernel_alone() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut bigger = path("sdc", "8:32", WWID_A);
    bigger.size = 4096;
    let mut table = vec![path("sdb", "8:16", WWID_A), bigger];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    let entry = &report.devices[0];
    assert_eq!(entry.device.paths, vec![0, 1]);
    assert_eq!(entry.device.action, Action::Nothing);
    assert_eq!(entry.outcome, Some(ApplyOutcome::AlreadyExisting));
    assert!(dm.calls().is_empty());
}

#[test]
fn negative_priority_leaves_kernel_alone() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut broken = path("sdc", "8:32", WWID_A);
    broken.priority = -1;
    let mut table = vec![path("sdb", "8:16", WWID_A), broken];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    assert_eq!(report.devices[0].device.action, Action::Nothing);
    assert!(dm.calls().is_empty());
}

#[test]
fn unchanged_map_is_left_and_not_swept() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::with_maps([WWID_A]);
    let locker = RecordingPathLocker::default();
    let mut table = vec![path("sdb", "8:16", WWID_A), path("sdc", "8:32", WWID_A)];
    let mut current = vec![active_map(WWID_A, WWID_A, vec![vec![0], vec![1]])];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut current, &mut table);

    assert_eq!(report.devices[0].device.action, Action::Nothing);
    assert_eq!(
        report.devices[0].outcome,
        Some(ApplyOutcome::AlreadyExisting)
    );
    assert!(current.is_empty());
    assert!(dm.calls().is_empty());
}

#[test]
fn resized_map_is_reloaded() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::with_maps([WWID_A]);
    let locker = RecordingPathLocker::default();
    let mut table = vec![path("sdb", "8:16", WWID_A)];
    let mut stale = active_map(WWID_A, WWID_A, vec![vec![0]]);
    stale.size = 1024;
    let mut current = vec![stale];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut current, &mut table);

    assert_eq!(report.devices[0].device.action, Action::Reload);
    assert_eq!(report.devices[0].outcome, Some(ApplyOutcome::Applied));
    assert!(dm.calls().contains(&DmCall::Resume(WWID_A.to_string())));
}

#[test]
fn dead_maps_are_flushed_and_failed_maps_kept() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::with_maps(["gone", "failing"]);
    let locker = RecordingPathLocker::default();
    let mut failed = path("sdf", "8:80", WWID_B);
    failed.state = PathState::Down;
    failed.size = 0;
    let mut table = vec![
        Path::new("", "8:64", "36001405gone"),
        Path::new("", "8:65", "36001405gone"),
        failed,
    ];
    let mut current = vec![
        active_map("gone", "36001405gone", vec![vec![0, 1]]),
        active_map("failing", WWID_B, vec![vec![2]]),
    ];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut current, &mut table);

    assert_eq!(report.flushed, vec!["gone".to_string()]);
    assert!(dm.map_present("failing"));
    assert!(!dm.map_present("gone"));
}

#[test]
fn busy_path_aborts_pass_but_keeps_claims() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::with_busy(["sdb"]);
    let mut table = vec![path("sdb", "8:16", WWID_A), path("sdc", "8:32", WWID_B)];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    assert_eq!(
        report.aborted,
        Some(CoalesceError::DeviceBusy {
            alias: WWID_A.to_string()
        })
    );
    assert_eq!(report.devices.len(), 1);
    assert_eq!(report.devices[0].outcome, None);
    assert_eq!(table[0].owner, Some(DeviceHandle(0)));
    assert_eq!(table[1].owner, None);
    assert!(dm.calls().is_empty());
}

#[test]
fn busy_device_keeps_report_of_maps_already_created() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::with_maps(["gone"]);
    let locker = RecordingPathLocker::with_busy(["sdc"]);
    let mut table = vec![
        path("sdb", "8:16", WWID_A),
        path("sdc", "8:32", WWID_B),
        Path::new("", "8:64", "36001405gone"),
    ];
    let mut current = vec![active_map("gone", "36001405gone", vec![vec![2]])];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut current, &mut table);

    assert!(!report.is_complete());
    assert_eq!(report.devices.len(), 2);
    assert_eq!(report.devices[0].device.wwid, WWID_A);
    assert_eq!(report.devices[0].outcome, Some(ApplyOutcome::Applied));
    assert_eq!(report.devices[1].device.wwid, WWID_B);
    assert_eq!(report.devices[1].outcome, None);
    assert!(dm.map_present(WWID_A));
    assert!(!dm.map_present(WWID_B));
    // the sweep does not run after an abort
    assert!(report.flushed.is_empty());
    assert!(dm.map_present("gone"));
}

#[test]
fn no_path_retry_sets_queueing_on_live_maps() {
    let ctx = ctx("[defaults]\nno_path_retry = \"fail\"\n");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut table = vec![path("sdb", "8:16", WWID_A)];

    Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    assert_eq!(
        dm.calls().last(),
        Some(&DmCall::QueueIfNoPath(WWID_A.to_string(), false))
    );
}

#[test]
fn friendly_names_come_from_bindings_file() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx("[defaults]\nuser_friendly_names = true\n")
        .with_alias_resolver(AliasResolver::new(dir.path().join("bindings")));
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut table = vec![path("sdb", "8:16", WWID_A), path("sdc", "8:32", WWID_B)];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    let aliases: Vec<&str> = report
        .devices
        .iter()
        .map(|entry| entry.device.alias.as_str())
        .collect();
    assert_eq!(aliases, vec!["mpath0", "mpath1"]);
}

#[test]
fn setup_failure_drops_only_that_device() {
    let ctx = ctx("");
    let dm = RecordingDeviceMapper::default();
    let locker = RecordingPathLocker::default();
    let mut table = vec![path("sdb", "", WWID_A), path("sdc", "8:32", WWID_B)];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut Vec::new(), &mut table);

    assert_eq!(report.devices[0].outcome, None);
    assert_eq!(report.devices[1].outcome, Some(ApplyOutcome::Applied));
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
    let dm = RecordingDeviceMapper::with_maps(["gone"]);
    let locker = RecordingPathLocker::default();
    let mut table = vec![path("sdb", "8:16", WWID_A), Path::new("", "8:64", "36001405gone")];
    let mut current = vec![active_map("gone", "36001405gone", vec![vec![1]])];

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut current, &mut table);

    assert_eq!(report.devices[0].outcome, Some(ApplyOutcome::DryRun));
    assert!(report.flushed.is_empty());
    assert!(dm.calls().is_empty());
}
