// SPDX-License-Identifier: GPL-3.0-only

use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use multipath_sys::{AliasResolver, BindingStore, LockRetry, SysError};
use multipath_types::BINDINGS_FILE_HEADER;

fn resolver() -> (tempfile::TempDir, PathBuf, AliasResolver) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("multipath").join("bindings");
    let resolver = AliasResolver::new(&path).with_retry(LockRetry {
        attempts: 1,
        backoff: Duration::from_millis(10),
    });
    (dir, path, resolver)
}

#[test]
fn allocates_in_order_and_reuses_existing_bindings() {
    let (_dir, path, resolver) = resolver();

    assert_eq!(resolver.resolve_alias("wwid-A").as_deref(), Some("mpath0"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        format!("{BINDINGS_FILE_HEADER}mpath0 wwid-A\n")
    );

    assert_eq!(resolver.resolve_alias("wwid-B").as_deref(), Some("mpath1"));
    assert_eq!(resolver.resolve_alias("wwid-A").as_deref(), Some("mpath0"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        format!("{BINDINGS_FILE_HEADER}mpath0 wwid-A\nmpath1 wwid-B\n")
    );
}

#[test]
fn distinct_wwids_get_distinct_aliases() {
    let (_dir, _path, resolver) = resolver();

    let aliases: Vec<String> = (0..8)
        .map(|n| {
            resolver
                .resolve_alias(&format!("3600a0b80001{n:04}"))
                .unwrap()
        })
        .collect();
    let mut unique = aliases.clone();
    unique.sort();
    unique.dedup();

    assert_eq!(unique.len(), aliases.len());
}

#[test]
fn reverse_lookup_round_trips() {
    let (_dir, _path, resolver) = resolver();

    let alias = resolver.resolve_alias("36001405deadbeef").unwrap();
    assert_eq!(
        resolver.resolve_wwid(&alias).as_deref(),
        Some("36001405deadbeef")
    );
    assert_eq!(resolver.resolve_wwid("mpath42"), None);
}

#[test]
fn empty_input_resolves_to_nothing() {
    let (_dir, path, resolver) = resolver();

    assert_eq!(resolver.resolve_alias(""), None);
    assert_eq!(resolver.resolve_wwid(""), None);
    assert!(!path.exists());
}

#[test]
fn ids_skip_past_foreign_and_deleted_records() {
    let (_dir, path, resolver) = resolver();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        format!("{BINDINGS_FILE_HEADER}oradata wwid-ora\nmpath4 wwid-4\n"),
    )
    .unwrap();

    // mpath0..mpath3 were never written or were removed by hand.
    assert_eq!(
        resolver.resolve_alias("wwid-new").as_deref(),
        Some("mpath5")
    );
    assert_eq!(
        resolver.resolve_alias("wwid-ora").as_deref(),
        Some("oradata")
    );
}

#[test]
fn interrupted_append_is_discarded_on_next_open() {
    let (_dir, path, resolver) = resolver();
    assert_eq!(resolver.resolve_alias("wwid-A").as_deref(), Some("mpath0"));
    let clean = fs::read_to_string(&path).unwrap();

    let mut torn = clean.clone();
    torn.push_str("mpath7 wwid-");
    fs::write(&path, torn).unwrap();

    let store = BindingStore::open(&path).unwrap();
    drop(store);
    assert_eq!(fs::read_to_string(&path).unwrap(), clean);

    assert_eq!(resolver.resolve_alias("wwid-B").as_deref(), Some("mpath1"));
}

#[test]
fn malformed_lines_are_skipped() {
    let (_dir, path, resolver) = resolver();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "mpath3\n\n   # note\nmpath1 wwid-one\n").unwrap();

    assert_eq!(resolver.resolve_wwid("mpath3"), None);
    assert_eq!(resolver.resolve_wwid("mpath1").as_deref(), Some("wwid-one"));
    assert_eq!(
        resolver.resolve_alias("wwid-two").as_deref(),
        Some("mpath4")
    );

    let store = resolver.open().unwrap();
    let aliases: Vec<String> = store
        .bindings()
        .unwrap()
        .into_iter()
        .map(|binding| binding.alias)
        .collect();
    assert_eq!(aliases, vec!["mpath1", "mpath4"]);
}

const HOLD_LOCK_ENV: &str = "MULTIPATH_TEST_HOLD_BINDINGS";
const LOCK_HELD: &str = "bindings-lock-held";

/// Runs in a child process: holds the bindings lock until stdin closes.
/// A no-op in a normal test run.
#[test]
fn hold_bindings_lock_until_stdin_closes() {
    let Some(path) = env::var_os(HOLD_LOCK_ENV) else {
        return;
    };
    let store = BindingStore::open(&PathBuf::from(path)).unwrap();
    println!("{LOCK_HELD}");
    std::io::stdout().flush().unwrap();

    let mut rest = Vec::new();
    std::io::stdin().read_to_end(&mut rest).unwrap();
    drop(store);
}

#[test]
fn second_process_retries_then_gives_up() {
    let (_dir, path, _resolver) = resolver();
    let mut holder = Command::new(env::current_exe().unwrap())
        .args([
            "--exact",
            "hold_bindings_lock_until_stdin_closes",
            "--nocapture",
            "--test-threads=1",
        ])
        .env(HOLD_LOCK_ENV, &path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let mut output = BufReader::new(holder.stdout.take().unwrap());
    let held = output
        .by_ref()
        .lines()
        .map_while(Result::ok)
        .any(|line| line.contains(LOCK_HELD));
    assert!(held, "lock holder exited before taking the lock");

    let retry = LockRetry {
        attempts: 2,
        backoff: Duration::from_millis(20),
    };
    let err = BindingStore::open_with(&path, retry).unwrap_err();
    assert!(matches!(err, SysError::StoreLocked { .. }));

    let contended = AliasResolver::new(&path).with_retry(retry);
    assert_eq!(contended.resolve_alias("wwid-A"), None);

    drop(holder.stdin.take());
    let mut rest = String::new();
    output.read_to_string(&mut rest).unwrap();
    assert!(holder.wait().unwrap().success());

    assert!(BindingStore::open_with(&path, retry).is_ok());
    assert_eq!(contended.resolve_alias("wwid-A").as_deref(), Some("mpath0"));
}
