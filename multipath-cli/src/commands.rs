// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use anyhow::{Context, Result, bail};
use multipath_engine::{ApplyOutcome, CoalesceReport, Coalescer, ConfigContext, RunOptions};
use multipath_sys::{AliasResolver, DmsetupCli, FlockPathLocker, Result as SysResult};
use multipath_types::{PathGroupingPolicy, Snapshot};

use crate::{Cli, Command};

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Alias { ref wwid } => {
            let resolver = resolver(&cli)?;
            let alias = resolver.try_resolve_alias(wwid).unwrap_or_else(|e| {
                tracing::warn!("{}: cannot allocate alias: {}", wwid, e);
                wwid.clone()
            });
            println!("{alias}");
        }
        Command::Wwid { ref alias } => {
            let resolver = resolver(&cli)?;
            match resolver.try_resolve_wwid(alias)? {
                Some(wwid) => println!("{wwid}"),
                None => bail!("{alias}: no binding in {}", resolver.path().display()),
            }
        }
        Command::Bindings => {
            let resolver = resolver(&cli)?;
            for binding in resolver.open()?.bindings()? {
                println!("{} {}", binding.alias, binding.wwid);
            }
        }
        Command::Coalesce {
            ref snapshot,
            dry_run,
            policy,
        } => coalesce(&cli, snapshot, dry_run, policy)?,
    }
    Ok(())
}

fn context(cli: &Cli, options: RunOptions) -> Result<ConfigContext> {
    let ctx = ConfigContext::load(&cli.config, options)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    Ok(match &cli.bindings_file {
        Some(path) => ctx.with_alias_resolver(AliasResolver::new(path)),
        None => ctx,
    })
}

fn resolver(cli: &Cli) -> Result<AliasResolver> {
    Ok(context(cli, RunOptions::default())?.aliases().clone())
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid snapshot {}", path.display()))
}

fn coalesce(
    cli: &Cli,
    snapshot: &Path,
    dry_run: bool,
    pg_policy: Option<PathGroupingPolicy>,
) -> Result<()> {
    let ctx = context(cli, RunOptions { dry_run, pg_policy })?;
    let Snapshot {
        paths: mut table,
        maps: mut current,
    } = load_snapshot(snapshot)?;

    let dm = device_mapper(DmsetupCli::new(), dry_run)?;
    let locker = FlockPathLocker::default();

    let report = Coalescer::new(&ctx, &dm, &locker)
        .coalesce_paths(&mut current, &mut table);
    for line in report_lines(&report) {
        println!("{line}");
    }
    match report.aborted {
        Some(e) => Err(e).context("coalescing pass aborted, retry later"),
        None => Ok(()),
    }
}

/// A dry run never reaches device-mapper, so a missing `dmsetup` is only
/// fatal for real passes.
fn device_mapper(found: SysResult<DmsetupCli>, dry_run: bool) -> Result<DmsetupCli> {
    match found {
        Ok(dm) => Ok(dm),
        Err(e) if dry_run => {
            tracing::debug!("{}; continuing dry run", e);
            Ok(DmsetupCli::with_program("dmsetup"))
        }
        Err(e) => Err(e).context("dmsetup is required to apply maps"),
    }
}

fn report_lines(report: &CoalesceReport) -> Vec<String> {
    let last = report.devices.len().saturating_sub(1);
    let mut lines = Vec::with_capacity(report.devices.len() + report.flushed.len());

    for (index, entry) in report.devices.iter().enumerate() {
        let status = match entry.outcome {
            None if report.aborted.is_some() && index == last => "busy",
            None => "skipped",
            Some(ApplyOutcome::DryRun) => "dry run",
            Some(ApplyOutcome::Failed) => "failed",
            Some(ApplyOutcome::Applied) => "applied",
            Some(ApplyOutcome::AlreadyExisting) => "unchanged",
        };
        lines.push(format!(
            "{} ({}): {} {}",
            entry.device.alias, entry.device.wwid, entry.device.action, status
        ));
    }
    for alias in &report.flushed {
        lines.push(format!("{alias}: flushed (dead)"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use multipath_engine::{CoalesceError, DeviceOutcome};
    use multipath_sys::SysError;
    use multipath_types::{Action, MultipathDevice};

    use super::*;

    fn entry(wwid: &str, action: Action, outcome: Option<ApplyOutcome>) -> DeviceOutcome {
        let mut device = MultipathDevice::new(wwid);
        device.alias = wwid.to_string();
        device.action = action;
        DeviceOutcome { device, outcome }
    }

    #[test]
    fn dry_run_tolerates_missing_dmsetup() {
        let missing = || -> SysResult<DmsetupCli> {
            Err(SysError::OperationFailed("no dmsetup".to_string()))
        };

        assert!(device_mapper(missing(), true).is_ok());
        assert!(device_mapper(missing(), false).is_err());
    }

    #[test]
    fn aborted_report_still_lists_applied_maps() {
        let report = CoalesceReport {
            devices: vec![
                entry("wA", Action::Create, Some(ApplyOutcome::Applied)),
                entry("wB", Action::Create, None),
            ],
            flushed: Vec::new(),
            aborted: Some(CoalesceError::DeviceBusy {
                alias: "wB".to_string(),
            }),
        };

        assert_eq!(
            report_lines(&report),
            vec!["wA (wA): create applied", "wB (wB): create busy"]
        );
    }

    #[test]
    fn complete_report_lists_skipped_and_flushed() {
        let report = CoalesceReport {
            devices: vec![
                entry("wA", Action::Undefined, None),
                entry("wB", Action::Nothing, Some(ApplyOutcome::AlreadyExisting)),
            ],
            flushed: vec!["mpath9".to_string()],
            aborted: None,
        };

        assert_eq!(
            report_lines(&report),
            vec![
                "wA (wA): undef skipped",
                "wB (wB): none unchanged",
                "mpath9: flushed (dead)",
            ]
        );
    }
}
