// SPDX-License-Identifier: GPL-3.0-only

//! Device-mapper operations through the `dmsetup` tool.

use std::cell::Cell;
use std::path::PathBuf;
use std::process::Command;

use multipath_contracts::{DeviceMapper, DmError, DmErrorKind, MapOp};
use tracing::{debug, warn};

use crate::{Result, SysError};

/// Prefix of the device-mapper uuid tagging a map with its wwid.
const UUID_PREFIX: &str = "mpath-";

#[derive(Debug)]
pub struct DmsetupCli {
    program: PathBuf,
    quiet: Cell<bool>,
}

impl DmsetupCli {
    pub fn new() -> Result<Self> {
        let program = which::which("dmsetup").map_err(|e| {
            SysError::OperationFailed(format!("dmsetup not available: {e}"))
        })?;
        Ok(Self::with_program(program))
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            quiet: Cell::new(false),
        }
    }

    fn run(&self, args: &[&str]) -> std::result::Result<String, DmError> {
        debug!("dmsetup {}", args.join(" "));
        let output = Command::new(&self.program).args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !self.quiet.get() {
                warn!("dmsetup {} failed: {}", args.join(" "), stderr);
            }
            let kind = if stderr.contains("busy") {
                DmErrorKind::Busy
            } else if stderr.contains("No such device") {
                DmErrorKind::NotFound
            } else {
                DmErrorKind::CommandFailed
            };
            return Err(DmError::new(kind, format!("dmsetup {}: {stderr}", args[0])));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn message(&self, name: &str, message: &str) -> std::result::Result<(), DmError> {
        let mut args = vec!["message", name, "0"];
        args.extend(message.split(' '));
        self.run(&args).map(drop)
    }

    fn target_type(&self, name: &str) -> std::result::Result<Option<String>, DmError> {
        let table = self.run(&["table", name])?;
        Ok(table_target_type(&table))
    }

    fn open_count(&self, name: &str) -> std::result::Result<u32, DmError> {
        let info = self.run(&["info", "-c", "--noheadings", "-o", "open", name])?;
        info.trim().parse().map_err(|_| {
            DmError::new(DmErrorKind::Internal, format!("bad open count: {info}"))
        })
    }
}

/// Target type of the first table line (`<start> <len> <type> ...`).
fn table_target_type(table: &str) -> Option<String> {
    table
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(2))
        .map(str::to_string)
}

fn table_line(size: u64, target: &str, params: &str) -> String {
    format!("0 {size} {target} {params}")
}

impl DeviceMapper for DmsetupCli {
    fn map_present(&self, name: &str) -> bool {
        self.run(&["info", name]).is_ok()
    }

    fn add_map(
        &self,
        op: MapOp,
        name: &str,
        target: &str,
        params: &str,
        size: u64,
        uuid: Option<&str>,
    ) -> std::result::Result<(), DmError> {
        let table = table_line(size, target, params);
        match op {
            MapOp::Create => {
                let uuid = uuid.map(|wwid| format!("{UUID_PREFIX}{wwid}"));
                let mut args = vec!["create", name];
                if let Some(uuid) = uuid.as_deref() {
                    args.extend(["--uuid", uuid]);
                }
                args.extend(["--table", table.as_str()]);
                self.run(&args).map(drop)
            }
            MapOp::Reload => self.run(&["reload", name, "--table", &table]).map(drop),
        }
    }

    fn resume(&self, name: &str) -> std::result::Result<(), DmError> {
        self.run(&["resume", name]).map(drop)
    }

    fn switch_group(&self, name: &str, group: usize) -> std::result::Result<(), DmError> {
        self.message(name, &format!("switch_group {group}"))
    }

    fn flush_map(&self, name: &str, target: Option<&str>) -> std::result::Result<(), DmError> {
        if let Some(wanted) = target {
            let actual = self.target_type(name)?;
            if actual.as_deref() != Some(wanted) {
                return Err(DmError::new(
                    DmErrorKind::NotFound,
                    format!("{name} is not a {wanted} map"),
                ));
            }
        }
        if self.open_count(name)? > 0 {
            return Err(DmError::busy(format!("{name} is in use")));
        }
        self.run(&["remove", name]).map(drop)
    }

    fn suppress_log(&self) {
        self.quiet.set(true);
    }

    fn restore_log(&self) {
        self.quiet.set(false);
    }

    fn reinstate_path(&self, name: &str, dev_t: &str) -> std::result::Result<(), DmError> {
        self.message(name, &format!("reinstate_path {dev_t}"))
    }

    fn queue_if_no_path(&self, name: &str, enable: bool) -> std::result::Result<(), DmError> {
        let message = if enable {
            "queue_if_no_path"
        } else {
            "fail_if_no_path"
        };
        self.message(name, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_type() {
        assert_eq!(
            table_target_type("0 2097152 multipath 0 0 1 1 round-robin 0 1 1 8:16 1000\n")
                .as_deref(),
            Some("multipath")
        );
        assert_eq!(table_target_type(""), None);
    }

    #[test]
    fn formats_table_line() {
        assert_eq!(
            table_line(2048, "multipath", "0 0 1 1 round-robin 0 1 1 8:16 1000"),
            "0 2048 multipath 0 0 1 1 round-robin 0 1 1 8:16 1000"
        );
    }

    #[test]
    fn missing_program_is_a_command_error() {
        let dm = DmsetupCli::with_program("/nonexistent/dmsetup");

        assert!(!dm.map_present("mpath0"));
        assert_eq!(dm.resume("mpath0").unwrap_err().kind, DmErrorKind::Io);
    }
}
