// SPDX-License-Identifier: GPL-3.0-only

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use multipath_types::binding::{BindingLine, parse_binding_line};
use multipath_types::{BINDINGS_FILE_HEADER, Binding, reserved_alias_id};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SysError};

/// Bounded retry while another process holds the bindings lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    /// Retries after the first failed attempt.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Result of a bindings scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<T> {
    /// One past the highest reserved-pattern id seen while scanning.
    pub next_id: u64,
    pub found: Option<T>,
}

#[derive(Clone, Copy)]
enum Query<'a> {
    Wwid(&'a str),
    Alias(&'a str),
}

/// Reads through positioned reads so the writer's file offset never moves.
///
/// The store must not open and close a second descriptor on the file: closing
/// any descriptor drops the process's record lock.
struct ScanCursor<'a> {
    file: &'a File,
    offset: u64,
}

impl Read for ScanCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.file.read_at(buf, self.offset)?;
        self.offset += read as u64;
        Ok(read)
    }
}

/// Open, locked handle on the bindings file.
///
/// The lock is held until the handle is dropped.
#[derive(Debug)]
pub struct BindingStore {
    file: File,
    path: PathBuf,
}

impl BindingStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, LockRetry::default())
    }

    pub fn open_with(path: &Path, retry: LockRetry) -> Result<Self> {
        ensure_directories_exist(path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                error!("Cannot open bindings file [{}] : {}", path.display(), e);
                SysError::Io(e)
            })?;

        lock_bindings_file(&file, path, retry)?;

        let store = Self {
            file,
            path: path.to_path_buf(),
        };
        if store.drop_partial_record()? == 0 {
            store.write_header()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Alias bound to `wwid`, plus the next free id.
    pub fn find_by_wwid(&self, wwid: &str) -> Result<Lookup<String>> {
        let lookup = self.scan(Query::Wwid(wwid))?;
        if lookup.found.is_none() {
            debug!("No matching wwid [{}] in bindings file.", wwid);
        }
        Ok(lookup)
    }

    /// Wwid bound to `alias`, plus the next free id.
    pub fn find_by_alias(&self, alias: &str) -> Result<Lookup<String>> {
        let lookup = self.scan(Query::Alias(alias))?;
        if lookup.found.is_none() {
            debug!("No matching alias [{}] in bindings file.", alias);
        }
        Ok(lookup)
    }

    /// Append a binding for `wwid` under the reserved alias for `id`.
    ///
    /// A failed append is truncated away so no partial record stays behind.
    pub fn allocate(&mut self, wwid: &str, id: u64) -> Result<String> {
        if wwid.is_empty() || wwid.contains(|c: char| c.is_whitespace() || c == '#') {
            return Err(SysError::InvalidRecord(format!("unusable wwid [{wwid}]")));
        }

        let binding = Binding::new(Binding::reserved_alias(id), wwid);
        let offset = self.file.seek(SeekFrom::End(0)).map_err(|e| {
            error!("Cannot seek to end of bindings file : {}", e);
            SysError::Io(e)
        })?;

        if let Err(e) = self.file.write_all(binding.to_line().as_bytes()) {
            error!("Cannot write binding to bindings file : {}", e);
            if let Err(truncate) = self.file.set_len(offset) {
                error!("Cannot clear partial binding : {}", truncate);
            }
            return Err(SysError::Io(e));
        }
        self.file.sync_data()?;

        debug!(
            "Created new binding [{}] for WWID [{}]",
            binding.alias, binding.wwid
        );
        Ok(binding.alias)
    }

    /// Every well-formed record, in file order.
    pub fn bindings(&self) -> Result<Vec<Binding>> {
        let mut bindings = Vec::new();
        self.for_each_line(|_, line| {
            if let BindingLine::Record { alias, wwid } = line {
                bindings.push(Binding::new(alias, wwid));
            }
            false
        })?;
        Ok(bindings)
    }

    fn scan(&self, query: Query<'_>) -> Result<Lookup<String>> {
        let mut highest: Option<u64> = None;
        let mut found = None;

        self.for_each_line(|line_nr, line| {
            if let Some(id) = line.alias().and_then(reserved_alias_id) {
                highest = Some(highest.map_or(id, |h| h.max(id)));
            }
            match line {
                BindingLine::Blank => false,
                BindingLine::Malformed { .. } => {
                    debug!("Ignoring malformed line {} in bindings file", line_nr);
                    false
                }
                BindingLine::Record { alias, wwid } => match query {
                    Query::Wwid(wanted) if wwid == wanted => {
                        debug!(
                            "Found matching wwid [{}] in bindings file. Setting alias to {}",
                            wwid, alias
                        );
                        found = Some(alias.to_string());
                        true
                    }
                    Query::Alias(wanted) if alias == wanted => {
                        debug!(
                            "Found matching alias [{}] in bindings file. Setting wwid to {}",
                            alias, wwid
                        );
                        found = Some(wwid.to_string());
                        true
                    }
                    _ => false,
                },
            }
        })?;

        let next_id = match highest {
            None => 0,
            Some(id) => id.checked_add(1).ok_or_else(|| {
                error!("Bindings file full. Cannot allocate new binding");
                SysError::StoreUnusable("no free binding id left".to_string())
            })?,
        };
        Ok(Lookup { next_id, found })
    }

    /// Feed each line to `visit` until it returns true.
    fn for_each_line<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(u32, BindingLine<'_>) -> bool,
    {
        let mut reader = BufReader::new(ScanCursor {
            file: &self.file,
            offset: 0,
        });
        let mut buf = Vec::new();
        let mut line_nr = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            line_nr += 1;
            let line = String::from_utf8_lossy(&buf);
            if visit(line_nr, parse_binding_line(&line)) {
                return Ok(());
            }
        }
    }

    /// Truncate an unterminated trailing record left by an interrupted
    /// append. Returns the resulting file length.
    fn drop_partial_record(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Ok(0);
        }

        let mut last = [0u8; 1];
        self.file.read_exact_at(&mut last, len - 1)?;
        if last[0] == b'\n' {
            return Ok(len);
        }

        let mut content = Vec::with_capacity(len as usize);
        ScanCursor {
            file: &self.file,
            offset: 0,
        }
        .read_to_end(&mut content)?;
        let keep = content
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);

        warn!(
            "Discarding partial record [{}] at end of bindings file [{}]",
            String::from_utf8_lossy(&content[keep..]),
            self.path.display()
        );
        self.file.set_len(keep as u64)?;
        self.file.sync_all()?;
        Ok(keep as u64)
    }

    fn write_header(&self) -> Result<()> {
        let mut writer = &self.file;
        if let Err(e) = writer.write_all(BINDINGS_FILE_HEADER.as_bytes()) {
            error!("Cannot write header to bindings file : {}", e);
            if let Err(truncate) = self.file.set_len(0) {
                error!("Cannot clear partial header : {}", truncate);
            }
            return Err(SysError::StoreUnusable(format!("header write failed: {e}")));
        }
        self.file.sync_all().map_err(|e| {
            error!("Cannot flush bindings file header : {}", e);
            SysError::StoreUnusable(format!("header flush failed: {e}"))
        })?;
        debug!("Initialized new bindings file [{}]", self.path.display());
        Ok(())
    }
}

fn ensure_directories_exist(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }

    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(parent)
        .map_err(|e| {
            error!("Cannot make directory [{}] : {}", parent.display(), e);
            SysError::Io(e)
        })?;
    debug!("Created dir [{}]", parent.display());
    Ok(())
}

fn lock_bindings_file(file: &File, path: &Path, retry: LockRetry) -> Result<()> {
    let mut remaining = retry.attempts;

    loop {
        // SAFETY: flock is a plain C struct; all-zero is a valid value.
        let mut lock: libc::flock = unsafe { std::mem::zeroed() };
        lock.l_type = libc::F_WRLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;

        // SAFETY: the descriptor is owned by `file` and `lock` outlives the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &lock) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EAGAIN) => {
                warn!("Bindings file is currently locked");
            }
            _ => {
                error!("Cannot lock bindings file : {}", err);
                return Err(SysError::Io(err));
            }
        }

        if remaining == 0 {
            error!(
                "Giving up on bindings file [{}] after {} retries",
                path.display(),
                retry.attempts
            );
            return Err(SysError::StoreLocked {
                path: path.to_path_buf(),
            });
        }
        remaining -= 1;

        info!("retrying");
        thread::sleep(retry.backoff);
    }
}
