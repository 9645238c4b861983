//! Patch: the container's hosts table as a single owned resource.
//!
//! The table is opened once, locked exclusively, read, and rewritten at most once.
//! The lock lives on a close-on-exec descriptor, so replacing the process releases it.
//! A replacement file is locked before it is renamed over the table, so the lock
//! always guards the live inode.
//!
//! Lookups follow the resolver's `files` backend: the first line naming a host wins.
//! A correction is therefore one managed line inserted at the top of the table;
//! everything else is left as it was.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::MANAGED_TAG;

use super::detect::Identity;

#[derive(Debug, Error)]
pub enum HostsError {
  #[error("failed to open hosts table {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("hosts table {path} is locked by another process")]
  Locked { path: PathBuf },

  #[error("failed to lock hosts table {path}: {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read hosts table {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write hosts table {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("hosts table {path} does not contain the written correction")]
  Verify { path: PathBuf },
}

/// The mapping a bootstrap run wants in the hosts table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostnameCorrection {
  pub original_hostname: String,
  pub aliases: Vec<String>,
  pub resolved_address: IpAddr,
  pub patched_entry: String,
}

impl HostnameCorrection {
  pub fn for_identity(identity: &Identity) -> Self {
    let names: Vec<&str> = identity.names().collect();
    Self {
      original_hostname: identity.hostname.clone(),
      aliases: identity.aliases.clone(),
      resolved_address: identity.address,
      patched_entry: format!("{}\t{}\t{}", identity.address, names.join(" "), MANAGED_TAG),
    }
  }

  fn names(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.original_hostname.as_str()).chain(self.aliases.iter().map(String::as_str))
  }
}

/// Result of [`HostsTable::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
  /// Every name already resolved to the detected address.
  Unchanged,
  /// The table was rewritten atomically.
  Replaced,
  /// The table is a mount point; it was overwritten in place and verified.
  RewrittenInPlace,
}

#[derive(Debug)]
pub struct HostsTable {
  path: PathBuf,
  // Held for the advisory lock.
  file: File,
  content: String,
}

impl HostsTable {
  /// Open, lock and read the table.
  pub fn acquire(path: &Path) -> Result<Self, HostsError> {
    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .open(path)
      .map_err(|source| HostsError::Open {
        path: path.to_path_buf(),
        source,
      })?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(HostsError::Locked {
          path: path.to_path_buf(),
        });
      }
      return Err(HostsError::Lock {
        path: path.to_path_buf(),
        source: err,
      });
    }

    let mut content = String::new();
    file.read_to_string(&mut content).map_err(|source| HostsError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    debug!(path = %path.display(), bytes = content.len(), "hosts table acquired");

    Ok(Self {
      path: path.to_path_buf(),
      file,
      content,
    })
  }

  /// Read the table without locking it.
  pub fn read(path: &Path) -> Result<String, HostsError> {
    fs::read_to_string(path).map_err(|source| HostsError::Read {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn content(&self) -> &str {
    &self.content
  }

  /// Address the first entry for `name` maps to.
  pub fn lookup(&self, name: &str) -> Option<IpAddr> {
    lookup(&self.content, name)
  }

  /// Whether any name of `correction` resolves somewhere else (or nowhere).
  pub fn needs_patch(&self, correction: &HostnameCorrection) -> bool {
    needs_patch(&self.content, correction)
  }

  /// Bring the table in line with `correction`. Does nothing when it already is.
  pub fn apply(&mut self, correction: &HostnameCorrection) -> Result<PatchOutcome, HostsError> {
    if !self.needs_patch(correction) {
      debug!(path = %self.path.display(), "hosts table already correct");
      return Ok(PatchOutcome::Unchanged);
    }

    let patched = render_patched(&self.content, correction);
    let outcome = self.write(&patched)?;
    self.content = patched;

    info!(
      path = %self.path.display(),
      entry = %correction.patched_entry,
      outcome = ?outcome,
      "hosts table patched"
    );
    Ok(outcome)
  }

  fn write(&mut self, content: &str) -> Result<PatchOutcome, HostsError> {
    match self.replace_atomically(content) {
      Ok(()) => Ok(PatchOutcome::Replaced),
      Err(e) if is_mount_point_error(&e) => {
        warn!(path = %self.path.display(), error = %e, "cannot replace hosts table, rewriting in place");
        self.rewrite_in_place(content)?;
        Ok(PatchOutcome::RewrittenInPlace)
      }
      Err(source) => Err(HostsError::Write {
        path: self.path.clone(),
        source,
      }),
    }
  }

  /// Temp file in the same directory, fsync, rename over the table.
  fn replace_atomically(&mut self, content: &str) -> io::Result<()> {
    let dir = match self.path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
      _ => PathBuf::from("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    temp.write_all(content.as_bytes())?;
    if let Ok(meta) = self.file.metadata() {
      temp.as_file().set_permissions(meta.permissions())?;
    }
    temp.as_file().sync_all()?;
    try_lock_exclusive(temp.as_file())?;
    let replaced = temp.persist(&self.path).map_err(|e| e.error)?;

    // The old inode is unlinked; its lock goes with it.
    self.file = replaced;
    sync_dir(&dir);
    Ok(())
  }

  fn rewrite_in_place(&mut self, content: &str) -> Result<(), HostsError> {
    use std::io::{Seek, SeekFrom};

    let write_err = |source: io::Error| HostsError::Write {
      path: self.path.clone(),
      source,
    };

    {
      // Termination signals stay pending until the table is whole again.
      let _blocked = BlockedSignals::termination().map_err(write_err)?;
      self.file.seek(SeekFrom::Start(0)).map_err(write_err)?;
      self.file.write_all(content.as_bytes()).map_err(write_err)?;
      self.file.set_len(content.len() as u64).map_err(write_err)?;
      self.file.sync_all().map_err(write_err)?;
    }

    let written = Self::read(&self.path)?;
    if written != content {
      return Err(HostsError::Verify {
        path: self.path.clone(),
      });
    }
    Ok(())
  }
}

/// Bind-mounted tables (and tables in read-only directories) cannot be renamed over.
fn is_mount_point_error(err: &io::Error) -> bool {
  matches!(
    err.kind(),
    io::ErrorKind::ResourceBusy | io::ErrorKind::CrossesDevices | io::ErrorKind::PermissionDenied
  )
}

/// SIGTERM, SIGINT and SIGHUP blocked for this thread until dropped.
#[cfg(unix)]
struct BlockedSignals {
  previous: nix::sys::signal::SigSet,
}

#[cfg(unix)]
impl BlockedSignals {
  fn termination() -> io::Result<Self> {
    use nix::sys::signal::{SigSet, SigmaskHow, Signal, pthread_sigmask};

    let mut set = SigSet::empty();
    for signal in [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP] {
      set.add(signal);
    }
    let mut previous = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))?;
    Ok(Self { previous })
  }
}

#[cfg(unix)]
impl Drop for BlockedSignals {
  fn drop(&mut self) {
    use nix::sys::signal::{SigmaskHow, pthread_sigmask};

    if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
      warn!(error = %e, "failed to restore signal mask");
    }
  }
}

#[cfg(not(unix))]
struct BlockedSignals;

#[cfg(not(unix))]
impl BlockedSignals {
  fn termination() -> io::Result<Self> {
    Ok(Self)
  }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
  if let Ok(d) = File::open(dir) {
    let _ = d.sync_all();
  }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
  Ok(())
}

/// Address and host names of one table line, comments stripped.
fn parse_line(line: &str) -> Option<(IpAddr, Vec<&str>)> {
  let data = line.split('#').next()?;
  let mut fields = data.split_whitespace();
  let addr = fields.next()?.parse().ok()?;
  let names: Vec<&str> = fields.collect();
  if names.is_empty() {
    return None;
  }
  Some((addr, names))
}

pub(crate) fn lookup(content: &str, name: &str) -> Option<IpAddr> {
  content
    .lines()
    .filter_map(parse_line)
    .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
    .map(|(addr, _)| addr)
}

pub(crate) fn needs_patch(content: &str, correction: &HostnameCorrection) -> bool {
  correction
    .names()
    .any(|name| lookup(content, name) != Some(correction.resolved_address))
}

fn is_managed(line: &str) -> bool {
  line.trim_end().ends_with(MANAGED_TAG)
}

/// Table content with earlier managed lines removed and the new entry on top.
pub(crate) fn render_patched(content: &str, correction: &HostnameCorrection) -> String {
  let mut out = String::with_capacity(content.len() + correction.patched_entry.len() + 1);
  out.push_str(&correction.patched_entry);
  out.push('\n');
  for line in content.lines().filter(|l| !is_managed(l)) {
    out.push_str(line);
    out.push('\n');
  }
  out
}
