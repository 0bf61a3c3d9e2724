//! Single-instance lock over one Quartus project.
//!
//! Two runs over the same project would race on the u-boot tree and the
//! staging folders, so the CLI holds an exclusive advisory lock on
//! `software/bootloader/.socgen.lock` for the whole run.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::BOOTLOADER_REL_DIR;

const LOCK_FILENAME: &str = ".socgen.lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: i64,
  pub command: String,
  pub project: PathBuf,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "project is in use by another run: {command} (PID {pid}, started {started_at})\n\
     If you're sure no socgen process is running, remove the lock file:\n  {}",
    lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "project is in use by another run (could not read lock metadata)\n\
     If you're sure no socgen process is running, remove the lock file:\n  {}",
    lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create bootloader directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held for the lifetime of a run; released on drop.
pub struct ProjectLock {
  file: File,
  lock_path: PathBuf,
}

impl ProjectLock {
  pub fn acquire(project_dir: &Path, command: &str) -> Result<Self, LockError> {
    let dir = project_dir.join(BOOTLOADER_REL_DIR);
    std::fs::create_dir_all(&dir).map_err(LockError::CreateDir)?;
    let lock_path = dir.join(LOCK_FILENAME);

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(LockError::OpenFile)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    write_metadata(&file, command, project_dir)?;
    debug!(path = %lock_path.display(), "project lock acquired");
    Ok(Self { file, lock_path })
  }

  /// Metadata as written through the held handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, project: &Path) -> Result<(), LockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: Utc::now().timestamp(),
    command: command.to_string(),
    project: project.to_path_buf(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;
  Ok(())
}

fn read_contention_error(lock_path: &Path) -> LockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      let started_at = DateTime::from_timestamp(metadata.started_at_unix, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("Unix timestamp {}", metadata.started_at_unix));

      return LockError::Contention {
        command: metadata.command,
        pid: metadata.pid,
        started_at,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  LockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

// The vendor tools only run on Linux; elsewhere the lock is not enforced.
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn lock_file_lives_in_bootloader_dir() {
    let temp = TempDir::new().unwrap();
    let lock = ProjectLock::acquire(temp.path(), "build").unwrap();
    assert_eq!(lock.lock_path(), temp.path().join("software/bootloader/.socgen.lock"));
    assert!(lock.lock_path().exists());
  }

  #[test]
  fn lock_metadata_written() {
    let temp = TempDir::new().unwrap();
    let lock = ProjectLock::acquire(temp.path(), "socgen build").unwrap();

    let metadata = lock.read_metadata().unwrap();

    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "socgen build");
    assert_eq!(metadata.pid, std::process::id());
    assert_eq!(metadata.project, temp.path());
  }

  #[test]
  #[cfg(unix)]
  fn second_run_is_refused_with_holder() {
    let temp = TempDir::new().unwrap();
    let _held = ProjectLock::acquire(temp.path(), "socgen build").unwrap();

    let err = ProjectLock::acquire(temp.path(), "socgen bitstream").err().unwrap();

    match err {
      LockError::Contention { command, pid, .. } => {
        assert_eq!(command, "socgen build");
        assert_eq!(pid, std::process::id());
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();
    {
      let _lock = ProjectLock::acquire(temp.path(), "first").unwrap();
    }
    let lock = ProjectLock::acquire(temp.path(), "second").unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
