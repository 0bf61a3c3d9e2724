//! Build outputs, freshness gates, and placement into staging directories.
//!
//! The vendor tools give no structured success signal, so every stage checks
//! the files it expects on disk. A freshness gate additionally rejects files
//! that exist but were left behind by an earlier run.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::error::{BuildError, Result, VerifyFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
  BootloaderPrimary,
  BootloaderSecondary,
  HwConfigPeriph,
  HwConfigCore,
  HwConfigMonolithic,
  /// FIT image bundling the peripheral and core regions.
  HwConfigContainer,
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ArtifactKind::BootloaderPrimary => "primary bootloader image",
      ArtifactKind::BootloaderSecondary => "secondary bootloader image",
      ArtifactKind::HwConfigPeriph => "peripheral configuration",
      ArtifactKind::HwConfigCore => "core configuration",
      ArtifactKind::HwConfigMonolithic => "FPGA configuration",
      ArtifactKind::HwConfigContainer => "FPGA configuration container",
    };
    f.write_str(s)
  }
}

/// A produced file and where it has to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
  pub kind: ArtifactKind,
  pub source: PathBuf,
  pub destination: PathBuf,
  /// Maximum age relative to "now"; `None` accepts any existing file.
  pub max_age: Option<Duration>,
}

impl ArtifactDescriptor {
  pub fn new(kind: ArtifactKind, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
    Self {
      kind,
      source: source.into(),
      destination: destination.into(),
      max_age: None,
    }
  }

  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = Some(max_age);
    self
  }

  /// Check that the source exists and, if required, is fresh.
  pub fn verify(&self, now: SystemTime) -> Result<()> {
    verify_output(self.kind, &self.source, self.max_age, now)
  }

  /// Copy the source to its destination, replacing any earlier copy.
  pub fn place(&self) -> Result<&Path> {
    copy_replacing(&self.source, &self.destination)?;
    info!(kind = %self.kind, dest = %self.destination.display(), "placed artifact");
    Ok(&self.destination)
  }
}

/// Check a tool output on disk, optionally against a maximum age.
pub fn verify_output(kind: ArtifactKind, path: &Path, max_age: Option<Duration>, now: SystemTime) -> Result<()> {
  let reason = match max_age {
    Some(max_age) => check_fresh(path, max_age, now).err(),
    None => (!path.is_file()).then_some(VerifyFailure::Missing),
  };

  match reason {
    None => Ok(()),
    Some(reason) => Err(BuildError::ArtifactVerification {
      what: kind.to_string(),
      path: path.to_path_buf(),
      reason,
      hint: inspect_hint(path),
    }),
  }
}

/// Age of a file relative to `now`; files stamped in the future count as brand new.
pub fn artifact_age(path: &Path, now: SystemTime) -> io::Result<Duration> {
  let modified = fs::metadata(path)?.modified()?;
  Ok(now.duration_since(modified).unwrap_or(Duration::ZERO))
}

/// Accept `path` only if it exists and is at most `max_age` old.
pub fn check_fresh(path: &Path, max_age: Duration, now: SystemTime) -> std::result::Result<Duration, VerifyFailure> {
  if !path.is_file() {
    return Err(VerifyFailure::Missing);
  }
  let age = artifact_age(path, now).map_err(|_| VerifyFailure::Missing)?;
  debug!(path = %path.display(), age_secs = age.as_secs(), max_secs = max_age.as_secs(), "freshness check");
  if age <= max_age {
    Ok(age)
  } else {
    Err(VerifyFailure::Stale { age, max_age })
  }
}

/// Remove a file if present; absence is not an error.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
  match fs::remove_file(path) {
    Ok(()) => {
      debug!(path = %path.display(), "removed previous file");
      Ok(true)
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(BuildError::io(path, e)),
  }
}

pub fn copy_replacing(source: &Path, destination: &Path) -> Result<()> {
  remove_if_exists(destination)?;
  fs::copy(source, destination).map_err(|e| BuildError::io(destination, e))?;
  Ok(())
}

/// Move a file across directories, falling back to copy+delete between filesystems.
pub fn move_replacing(source: &Path, destination: &Path) -> Result<()> {
  remove_if_exists(destination)?;
  if fs::rename(source, destination).is_err() {
    fs::copy(source, destination).map_err(|e| BuildError::io(destination, e))?;
    fs::remove_file(source).map_err(|e| BuildError::io(source, e))?;
  }
  Ok(())
}

pub(crate) fn inspect_hint(path: &Path) -> String {
  match path.parent() {
    Some(dir) => format!("the tool output in {}", dir.display()),
    None => "the tool output".to_string(),
  }
}

#[cfg(test)]
pub(crate) fn set_age(path: &Path, age: Duration, now: SystemTime) {
  let file = fs::File::options().write(true).open(path).unwrap();
  file.set_modified(now - age).unwrap();
}
