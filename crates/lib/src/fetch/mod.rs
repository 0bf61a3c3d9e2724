//! Source acquisition and archive download.
//!
//! - `git`: clone or update the bootloader sources
//! - `download`: fetch the cross toolchain archive with optional SHA-256 check

pub mod download;
pub mod git;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use download::download_archive;
pub use git::GitSource;

/// Errors that can occur while fetching sources or archives.
///
/// All of them end the current run; re-invoking the pipeline retries.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Failed to create the destination directory.
  #[error("failed to create directory '{0}': {1}")]
  CreateDir(PathBuf, #[source] std::io::Error),

  /// Failed to clone a git repository.
  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to open an existing git repository.
  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  /// Failed to fetch from remote.
  #[error("failed to fetch from '{url}': {source}")]
  Fetch {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to find remote.
  #[error("no remote configured for repository at '{0}'")]
  NoRemote(PathBuf),

  /// Failed to connect to remote.
  #[error("failed to connect to remote '{url}': {source}")]
  Connect {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// HEAD does not name a branch, so there is nothing to fast-forward.
  #[error("'{0}' has a detached HEAD; check out a branch before syncing")]
  Detached(PathBuf),

  /// Tracked files were edited; a sync would overwrite them.
  #[error("'{0}' has local changes; commit or discard them before syncing")]
  LocalChanges(PathBuf),

  /// The local branch has commits the upstream does not.
  #[error("branch '{branch}' in '{path}' has diverged from its upstream and cannot be fast-forwarded")]
  Diverged { path: PathBuf, branch: String },

  /// Moving the branch or writing its working tree failed.
  #[error("failed to update '{path}': {source}")]
  Update {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// HTTP request failed.
  #[error("download failed for {url}: {message}")]
  Download { url: String, message: String },

  /// SHA256 hash mismatch after download.
  #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Seam between the bootloader pipeline and the source repository.
pub trait SourceFetcher {
  /// Bring an existing checkout in line with its upstream.
  fn sync(&self, dir: &Path) -> Result<(), FetchError>;

  /// Clone `url` at `branch` into `dir`.
  fn fetch(&self, url: &str, branch: &str, dir: &Path) -> Result<(), FetchError>;
}
