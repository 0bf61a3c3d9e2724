//! Cross toolchain resolution.
//!
//! The toolchain is unpacked once into `toolchain/<name>` and reused by
//! every later run. Archives whose top-level folder is named differently
//! are found by looking for `bin/<prefix>gcc` under the cache directory.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{BuildError, Result};
use crate::fetch::download_archive;
use crate::profile::ToolchainRef;
use crate::shell::{CommandShell, ShellSession, quote};

/// Where to get a toolchain and where to keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSpec {
  pub name: String,
  pub url: String,
  pub prefix: String,
  pub sha256: Option<String>,
  pub cache_dir: PathBuf,
}

impl ToolchainSpec {
  pub fn from_profile(toolchain: &ToolchainRef, cache_dir: impl Into<PathBuf>) -> Self {
    Self {
      name: toolchain.name.to_string(),
      url: toolchain.url.to_string(),
      prefix: toolchain.prefix.to_string(),
      sha256: None,
      cache_dir: cache_dir.into(),
    }
  }

  pub fn root(&self) -> PathBuf {
    self.cache_dir.join(&self.name)
  }
}

/// An unpacked toolchain ready to be exported into a shell session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
  pub root: PathBuf,
  pub prefix: String,
}

impl Toolchain {
  pub fn bin_dir(&self) -> PathBuf {
    self.root.join("bin")
  }

  /// Add the cross-compile exports u-boot's make expects.
  pub fn export_into(&self, session: ShellSession) -> ShellSession {
    session
      .prepend_path(self.bin_dir())
      .export("CROSS_COMPILE", &self.prefix)
      .export("ARCH", "arm")
  }
}

/// Make sure the toolchain is unpacked locally, downloading it if needed.
pub async fn ensure_toolchain<S: CommandShell>(spec: &ToolchainSpec, shell: &S) -> Result<Toolchain> {
  if let Some(root) = installed_root(spec) {
    debug!(root = %root.display(), "toolchain already installed");
    return Ok(Toolchain {
      root,
      prefix: spec.prefix.clone(),
    });
  }

  info!(name = %spec.name, "installing cross toolchain");
  let archive = download_archive(&spec.url, spec.sha256.as_deref(), &spec.cache_dir).await?;
  unpack(&archive, &spec.cache_dir, shell).await?;

  let root = installed_root(spec).ok_or_else(|| {
    BuildError::missing(
      "cross toolchain",
      spec.root().join("bin"),
      format!("the archive {}", archive.display()),
    )
  })?;

  info!(root = %root.display(), "toolchain ready");
  Ok(Toolchain {
    root,
    prefix: spec.prefix.clone(),
  })
}

fn installed_root(spec: &ToolchainSpec) -> Option<PathBuf> {
  let root = spec.root();
  if root.join("bin").is_dir() {
    return Some(root);
  }
  find_compiler_root(&spec.cache_dir, &spec.prefix)
}

/// Directory holding `bin/<prefix>gcc`, searched a few levels below `cache_dir`.
fn find_compiler_root(cache_dir: &Path, prefix: &str) -> Option<PathBuf> {
  let compiler = format!("{prefix}gcc");
  WalkDir::new(cache_dir)
    .min_depth(2)
    .max_depth(4)
    .sort_by_file_name()
    .into_iter()
    .filter_map(|entry| entry.ok())
    .find(|entry| {
      entry.file_name() == compiler.as_str()
        && entry
          .path()
          .parent()
          .and_then(Path::file_name)
          .is_some_and(|dir| dir == "bin")
    })
    .and_then(|entry| entry.path().parent()?.parent().map(Path::to_path_buf))
}

async fn unpack<S: CommandShell>(archive: &Path, dest: &Path, shell: &S) -> Result<()> {
  let session = ShellSession::new(dest).command(format!("tar xf {}", quote(&archive.to_string_lossy())));
  shell.run(&session).await
}
