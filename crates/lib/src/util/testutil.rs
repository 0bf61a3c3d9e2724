//! Test doubles for the shell and source-fetcher seams.
//!
//! The fakes record what they were asked to do and run a caller-supplied
//! effect that creates (or leaves out) the files a real tool would produce.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::fetch::{FetchError, SourceFetcher};
use crate::shell::{CommandShell, ShellSession};

type Effect = Box<dyn Fn(&ShellSession) + Send + Sync>;

pub struct FakeShell {
  sessions: Mutex<Vec<ShellSession>>,
  interactive: Mutex<Vec<ShellSession>>,
  effect: Effect,
}

impl FakeShell {
  /// A shell whose tools produce nothing.
  pub fn new() -> Self {
    Self::with_effect(|_| {})
  }

  pub fn with_effect(effect: impl Fn(&ShellSession) + Send + Sync + 'static) -> Self {
    Self {
      sessions: Mutex::new(Vec::new()),
      interactive: Mutex::new(Vec::new()),
      effect: Box::new(effect),
    }
  }

  pub fn sessions(&self) -> Vec<ShellSession> {
    self.sessions.lock().unwrap().clone()
  }

  pub fn interactive_sessions(&self) -> Vec<ShellSession> {
    self.interactive.lock().unwrap().clone()
  }

  /// True if any batch session ran a command containing `needle`.
  pub fn ran(&self, needle: &str) -> bool {
    self.sessions().iter().any(|s| s.runs(needle))
  }
}

impl Default for FakeShell {
  fn default() -> Self {
    Self::new()
  }
}

impl CommandShell for FakeShell {
  async fn run(&self, session: &ShellSession) -> Result<()> {
    self.sessions.lock().unwrap().push(session.clone());
    (self.effect)(session);
    Ok(())
  }

  async fn run_interactive(&self, session: &ShellSession) -> Result<()> {
    self.interactive.lock().unwrap().push(session.clone());
    (self.effect)(session);
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCall {
  Sync,
  Fetch,
}

/// Fetcher that "clones" by creating the checkout directory and a few files in it.
pub struct FakeFetcher {
  files: Vec<PathBuf>,
  fail: bool,
  calls: Mutex<Vec<FetchCall>>,
}

impl FakeFetcher {
  pub fn new(files: &[&str]) -> Self {
    Self {
      files: files.iter().map(PathBuf::from).collect(),
      fail: false,
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Every call fails as if the remote were unreachable.
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::new(&[])
    }
  }

  pub fn calls(&self) -> Vec<FetchCall> {
    self.calls.lock().unwrap().clone()
  }
}

impl SourceFetcher for FakeFetcher {
  fn sync(&self, dir: &Path) -> Result<(), FetchError> {
    self.calls.lock().unwrap().push(FetchCall::Sync);
    if self.fail {
      return Err(FetchError::NoRemote(dir.to_path_buf()));
    }
    Ok(())
  }

  fn fetch(&self, url: &str, _branch: &str, dir: &Path) -> Result<(), FetchError> {
    self.calls.lock().unwrap().push(FetchCall::Fetch);
    if self.fail {
      return Err(FetchError::Download {
        url: url.to_string(),
        message: "network unreachable".to_string(),
      });
    }
    std::fs::create_dir_all(dir)?;
    for file in &self.files {
      let path = dir.join(file);
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(path, "#!/bin/sh\n")?;
    }
    Ok(())
  }
}

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}
