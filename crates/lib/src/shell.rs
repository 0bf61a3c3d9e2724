//! Vendor command shell.
//!
//! The SoC EDS embedded command shell sets up `PATH` for the Quartus and
//! u-boot tools and then reads commands from stdin. It returns no usable
//! status, so callers verify results on disk after every session.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{BuildError, Result};
use crate::platform::paths::soceds_root;

/// Name of the vendor shell script inside the SoC EDS root.
pub const EMBEDDED_SHELL: &str = "embedded_command_shell.sh";

/// A batch of lines written to the vendor shell in one go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellSession {
  pub working_dir: PathBuf,
  /// Directories put in front of the inherited `PATH`.
  pub path_prepend: Vec<PathBuf>,
  /// Literal values; [`ShellSession::render`] quotes them.
  pub exports: Vec<(String, String)>,
  pub commands: Vec<String>,
}

impl ShellSession {
  pub fn new(working_dir: impl Into<PathBuf>) -> Self {
    Self {
      working_dir: working_dir.into(),
      path_prepend: Vec::new(),
      exports: Vec::new(),
      commands: Vec::new(),
    }
  }

  pub fn export(mut self, key: &str, value: impl Into<String>) -> Self {
    self.exports.push((key.to_string(), value.into()));
    self
  }

  pub fn prepend_path(mut self, dir: impl Into<PathBuf>) -> Self {
    self.path_prepend.push(dir.into());
    self
  }

  pub fn command(mut self, cmd: impl Into<String>) -> Self {
    self.commands.push(cmd.into());
    self
  }

  /// True if any command line contains `needle`.
  pub fn runs(&self, needle: &str) -> bool {
    self.commands.iter().any(|c| c.contains(needle))
  }

  /// Render the session as the lines fed to the shell.
  pub fn render(&self) -> String {
    let mut script = format!("cd {}\n", quote(&self.working_dir.to_string_lossy()));
    for dir in &self.path_prepend {
      script.push_str(&format!("export PATH={}:\"$PATH\"\n", quote(&dir.to_string_lossy())));
    }
    for (key, value) in &self.exports {
      script.push_str(&format!("export {}={}\n", key, quote(value)));
    }
    for cmd in &self.commands {
      script.push_str(cmd);
      script.push('\n');
    }
    script.push_str("exit\n");
    script
  }
}

/// Single-quote `s` for a POSIX shell.
pub fn quote(s: &str) -> String {
  if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "/._-+:=,".contains(c)) {
    return s.to_string();
  }
  format!("'{}'", s.replace('\'', r"'\''"))
}

/// Line-oriented command sink used for every external tool invocation.
pub trait CommandShell {
  /// Feed the session to the shell and wait until it exits.
  fn run(&self, session: &ShellSession) -> impl Future<Output = Result<()>>;

  /// Run the session with the terminal attached, for interactive tools.
  fn run_interactive(&self, session: &ShellSession) -> impl Future<Output = Result<()>>;
}

/// The vendor shell process, or a plain POSIX shell when SoC EDS is not installed.
#[derive(Debug, Clone)]
pub struct VendorShell {
  program: PathBuf,
}

impl VendorShell {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  /// Pick the shell: explicit override, then the SoC EDS embedded shell, then `/bin/sh`.
  pub fn locate(override_path: Option<&Path>) -> Self {
    if let Some(path) = override_path {
      return Self::new(path);
    }
    if let Some(root) = soceds_root() {
      let embedded = root.join(EMBEDDED_SHELL);
      if embedded.is_file() {
        return Self::new(embedded);
      }
    }
    Self::new("/bin/sh")
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  fn invocation_error(&self, source: std::io::Error) -> BuildError {
    BuildError::ToolInvocation {
      tool: self.program.display().to_string(),
      source,
    }
  }
}

impl CommandShell for VendorShell {
  async fn run(&self, session: &ShellSession) -> Result<()> {
    let script = session.render();
    info!(shell = %self.program.display(), dir = %session.working_dir.display(), "starting vendor shell");
    debug!(script = %script, "shell session");

    let mut child = Command::new(&self.program)
      .stdin(Stdio::piped())
      .stdout(Stdio::inherit())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|e| self.invocation_error(e))?;

    if let Some(mut stdin) = child.stdin.take() {
      stdin.write_all(script.as_bytes()).await.map_err(|e| self.invocation_error(e))?;
      stdin.flush().await.map_err(|e| self.invocation_error(e))?;
    }

    let status = child.wait().await.map_err(|e| self.invocation_error(e))?;
    if !status.success() {
      warn!(code = ?status.code(), "vendor shell exited with failure; checking outputs anyway");
    }
    Ok(())
  }

  async fn run_interactive(&self, session: &ShellSession) -> Result<()> {
    let script = session.render();
    info!(dir = %session.working_dir.display(), "starting interactive session");

    let status = Command::new("/bin/sh")
      .arg("-c")
      .arg(&script)
      .stdin(Stdio::inherit())
      .stdout(Stdio::inherit())
      .stderr(Stdio::inherit())
      .status()
      .await
      .map_err(|e| BuildError::ToolInvocation {
        tool: "/bin/sh".to_string(),
        source: e,
      })?;

    if !status.success() {
      warn!(code = ?status.code(), "interactive session exited with failure");
    }
    Ok(())
  }
}
