//! Stages, decision points and results of the bootloader build.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::artifact::ArtifactDescriptor;
use crate::consts::{
  DEFAULT_COMPILE_WINDOW, DEFAULT_MAKE_JOBS, DEFAULT_REUSE_WINDOW, UBOOT_GIT_BRANCH, UBOOT_GIT_URL,
};
use crate::context::BuildContext;
use crate::toolchain::ToolchainSpec;

/// Pipeline stages in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
  StaleCheck,
  Acquire,
  BspGenerate,
  Filter,
  Configure,
  Compile,
  Package,
  Place,
  Done,
}

impl Stage {
  pub fn next(self) -> Stage {
    match self {
      Stage::StaleCheck => Stage::Acquire,
      Stage::Acquire => Stage::BspGenerate,
      Stage::BspGenerate => Stage::Filter,
      Stage::Filter => Stage::Configure,
      Stage::Configure => Stage::Compile,
      Stage::Compile => Stage::Package,
      Stage::Package => Stage::Place,
      Stage::Place | Stage::Done => Stage::Done,
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Stage::StaleCheck => "stale check",
      Stage::Acquire => "source acquisition",
      Stage::BspGenerate => "BSP generation",
      Stage::Filter => "header filter",
      Stage::Configure => "configuration",
      Stage::Compile => "compile",
      Stage::Package => "packaging",
      Stage::Place => "placement",
      Stage::Done => "done",
    };
    f.write_str(s)
  }
}

/// A point where the pipeline waits for the caller to choose how to go on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionPoint {
  /// A recent primary artifact exists and could be packaged as is.
  ReuseExisting { artifact: PathBuf, age: Duration },
  /// The tree is configured; the operator may edit it before compiling.
  EditConfiguration { source_dir: PathBuf },
}

impl DecisionPoint {
  pub fn options(&self) -> &'static [Choice] {
    match self {
      DecisionPoint::ReuseExisting { .. } => &[Choice::Reuse, Choice::Rebuild, Choice::Abort],
      DecisionPoint::EditConfiguration { .. } => &[Choice::Continue, Choice::EditConfig, Choice::Abort],
    }
  }

  pub fn stage(&self) -> Stage {
    match self {
      DecisionPoint::ReuseExisting { .. } => Stage::StaleCheck,
      DecisionPoint::EditConfiguration { .. } => Stage::Configure,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
  Rebuild,
  Reuse,
  Continue,
  /// Run `make menuconfig` before compiling.
  EditConfig,
  Abort,
}

impl fmt::Display for Choice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Choice::Rebuild => "rebuild",
      Choice::Reuse => "reuse",
      Choice::Continue => "continue",
      Choice::EditConfig => "edit configuration",
      Choice::Abort => "abort",
    };
    f.write_str(s)
  }
}

/// Outcome of one call to [`super::BootloaderBuild::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
  Completed(Stage),
  /// The profile does not use this stage.
  Skipped(Stage),
  NeedsDecision(DecisionPoint),
  Finished(BootloaderOutput),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootloaderOutput {
  /// The previous build was packaged instead of compiling again.
  pub reused: bool,
  pub placed: Vec<ArtifactDescriptor>,
}

/// Tunables of a bootloader build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderSettings {
  pub git_url: String,
  pub branch: String,
  pub make_jobs: u32,
  pub reuse_window: Duration,
  pub compile_window: Duration,
  pub toolchain: ToolchainSpec,
}

impl BootloaderSettings {
  /// Built-in defaults, with the toolchain cached under `software/bootloader/toolchain`.
  pub fn defaults_for(ctx: &BuildContext) -> Self {
    Self {
      git_url: UBOOT_GIT_URL.to_string(),
      branch: UBOOT_GIT_BRANCH.to_string(),
      make_jobs: DEFAULT_MAKE_JOBS,
      reuse_window: DEFAULT_REUSE_WINDOW,
      compile_window: DEFAULT_COMPILE_WINDOW,
      toolchain: ToolchainSpec::from_profile(&ctx.profile().toolchain, ctx.bootloader_dir.join("toolchain")),
    }
  }
}
