//! Bootloader build state machine.
//!
//! Drives u-boot from source acquisition to placement in the staging
//! directories:
//!
//! 1. stale check (may offer to reuse a recent build)
//! 2. acquire / sync the u-boot tree
//! 3. BSP generation and header filter, when the profile declares them
//! 4. configure with the cross toolchain (may offer a menuconfig detour)
//! 5. compile, package, place
//!
//! Stages only run after their predecessor verified its outputs on disk.
//! Decisions are handed back to the caller as [`DecisionPoint`]s; the
//! machine never prompts on its own.

pub mod commands;
pub mod types;

use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::artifact::{ArtifactDescriptor, ArtifactKind, check_fresh, remove_if_exists, verify_output};
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::fetch::SourceFetcher;
use crate::shell::CommandShell;
use crate::toolchain::{Toolchain, ensure_toolchain};

pub use commands::{FIT_UBOOT, WRAPPED_SPL};
pub use types::{BootloaderOutput, BootloaderSettings, Choice, DecisionPoint, Stage, Step};

/// Tolerance for file systems that store coarse modification times.
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// One bootloader build over a [`BuildContext`].
pub struct BootloaderBuild<'a, S, F> {
  ctx: &'a BuildContext,
  settings: BootloaderSettings,
  shell: &'a S,
  fetcher: &'a F,
  stage: Stage,
  pending: Option<DecisionPoint>,
  toolchain: Option<Toolchain>,
  halted: bool,
  output: BootloaderOutput,
}

impl<'a, S: CommandShell, F: SourceFetcher> BootloaderBuild<'a, S, F> {
  pub fn new(ctx: &'a BuildContext, settings: BootloaderSettings, shell: &'a S, fetcher: &'a F) -> Self {
    Self {
      ctx,
      settings,
      shell,
      fetcher,
      stage: Stage::StaleCheck,
      pending: None,
      toolchain: None,
      halted: false,
      output: BootloaderOutput::default(),
    }
  }

  /// Stage that runs on the next call to [`step`](Self::step).
  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn pending(&self) -> Option<&DecisionPoint> {
    self.pending.as_ref()
  }

  /// Run the current stage.
  ///
  /// While a decision is pending the same [`Step::NeedsDecision`] is returned
  /// until [`resolve`](Self::resolve) is called. After a failure every further
  /// call returns [`BuildError::Halted`].
  pub async fn step(&mut self) -> Result<Step> {
    if self.halted {
      return Err(BuildError::Halted(self.stage));
    }
    if let Some(point) = &self.pending {
      return Ok(Step::NeedsDecision(point.clone()));
    }

    let result = self.advance().await;
    if result.is_err() {
      self.halted = true;
    }
    result
  }

  /// Answer the pending decision.
  ///
  /// A choice the decision point does not offer is rejected without changing state.
  pub async fn resolve(&mut self, choice: Choice) -> Result<()> {
    let Some(point) = self.pending.clone() else {
      return Err(BuildError::UnsupportedCombination(format!(
        "no decision is pending at {}",
        self.stage
      )));
    };
    if !point.options().contains(&choice) {
      return Err(BuildError::UnsupportedCombination(format!(
        "'{}' is not an option at {}",
        choice,
        point.stage()
      )));
    }

    self.pending = None;
    info!(stage = %point.stage(), choice = %choice, "decision");

    match choice {
      Choice::Abort => {
        self.halted = true;
        return Err(BuildError::Aborted(point.stage()));
      }
      Choice::Reuse => {
        self.output.reused = true;
        self.stage = Stage::Package;
      }
      Choice::Rebuild => self.stage = Stage::Acquire,
      Choice::Continue => {}
      Choice::EditConfig => {
        let result = self.edit_configuration().await;
        if result.is_err() {
          self.halted = true;
        }
        result?;
      }
    }
    Ok(())
  }

  /// Drive the machine to completion, asking `decide` at every decision point.
  pub async fn run_with<D>(mut self, mut decide: D) -> Result<BootloaderOutput>
  where
    D: FnMut(&DecisionPoint) -> Choice,
  {
    loop {
      match self.step().await? {
        Step::NeedsDecision(point) => {
          let choice = decide(&point);
          self.resolve(choice).await?;
        }
        Step::Finished(output) => return Ok(output),
        Step::Completed(stage) => debug!(stage = %stage, "stage completed"),
        Step::Skipped(stage) => debug!(stage = %stage, "stage skipped"),
      }
    }
  }

  async fn advance(&mut self) -> Result<Step> {
    let stage = self.stage;
    let step = match stage {
      Stage::StaleCheck => return Ok(self.stale_check()),
      Stage::Acquire => self.acquire()?,
      Stage::BspGenerate => self.bsp_generate().await?,
      Stage::Filter => self.filter().await?,
      Stage::Configure => return self.configure().await,
      Stage::Compile => self.compile().await?,
      Stage::Package => self.package().await?,
      Stage::Place => self.place()?,
      Stage::Done => return Ok(Step::Finished(self.output.clone())),
    };
    self.stage = stage.next();
    Ok(step)
  }

  fn stale_check(&mut self) -> Step {
    let primary = self.ctx.primary_artifact();
    match check_fresh(&primary, self.settings.reuse_window, SystemTime::now()) {
      Ok(age) => {
        info!(path = %primary.display(), age_secs = age.as_secs(), "recent bootloader build found");
        let point = DecisionPoint::ReuseExisting { artifact: primary, age };
        self.pending = Some(point.clone());
        Step::NeedsDecision(point)
      }
      Err(reason) => {
        debug!(path = %primary.display(), %reason, "no reusable bootloader build");
        self.stage = Stage::Acquire;
        Step::Completed(Stage::StaleCheck)
      }
    }
  }

  fn acquire(&mut self) -> Result<Step> {
    let source = &self.ctx.source_dir;
    if source.is_dir() {
      info!(path = %source.display(), "syncing u-boot sources");
      self.fetcher.sync(source)?;
    } else {
      info!(url = %self.settings.git_url, branch = %self.settings.branch, "fetching u-boot sources");
      self.fetcher.fetch(&self.settings.git_url, &self.settings.branch, source)?;
      if !source.is_dir() {
        return Err(BuildError::missing(
          "u-boot source tree",
          source,
          format!("the clone of {}", self.settings.git_url),
        ));
      }
    }
    Ok(Step::Completed(Stage::Acquire))
  }

  async fn bsp_generate(&mut self) -> Result<Step> {
    if !self.ctx.profile().bsp_generate {
      return Ok(Step::Skipped(Stage::BspGenerate));
    }

    info!(handoff = %self.ctx.handoff_dir.display(), "generating board support package");
    self.shell.run(&commands::bsp_create_settings(self.ctx)).await?;

    let bsp = &self.ctx.bootloader_dir;
    let hint = "the bsp-create-settings output and the hand-off folder";
    let generated = bsp.join("generated");
    if !generated.is_dir() {
      return Err(BuildError::missing("generated BSP directory", generated, hint));
    }
    let settings = bsp.join("settings.bsp");
    if !settings.is_file() {
      return Err(BuildError::missing("BSP settings file", settings, hint));
    }
    Ok(Step::Completed(Stage::BspGenerate))
  }

  async fn filter(&mut self) -> Result<Step> {
    let Some(filter) = &self.ctx.profile().filter else {
      return Ok(Step::Skipped(Stage::Filter));
    };

    let script = self.ctx.source_dir.join(filter.script);
    if !script.is_file() {
      return Err(BuildError::missing(
        "header filter script",
        script,
        "the u-boot checkout and its branch",
      ));
    }

    let started = SystemTime::now();
    info!(script = filter.script, "filtering board headers");
    self.shell.run(&commands::qts_filter(self.ctx, filter)).await?;

    // The board directory ships with the checkout; only headers rewritten by this run count.
    let board = self.ctx.source_dir.join(self.ctx.profile().board_data_dir);
    let now = SystemTime::now();
    let window = now.duration_since(started).unwrap_or_default() + MTIME_SLACK;
    for header in filter.outputs {
      let path = board.join(header);
      if let Err(reason) = check_fresh(&path, window, now) {
        return Err(BuildError::ArtifactVerification {
          what: "filtered board header".to_string(),
          path,
          reason,
          hint: format!("the {} output and the hand-off folder", filter.script),
        });
      }
    }
    Ok(Step::Completed(Stage::Filter))
  }

  async fn configure(&mut self) -> Result<Step> {
    let toolchain = self.toolchain().await?;
    info!(defconfig = self.ctx.profile().defconfig, "configuring u-boot");
    self.shell.run(&commands::configure(self.ctx, &toolchain)).await?;

    let config = self.ctx.source_dir.join(".config");
    if !config.is_file() {
      return Err(BuildError::missing(
        "u-boot configuration",
        config,
        format!("make {} in {}", self.ctx.profile().defconfig, self.ctx.source_dir.display()),
      ));
    }

    self.stage = Stage::Compile;
    let point = DecisionPoint::EditConfiguration {
      source_dir: self.ctx.source_dir.clone(),
    };
    self.pending = Some(point.clone());
    Ok(Step::NeedsDecision(point))
  }

  async fn edit_configuration(&mut self) -> Result<()> {
    let toolchain = self.toolchain().await?;
    info!(path = %self.ctx.source_dir.display(), "starting menuconfig");
    self.shell.run_interactive(&commands::menuconfig(self.ctx, &toolchain)).await
  }

  async fn compile(&mut self) -> Result<Step> {
    let toolchain = self.toolchain().await?;
    info!(jobs = self.settings.make_jobs, "compiling u-boot");
    self.shell.run(&commands::compile(self.ctx, &toolchain, self.settings.make_jobs)).await?;

    let now = SystemTime::now();
    verify_output(
      ArtifactKind::BootloaderPrimary,
      &self.ctx.primary_artifact(),
      Some(self.settings.compile_window),
      now,
    )?;
    verify_output(ArtifactKind::BootloaderSecondary, &self.ctx.secondary_artifact(), None, now)?;
    Ok(Step::Completed(Stage::Compile))
  }

  async fn package(&mut self) -> Result<Step> {
    let now = SystemTime::now();
    verify_output(ArtifactKind::BootloaderPrimary, &self.ctx.primary_artifact(), None, now)?;

    if !self.ctx.profile().split_artifact {
      return Ok(Step::Completed(Stage::Package));
    }

    let wrapped = self.ctx.source_dir.join(WRAPPED_SPL);
    let fit = self.ctx.source_dir.join(FIT_UBOOT);
    remove_if_exists(&wrapped)?;
    remove_if_exists(&fit)?;

    info!("wrapping SPL and packing FIT image");
    self.shell.run(&commands::package_split(self.ctx)).await?;

    verify_output(ArtifactKind::BootloaderPrimary, &wrapped, None, now)?;
    verify_output(ArtifactKind::BootloaderSecondary, &fit, None, now)?;
    Ok(Step::Completed(Stage::Package))
  }

  fn place(&mut self) -> Result<Step> {
    let now = SystemTime::now();
    for artifact in placement_plan(self.ctx) {
      artifact.verify(now)?;
      artifact.place()?;
      self.output.placed.push(artifact);
    }
    Ok(Step::Completed(Stage::Place))
  }

  async fn toolchain(&mut self) -> Result<Toolchain> {
    if let Some(toolchain) = &self.toolchain {
      return Ok(toolchain.clone());
    }
    let toolchain = ensure_toolchain(&self.settings.toolchain, self.shell).await?;
    self.toolchain = Some(toolchain.clone());
    Ok(toolchain)
  }
}

/// Files the placement stage copies and where they go.
///
/// Gen5 profiles put the combined SPL+u-boot image on the RAW partition.
/// Split profiles put the wrapped SPL there and the FIT u-boot on FAT.
pub fn placement_plan(ctx: &BuildContext) -> Vec<ArtifactDescriptor> {
  let staging = &ctx.staging;
  if !ctx.profile().split_artifact {
    let primary = ctx.primary_artifact();
    let name = primary.file_name().map(ToOwned::to_owned).unwrap_or_default();
    return vec![ArtifactDescriptor::new(
      ArtifactKind::BootloaderPrimary,
      &primary,
      staging.raw.join(name),
    )];
  }

  vec![
    ArtifactDescriptor::new(
      ArtifactKind::BootloaderPrimary,
      ctx.source_dir.join(WRAPPED_SPL),
      staging.raw.join("spl_w_dtb-mkpimage.bin"),
    ),
    ArtifactDescriptor::new(
      ArtifactKind::BootloaderSecondary,
      ctx.source_dir.join(FIT_UBOOT),
      staging.fat.join(FIT_UBOOT),
    ),
  ]
}
