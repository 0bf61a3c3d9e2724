mod assemble;
mod bitstream;
mod bootloader;
mod build;
mod profiles;
mod scan;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use socgen_lib::config::Config;
use socgen_lib::context::BuildContext;
use socgen_lib::handoff::{HandoffMetadata, ProjectLayout};
use socgen_lib::lock::ProjectLock;
use socgen_lib::shell::VendorShell;

pub use assemble::cmd_assemble;
pub use bitstream::cmd_bitstream;
pub use bootloader::cmd_bootloader;
pub use build::cmd_build;
pub use profiles::cmd_profiles;
pub use scan::cmd_scan;

/// Everything a pipeline command needs, resolved once per invocation.
pub struct Session {
  pub generator_dir: PathBuf,
  pub config: Config,
  pub ctx: BuildContext,
  pub shell: VendorShell,
}

impl Session {
  /// Discover the project around `dir`, resolve its device profile and create the staging folders.
  pub fn open(dir: &Path) -> Result<Self> {
    let generator_dir =
      dunce::canonicalize(dir).with_context(|| format!("Generator directory not found: {}", dir.display()))?;

    let (config, config_path) = Config::discover(&generator_dir)?;
    if let Some(path) = &config_path {
      debug!(path = %path.display(), "using config");
    }

    let project_dir = generator_dir
      .parent()
      .ok_or_else(|| anyhow!("{} has no parent Quartus project", generator_dir.display()))?;
    let layout = ProjectLayout::discover(project_dir)?;
    let metadata = HandoffMetadata::load(&layout)?;
    let profile = metadata
      .resolve_profile()
      .context("Failed to select a device profile")?
      .clone();

    let staging = config
      .partition_folders(&generator_dir)
      .staging_dirs()
      .context("Failed to prepare partition folders")?;

    let ctx = BuildContext::for_project(&layout, &metadata, profile, staging);
    let shell = VendorShell::locate(config.shell_override().as_deref());
    debug!(
      project = %ctx.project_dir.display(),
      family = %ctx.profile().family,
      shell = %shell.program().display(),
      "session ready"
    );

    Ok(Self {
      generator_dir,
      config,
      ctx,
      shell,
    })
  }

  /// Claim the project for the rest of the run.
  pub fn lock(&self, command: &str) -> Result<ProjectLock> {
    Ok(ProjectLock::acquire(&self.ctx.project_dir, &format!("socgen {command}"))?)
  }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
