//! Hardware-configuration (FPGA bitstream) generator.
//!
//! Produces the configuration artifact the boot script loads:
//!
//! - monolithic: `quartus_cpf` turns the `.sof` into one `.rbf`
//! - composite: `quartus_cpf --hps` splits the design into peripheral and
//!   core regions, which `mkimage` bundles into a FIT container (`.itb`)
//!
//! Earlier copies of the artifact are removed from the tool's working
//! directory and from the destination before anything new is written.

pub mod fit;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::artifact::{ArtifactKind, copy_replacing, move_replacing, remove_if_exists, verify_output};
use crate::consts::BOOT_SCRIPT_NAME;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::profile::ConfigFormat;
use crate::scanner::{ConfigName, ScanDecision, scan};
use crate::shell::{CommandShell, ShellSession, quote};

/// Parallel programming width passed to `quartus_cpf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
  /// Boot-time loading by u-boot from the FAT partition.
  Fpp16,
  /// Loading from the running Linux system.
  Fpp8,
}

impl ConfigMode {
  pub fn as_arg(self) -> &'static str {
    match self {
      ConfigMode::Fpp16 => "FPPx16",
      ConfigMode::Fpp8 => "FPPx8",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
  /// Copy `source` instead of running the vendor compiler.
  pub copy_existing: bool,
  /// File to copy, or a `.sof` overriding the one found in the project.
  pub source: Option<PathBuf>,
  /// Write the configuration for loading from Linux instead of at boot.
  pub for_host_write: bool,
}

/// What the generator wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
  pub name: ConfigName,
  /// Final location inside a staging directory.
  pub path: PathBuf,
  pub copied: bool,
}

pub struct ConfigGenerator<'a, S> {
  ctx: &'a BuildContext,
  shell: &'a S,
}

impl<'a, S: CommandShell> ConfigGenerator<'a, S> {
  pub fn new(ctx: &'a BuildContext, shell: &'a S) -> Self {
    Self { ctx, shell }
  }

  /// Staging directory the artifact ends up in.
  pub fn destination_dir(&self, for_host_write: bool) -> &Path {
    if for_host_write {
      &self.ctx.staging.ext
    } else {
      &self.ctx.staging.fat
    }
  }

  /// Produce the configuration artifact the staged boot script asks for.
  ///
  /// Returns `Ok(None)` when the scanner finds nothing to do. Combinations
  /// the profile cannot serve fail with [`BuildError::UnsupportedCombination`]
  /// before anything is removed or invoked.
  pub async fn generate(&self, request: &GenerateRequest) -> Result<Option<Generated>> {
    let format = self.ctx.profile().config_format();
    self.check_supported(format, request)?;

    let dest_dir = self.destination_dir(request.for_host_write);
    let script = self.ctx.staging.fat.join(BOOT_SCRIPT_NAME);
    let name = match scan(&script, format, dest_dir)? {
      ScanDecision::NoAction => {
        info!(script = %script.display(), "no configuration referenced; nothing to generate");
        return Ok(None);
      }
      ScanDecision::Generate(name) => name,
    };
    self.check_licensed(request)?;
    let dest = dest_dir.join(&name.file_name);

    if request.copy_existing {
      let source = request.source.as_deref().ok_or_else(|| {
        BuildError::UnsupportedCombination("copying a configuration needs a source file".to_string())
      })?;
      verify_output(ArtifactKind::HwConfigMonolithic, source, None, SystemTime::now())?;
      copy_replacing(source, &dest)?;
      info!(source = %source.display(), dest = %dest.display(), "copied configuration");
      return Ok(Some(Generated {
        name,
        path: dest,
        copied: true,
      }));
    }

    let sof = self.sof(request)?;
    match format {
      ConfigFormat::Monolithic => {
        let mode = if request.for_host_write {
          ConfigMode::Fpp8
        } else {
          ConfigMode::Fpp16
        };
        self.monolithic(&sof, &name, mode, &dest).await?
      }
      ConfigFormat::Composite => self.composite(&sof, &name, &dest).await?,
    }

    info!(dest = %dest.display(), "configuration written");
    Ok(Some(Generated {
      name,
      path: dest,
      copied: false,
    }))
  }

  fn check_supported(&self, format: ConfigFormat, request: &GenerateRequest) -> Result<()> {
    if format == ConfigFormat::Composite && request.for_host_write {
      warn!(family = %self.ctx.profile().family, "host write requested for a composite configuration");
      return Err(BuildError::UnsupportedCombination(format!(
        "{} loads its configuration at boot through the FIT container; writing it from Linux is not supported",
        self.ctx.profile().device_name
      )));
    }
    Ok(())
  }

  /// Only a copied file can stand in for a design with a time-limited IP core.
  fn check_licensed(&self, request: &GenerateRequest) -> Result<()> {
    if self.ctx.flags.unlicensed_ip_detected && !request.copy_existing {
      return Err(BuildError::UnsupportedCombination(
        "the design contains a time-limited IP core, so no configuration can be generated from it; \
         supply a licensed configuration file to copy instead"
          .to_string(),
      ));
    }
    Ok(())
  }

  fn sof(&self, request: &GenerateRequest) -> Result<PathBuf> {
    let sof = request.source.clone().or_else(|| self.ctx.sof.clone());
    match sof {
      Some(sof) if sof.is_file() => Ok(sof),
      Some(sof) => Err(BuildError::missing("compiled hardware design", sof, "the Quartus compilation")),
      None => Err(BuildError::missing(
        "compiled hardware design",
        self.ctx.project_dir.join("output_files"),
        "the Quartus compilation",
      )),
    }
  }

  async fn monolithic(&self, sof: &Path, name: &ConfigName, mode: ConfigMode, dest: &Path) -> Result<()> {
    let work = work_dir(sof);
    let output = work.join(&name.file_name);
    remove_if_exists(&output)?;
    remove_if_exists(dest)?;

    info!(sof = %sof.display(), mode = mode.as_arg(), "converting design to raw binary");
    let session = ShellSession::new(&work).command(format!(
      "quartus_cpf -c -m {} {} {}",
      mode.as_arg(),
      quote(&sof.to_string_lossy()),
      quote(&name.file_name)
    ));
    self.shell.run(&session).await?;

    verify_output(ArtifactKind::HwConfigMonolithic, &output, None, SystemTime::now())?;
    move_replacing(&output, dest)
  }

  async fn composite(&self, sof: &Path, name: &ConfigName, dest: &Path) -> Result<()> {
    let work = work_dir(sof);
    let periph = work.join(name.periph_region());
    let core = work.join(name.core_region());
    let its = work.join(format!("{}.its", name.body()));
    let container = work.join(&name.file_name);
    for stale in [&periph, &core, &its, &container] {
      remove_if_exists(stale)?;
    }
    remove_if_exists(dest)?;

    info!(sof = %sof.display(), "splitting design into peripheral and core regions");
    let split = ShellSession::new(&work).command(format!(
      "quartus_cpf -c --hps -o bitstream_compression=on {} {}",
      quote(&sof.to_string_lossy()),
      quote(&format!("{}.rbf", name.body()))
    ));
    self.shell.run(&split).await?;

    let now = SystemTime::now();
    verify_output(ArtifactKind::HwConfigPeriph, &periph, None, now)?;
    verify_output(ArtifactKind::HwConfigCore, &core, None, now)?;

    fs::write(&its, fit::render_its(&name.periph_region(), &name.core_region()))
      .map_err(|e| BuildError::io(&its, e))?;

    info!(container = %name.file_name, "packing FIT container");
    let pack = ShellSession::new(&work).command(format!(
      "mkimage -E -f {} {}",
      quote(&format!("{}.its", name.body())),
      quote(&name.file_name)
    ));
    self.shell.run(&pack).await?;

    verify_output(ArtifactKind::HwConfigContainer, &container, None, SystemTime::now())?;
    move_replacing(&container, dest)
  }
}

fn work_dir(sof: &Path) -> PathBuf {
  sof.parent().map(Path::to_path_buf).unwrap_or_default()
}
