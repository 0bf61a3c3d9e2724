//! Session state for one orchestration run.

use std::path::{Path, PathBuf};

use crate::consts::{BOOTLOADER_REL_DIR, UBOOT_DIR_NAME};
use crate::handoff::{HandoffMetadata, ProjectLayout};
use crate::profile::DeviceProfile;

/// Partition working folders the image-layout collaborator created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDirs {
  pub raw: PathBuf,
  pub fat: PathBuf,
  pub ext: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
  /// The compiled design contains a time-limited (unlicensed) IP core.
  pub unlicensed_ip_detected: bool,
  pub early_io_release_enabled: bool,
}

/// Mutable state owned by exactly one pipeline run.
///
/// The device profile is bound at construction and cannot be swapped afterwards.
#[derive(Debug, Clone)]
pub struct BuildContext {
  pub project_dir: PathBuf,
  pub handoff_dir: PathBuf,
  /// `software/bootloader` inside the project.
  pub bootloader_dir: PathBuf,
  /// Cloned u-boot tree inside the bootloader directory.
  pub source_dir: PathBuf,
  /// Compiled hardware design used by the configuration generator.
  pub sof: Option<PathBuf>,
  pub flags: BuildFlags,
  pub staging: StagingDirs,
  profile: DeviceProfile,
}

impl BuildContext {
  pub fn new(project_dir: &Path, handoff_dir: &Path, profile: DeviceProfile, staging: StagingDirs) -> Self {
    let bootloader_dir = project_dir.join(BOOTLOADER_REL_DIR);
    let source_dir = bootloader_dir.join(UBOOT_DIR_NAME);
    Self {
      project_dir: project_dir.to_path_buf(),
      handoff_dir: handoff_dir.to_path_buf(),
      bootloader_dir,
      source_dir,
      sof: None,
      flags: BuildFlags::default(),
      staging,
      profile,
    }
  }

  /// Build a context from a discovered project and its hand-off metadata.
  pub fn for_project(
    layout: &ProjectLayout,
    metadata: &HandoffMetadata,
    profile: DeviceProfile,
    staging: StagingDirs,
  ) -> Self {
    let mut ctx = Self::new(&layout.project_dir, &layout.handoff_dir, profile, staging);
    ctx.sof = layout.sof.clone();
    ctx.flags = BuildFlags {
      unlicensed_ip_detected: layout.sof.as_deref().is_some_and(is_time_limited),
      early_io_release_enabled: metadata.early_io_release(),
    };
    ctx
  }

  pub fn with_sof(mut self, sof: impl Into<PathBuf>) -> Self {
    self.sof = Some(sof.into());
    self
  }

  pub fn with_flags(mut self, flags: BuildFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn profile(&self) -> &DeviceProfile {
    &self.profile
  }

  /// Compiled loader inside the u-boot tree.
  pub fn primary_artifact(&self) -> PathBuf {
    self.source_dir.join(self.profile.primary_artifact)
  }

  pub fn secondary_artifact(&self) -> PathBuf {
    self.source_dir.join(self.profile.secondary_artifact)
  }

  /// `path` relative to the project directory, as the vendor tools expect it.
  pub fn project_relative(&self, path: &Path) -> PathBuf {
    path.strip_prefix(&self.project_dir).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
  }
}

/// Quartus names the programming file `*_time_limited.sof` when an OpenCore Plus IP lacks a license.
pub fn is_time_limited(sof: &Path) -> bool {
  sof
    .file_stem()
    .and_then(|s| s.to_str())
    .is_some_and(|s| s.ends_with("_time_limited"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::PROFILES;

  fn staging(root: &Path) -> StagingDirs {
    StagingDirs {
      raw: root.join("raw"),
      fat: root.join("fat"),
      ext: root.join("ext"),
    }
  }

  #[test]
  fn derives_bootloader_paths() {
    let root = Path::new("/work/ghrd");
    let ctx = BuildContext::new(root, &root.join("hps_isw_handoff/hps_0"), PROFILES[0].clone(), staging(root));

    assert_eq!(ctx.bootloader_dir, root.join("software/bootloader"));
    assert_eq!(ctx.source_dir, root.join("software/bootloader/u-boot-socfpga"));
    assert_eq!(
      ctx.primary_artifact(),
      root.join("software/bootloader/u-boot-socfpga/u-boot-with-spl.sfp")
    );
    assert_eq!(ctx.project_relative(&ctx.handoff_dir), PathBuf::from("hps_isw_handoff/hps_0"));
  }

  #[test]
  fn time_limited_sof_detected() {
    assert!(is_time_limited(Path::new("output_files/ghrd_time_limited.sof")));
    assert!(!is_time_limited(Path::new("output_files/ghrd.sof")));
  }
}
