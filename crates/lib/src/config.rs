//! Optional TOML configuration.
//!
//! Looked up in this order: `$SOCGEN_CONFIG`, `socgen.toml` in the generator
//! directory, `$XDG_CONFIG_HOME/socgen/config.toml`. A missing file means
//! built-in defaults.
//!
//! ```toml
//! [bootloader]
//! branch = "socfpga_v2021.04"
//! make_jobs = 8
//!
//! [freshness]
//! reuse_window = "3h"
//! compile_window = "5m"
//!
//! [image]
//! assembler = "python3 LinuxBootImageGenerator.py"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

use crate::bootloader::BootloaderSettings;
use crate::consts::{
  CONFIG_FILENAME, DEFAULT_COMPILE_WINDOW, DEFAULT_MAKE_JOBS, DEFAULT_REUSE_WINDOW, UBOOT_GIT_BRANCH, UBOOT_GIT_URL,
};
use crate::context::BuildContext;
use crate::layout::{Partition, PartitionFolders, default_partitions};
use crate::platform::paths::config_dir;
use crate::toolchain::ToolchainSpec;

/// Path of an explicit configuration file.
pub const CONFIG_ENV: &str = "SOCGEN_CONFIG";
/// Path of the vendor command shell, overriding the configuration.
pub const SHELL_ENV: &str = "SOCGEN_SHELL";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid config file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub bootloader: BootloaderSection,
  pub toolchain: ToolchainSection,
  pub freshness: FreshnessSection,
  pub vendor: VendorSection,
  pub image: ImageSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootloaderSection {
  pub git_url: String,
  pub branch: String,
  pub make_jobs: u32,
}

impl Default for BootloaderSection {
  fn default() -> Self {
    Self {
      git_url: UBOOT_GIT_URL.to_string(),
      branch: UBOOT_GIT_BRANCH.to_string(),
      make_jobs: DEFAULT_MAKE_JOBS,
    }
  }
}

/// Overrides for the profile's toolchain.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainSection {
  pub url: Option<String>,
  pub name: Option<String>,
  pub prefix: Option<String>,
  pub sha256: Option<String>,
  /// Cache directory; relative paths are taken from the bootloader directory.
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreshnessSection {
  #[serde(deserialize_with = "duration")]
  pub reuse_window: Duration,
  #[serde(deserialize_with = "duration")]
  pub compile_window: Duration,
}

impl Default for FreshnessSection {
  fn default() -> Self {
    Self {
      reuse_window: DEFAULT_REUSE_WINDOW,
      compile_window: DEFAULT_COMPILE_WINDOW,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorSection {
  pub shell: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSection {
  /// Directory holding `Image_partitions`; defaults to the generator directory.
  pub folder: Option<PathBuf>,
  pub partitions: Vec<Partition>,
  pub assembler: Option<String>,
}

impl Default for ImageSection {
  fn default() -> Self {
    Self {
      folder: None,
      partitions: default_partitions(),
      assembler: None,
    }
  }
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
  let raw = String::deserialize(deserializer)?;
  humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl Config {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  /// First configuration file that applies to `generator_dir`, if any.
  pub fn locate(generator_dir: &Path) -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
      return Some(PathBuf::from(explicit));
    }
    [generator_dir.join(CONFIG_FILENAME), config_dir().join("config.toml")]
      .into_iter()
      .find(|p| p.is_file())
  }

  /// Load the applicable configuration, or defaults when there is none.
  pub fn discover(generator_dir: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
    match Self::locate(generator_dir) {
      Some(path) => {
        debug!(path = %path.display(), "loading config");
        Ok((Self::load(&path)?, Some(path)))
      }
      None => Ok((Self::default(), None)),
    }
  }

  pub fn bootloader_settings(&self, ctx: &BuildContext) -> BootloaderSettings {
    let tc = &self.toolchain;
    let profile_tc = &ctx.profile().toolchain;
    let cache_dir = match &tc.dir {
      Some(dir) if dir.is_absolute() => dir.clone(),
      Some(dir) => ctx.bootloader_dir.join(dir),
      None => ctx.bootloader_dir.join("toolchain"),
    };

    BootloaderSettings {
      git_url: self.bootloader.git_url.clone(),
      branch: self.bootloader.branch.clone(),
      make_jobs: self.bootloader.make_jobs,
      reuse_window: self.freshness.reuse_window,
      compile_window: self.freshness.compile_window,
      toolchain: ToolchainSpec {
        name: tc.name.clone().unwrap_or_else(|| profile_tc.name.to_string()),
        url: tc.url.clone().unwrap_or_else(|| profile_tc.url.to_string()),
        prefix: tc.prefix.clone().unwrap_or_else(|| profile_tc.prefix.to_string()),
        sha256: tc.sha256.clone(),
        cache_dir,
      },
    }
  }

  /// Vendor shell override: `$SOCGEN_SHELL`, then `[vendor] shell`.
  pub fn shell_override(&self) -> Option<PathBuf> {
    std::env::var(SHELL_ENV)
      .ok()
      .map(PathBuf::from)
      .or_else(|| self.vendor.shell.clone())
  }

  pub fn partition_folders(&self, generator_dir: &Path) -> PartitionFolders {
    let working_dir = match &self.image.folder {
      Some(dir) if dir.is_absolute() => dir.clone(),
      Some(dir) => generator_dir.join(dir),
      None => generator_dir.to_path_buf(),
    };
    let folders = PartitionFolders::new(working_dir, self.image.partitions.clone());
    match &self.image.assembler {
      Some(cmd) => folders.with_assembler(cmd),
      None => folders,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::StagingDirs;
  use crate::profile::PROFILES;
  use serial_test::serial;
  use tempfile::TempDir;

  fn ctx(root: &Path) -> BuildContext {
    let staging = StagingDirs {
      raw: root.join("raw"),
      fat: root.join("fat"),
      ext: root.join("ext"),
    };
    BuildContext::new(root, &root.join("handoff"), PROFILES[0].clone(), staging)
  }

  #[test]
  fn empty_file_gives_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.freshness.reuse_window, Duration::from_secs(3 * 60 * 60));
    assert_eq!(config.image.partitions.len(), 3);
  }

  #[test]
  fn durations_use_humantime() {
    let config: Config = toml::from_str(
      r#"
[freshness]
reuse_window = "90m"
compile_window = "2m 30s"
"#,
    )
    .unwrap();
    assert_eq!(config.freshness.reuse_window, Duration::from_secs(90 * 60));
    assert_eq!(config.freshness.compile_window, Duration::from_secs(150));
  }

  #[test]
  fn unknown_keys_are_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(CONFIG_FILENAME);
    fs::write(&path, "[bootloader]\nbrnch = \"x\"\n").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
  }

  #[test]
  fn settings_merge_overrides_with_profile() {
    let root = Path::new("/work/ghrd");
    let config: Config = toml::from_str(
      r#"
[bootloader]
make_jobs = 4

[toolchain]
dir = "cache"
sha256 = "abc"
"#,
    )
    .unwrap();

    let settings = config.bootloader_settings(&ctx(root));

    assert_eq!(settings.make_jobs, 4);
    assert_eq!(settings.branch, UBOOT_GIT_BRANCH);
    assert_eq!(settings.toolchain.cache_dir, root.join("software/bootloader/cache"));
    assert_eq!(settings.toolchain.prefix, "arm-none-linux-gnueabihf-");
    assert_eq!(settings.toolchain.sha256.as_deref(), Some("abc"));
  }

  #[test]
  fn partitions_and_assembler_from_config() {
    let config: Config = toml::from_str(
      r#"
[image]
folder = "out"
assembler = "mkimg"
partitions = [
  { id = 1, type = "vfat", size = "200M" },
  { id = 2, type = "ext4" },
  { id = 3, type = "raw" },
]
"#,
    )
    .unwrap();

    let folders = config.partition_folders(Path::new("/gen"));
    assert_eq!(folders.working_dir, PathBuf::from("/gen/out"));
    assert_eq!(folders.assembler.as_deref(), Some("mkimg"));
    assert_eq!(folders.partitions[1].size, "*");
  }

  #[test]
  #[serial]
  fn locate_prefers_env_then_generator_dir() {
    let temp = TempDir::new().unwrap();
    let local = temp.path().join(CONFIG_FILENAME);
    fs::write(&local, "").unwrap();

    temp_env::with_vars(
      [
        (CONFIG_ENV, None),
        ("XDG_CONFIG_HOME", Some(temp.path().join("xdg").to_str().unwrap())),
      ],
      || {
        assert_eq!(Config::locate(temp.path()), Some(local.clone()));
      },
    );
    temp_env::with_var(CONFIG_ENV, Some("/etc/socgen.toml"), || {
      assert_eq!(Config::locate(temp.path()), Some(PathBuf::from("/etc/socgen.toml")));
    });
  }

  #[test]
  #[serial]
  fn shell_env_overrides_config() {
    let config: Config = toml::from_str("[vendor]\nshell = \"/opt/eds/embedded_command_shell.sh\"\n").unwrap();
    temp_env::with_var(SHELL_ENV, Some("/bin/bash"), || {
      assert_eq!(config.shell_override(), Some(PathBuf::from("/bin/bash")));
    });
    temp_env::with_var(SHELL_ENV, None::<&str>, || {
      assert_eq!(
        config.shell_override(),
        Some(PathBuf::from("/opt/eds/embedded_command_shell.sh"))
      );
    });
  }
}
