//! Device profile registry.
//!
//! Per-family build parameters live in one static table consulted by the
//! generic pipeline. Supporting a new family means adding a row here; unknown
//! family strings are never guessed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::consts::{COMPOSITE_SUFFIX, MONOLITHIC_SUFFIX, TOOLCHAIN_NAME, TOOLCHAIN_PREFIX, TOOLCHAIN_URL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
  #[error("device family '{0}' is not supported; a profile row must be added for it")]
  NotSupported(String),

  #[error("{family} requires {capability}, but the hardware design does not enable it")]
  CapabilityMismatch {
    family: &'static str,
    capability: &'static str,
  },

  #[error("hand-off metadata does not name a device family")]
  MissingFamily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
  Cyclone5,
  Arria5,
  Arria10,
}

impl DeviceFamily {
  /// Short SoC identifier understood by the u-boot filter scripts.
  pub fn as_str(self) -> &'static str {
    match self {
      DeviceFamily::Cyclone5 => "cyclone5",
      DeviceFamily::Arria5 => "arria5",
      DeviceFamily::Arria10 => "arria10",
    }
  }
}

impl fmt::Display for DeviceFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Cross toolchain a profile compiles with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainRef {
  pub name: &'static str,
  pub url: &'static str,
  /// Value for `CROSS_COMPILE`.
  pub prefix: &'static str,
}

/// Script that rewrites vendor board headers from the compiled hardware design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStep {
  /// Path relative to the u-boot source tree.
  pub script: &'static str,
  /// Headers the script writes, relative to the board data directory.
  pub outputs: &'static [&'static str],
}

/// Binary shape of the hardware-configuration artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
  /// One raw configuration stream (`.rbf`).
  Monolithic,
  /// Peripheral and core regions bundled into a FIT container (`.itb`).
  Composite,
}

impl ConfigFormat {
  pub fn suffix(self) -> &'static str {
    match self {
      ConfigFormat::Monolithic => MONOLITHIC_SUFFIX,
      ConfigFormat::Composite => COMPOSITE_SUFFIX,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
  pub family: DeviceFamily,
  /// `DEVICE_FAMILY` value written by Quartus into `hps.xml`.
  pub device_name: &'static str,
  pub toolchain: ToolchainRef,
  pub defconfig: &'static str,
  /// BootROM needs the SPL wrapped into a header-versioned image plus a separate FIT u-boot.
  pub split_artifact: bool,
  /// Run `bsp-create-settings` against the hand-off folder before compiling.
  pub bsp_generate: bool,
  pub filter: Option<FilterStep>,
  /// Vendor board-support data inside the u-boot tree.
  pub board_data_dir: &'static str,
  pub device_tree: &'static str,
  /// Requires the hardware design to enable early I/O release.
  pub early_io_release: bool,
  /// Compiled loader, relative to the u-boot tree.
  pub primary_artifact: &'static str,
  /// Companion image loaded by the SPL, relative to the u-boot tree.
  pub secondary_artifact: &'static str,
}

impl DeviceProfile {
  pub fn config_format(&self) -> ConfigFormat {
    if self.early_io_release {
      ConfigFormat::Composite
    } else {
      ConfigFormat::Monolithic
    }
  }
}

const ARM_TOOLCHAIN: ToolchainRef = ToolchainRef {
  name: TOOLCHAIN_NAME,
  url: TOOLCHAIN_URL,
  prefix: TOOLCHAIN_PREFIX,
};

const QTS_FILTER: FilterStep = FilterStep {
  script: "arch/arm/mach-socfpga/qts-filter.sh",
  outputs: &["iocsr_config.h", "pinmux_config.h", "pll_config.h", "sdram_config.h"],
};

pub static PROFILES: [DeviceProfile; 3] = [
  DeviceProfile {
    family: DeviceFamily::Cyclone5,
    device_name: "Cyclone V",
    toolchain: ARM_TOOLCHAIN,
    defconfig: "socfpga_cyclone5_defconfig",
    split_artifact: false,
    bsp_generate: true,
    filter: Some(QTS_FILTER),
    board_data_dir: "board/altera/cyclone5-socdk/qts",
    device_tree: "socfpga_cyclone5_socdk",
    early_io_release: false,
    primary_artifact: "u-boot-with-spl.sfp",
    secondary_artifact: "u-boot.img",
  },
  DeviceProfile {
    family: DeviceFamily::Arria5,
    device_name: "Arria V",
    toolchain: ARM_TOOLCHAIN,
    defconfig: "socfpga_arria5_defconfig",
    split_artifact: false,
    bsp_generate: true,
    filter: Some(QTS_FILTER),
    board_data_dir: "board/altera/arria5-socdk/qts",
    device_tree: "socfpga_arria5_socdk",
    early_io_release: false,
    primary_artifact: "u-boot-with-spl.sfp",
    secondary_artifact: "u-boot.img",
  },
  DeviceProfile {
    family: DeviceFamily::Arria10,
    device_name: "Arria 10",
    toolchain: ARM_TOOLCHAIN,
    defconfig: "socfpga_arria10_defconfig",
    split_artifact: true,
    bsp_generate: true,
    filter: None,
    board_data_dir: "board/altera/arria10-socdk",
    device_tree: "socfpga_arria10_socdk_sdmmc",
    early_io_release: true,
    primary_artifact: "spl/u-boot-spl-dtb.bin",
    secondary_artifact: "u-boot.img",
  },
];

/// Look up the profile whose device string matches exactly.
pub fn resolve_profile(family: &str) -> Result<&'static DeviceProfile, ProfileError> {
  PROFILES
    .iter()
    .find(|p| p.device_name == family)
    .ok_or_else(|| ProfileError::NotSupported(family.to_string()))
}

/// Resolve a profile and check the capabilities it requires against the design.
pub fn resolve_with_capabilities(
  family: &str,
  early_io_enabled: bool,
) -> Result<&'static DeviceProfile, ProfileError> {
  let profile = resolve_profile(family)?;
  if profile.early_io_release && !early_io_enabled {
    return Err(ProfileError::CapabilityMismatch {
      family: profile.device_name,
      capability: "early I/O release (HPS_EARLY_IO_RELEASE)",
    });
  }
  Ok(profile)
}
