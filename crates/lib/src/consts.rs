//! Fixed names shared across the pipeline.

use std::time::Duration;

pub const APP_NAME: &str = "socgen";

/// Name of the per-project configuration file, looked up in the generator directory.
pub const CONFIG_FILENAME: &str = "socgen.toml";

pub const UBOOT_GIT_URL: &str = "https://github.com/altera-opensource/u-boot-socfpga";
pub const UBOOT_GIT_BRANCH: &str = "socfpga_v2021.04";
pub const UBOOT_DIR_NAME: &str = "u-boot-socfpga";

pub const TOOLCHAIN_URL: &str = "https://developer.arm.com/-/media/Files/downloads/gnu-a/10.2-2020.11/binrel/gcc-arm-10.2-2020.11-x86_64-arm-none-linux-gnueabihf.tar.xz";
pub const TOOLCHAIN_NAME: &str = "gcc-arm-10.2-2020.11-x86_64-arm-none-linux-gnueabihf";
pub const TOOLCHAIN_PREFIX: &str = "arm-none-linux-gnueabihf-";

/// Relative location of the bootloader working directory inside the Quartus project.
pub const BOOTLOADER_REL_DIR: &str = "software/bootloader";

/// A primary artifact younger than this may be reused instead of rebuilt.
pub const DEFAULT_REUSE_WINDOW: Duration = Duration::from_secs(3 * 60 * 60);

/// Compile output older than this is treated as left over from an earlier build.
pub const DEFAULT_COMPILE_WINDOW: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_MAKE_JOBS: u32 = 24;

pub const IMAGE_FOLDER_NAME: &str = "Image_partitions";

/// Boot script consulted by the reference scanner, relative to the FAT staging directory.
pub const BOOT_SCRIPT_NAME: &str = "boot.script";

pub const MONOLITHIC_SUFFIX: &str = ".rbf";
pub const COMPOSITE_SUFFIX: &str = ".itb";
