//! Shell sessions for the vendor and u-boot tools.

use std::path::Path;

use crate::context::BuildContext;
use crate::profile::FilterStep;
use crate::shell::{ShellSession, quote};
use crate::toolchain::Toolchain;

/// SPL wrapped four times by `mkpimage`, relative to the u-boot tree.
pub const WRAPPED_SPL: &str = "spl/spl_w_dtb-mkpimage.bin";

/// FIT image holding u-boot proper, relative to the u-boot tree.
pub const FIT_UBOOT: &str = "fit_uboot.itb";

/// BootROM keeps four copies of the SPL image.
const SPL_COPIES: usize = 4;

fn quoted(path: &Path) -> String {
  quote(&path.to_string_lossy())
}

pub fn bsp_create_settings(ctx: &BuildContext) -> ShellSession {
  let bsp_dir = ctx.project_relative(&ctx.bootloader_dir);
  let handoff = ctx.project_relative(&ctx.handoff_dir);
  ShellSession::new(&ctx.project_dir).command(format!(
    "bsp-create-settings --type spl --bsp-dir {} --preloader-settings-dir {} --settings {}",
    quoted(&bsp_dir),
    quoted(&handoff),
    quoted(&bsp_dir.join("settings.bsp")),
  ))
}

/// `qts-filter.sh <soc> <quartus project> <bsp dir> <output dir>`, run from the u-boot tree.
pub fn qts_filter(ctx: &BuildContext, filter: &FilterStep) -> ShellSession {
  let profile = ctx.profile();
  ShellSession::new(&ctx.source_dir).command(format!(
    "./{} {} ../../../ ../ ./{}",
    filter.script, profile.family, profile.board_data_dir
  ))
}

pub fn configure(ctx: &BuildContext, toolchain: &Toolchain) -> ShellSession {
  toolchain
    .export_into(ShellSession::new(&ctx.source_dir))
    .command("make distclean")
    .command(format!("make {}", ctx.profile().defconfig))
}

pub fn menuconfig(ctx: &BuildContext, toolchain: &Toolchain) -> ShellSession {
  toolchain
    .export_into(ShellSession::new(&ctx.source_dir))
    .command("make menuconfig")
}

pub fn compile(ctx: &BuildContext, toolchain: &Toolchain, jobs: u32) -> ShellSession {
  toolchain
    .export_into(ShellSession::new(&ctx.source_dir))
    .command(format!("make -j {}", jobs))
}

/// Wrap the SPL for BootROM and pack u-boot proper into a FIT image.
pub fn package_split(ctx: &BuildContext) -> ShellSession {
  let profile = ctx.profile();
  let spl = vec![profile.primary_artifact; SPL_COPIES].join(" ");
  ShellSession::new(&ctx.source_dir)
    .command(format!("mkpimage --header-version 1 -o {} {}", WRAPPED_SPL, spl))
    .command(format!(
      "tools/mkimage -E -f {}/fit_uboot.its {}",
      profile.board_data_dir, FIT_UBOOT
    ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::StagingDirs;
  use crate::profile::PROFILES;
  use std::path::PathBuf;

  fn ctx(index: usize) -> BuildContext {
    let root = Path::new("/work/ghrd");
    let staging = StagingDirs {
      raw: root.join("raw"),
      fat: root.join("fat"),
      ext: root.join("ext"),
    };
    BuildContext::new(root, &root.join("hps_isw_handoff/soc_system_hps_0"), PROFILES[index].clone(), staging)
  }

  #[test]
  fn bsp_paths_are_project_relative() {
    let session = bsp_create_settings(&ctx(0));
    assert_eq!(session.working_dir, PathBuf::from("/work/ghrd"));
    assert_eq!(
      session.commands,
      vec![
        "bsp-create-settings --type spl --bsp-dir software/bootloader \
         --preloader-settings-dir hps_isw_handoff/soc_system_hps_0 \
         --settings software/bootloader/settings.bsp"
      ]
    );
  }

  #[test]
  fn filter_targets_board_qts_dir() {
    let ctx = ctx(1);
    let filter = ctx.profile().filter.clone().unwrap();
    let session = qts_filter(&ctx, &filter);
    assert_eq!(
      session.commands,
      vec!["./arch/arm/mach-socfpga/qts-filter.sh arria5 ../../../ ../ ./board/altera/arria5-socdk/qts"]
    );
  }

  #[test]
  fn split_packaging_wraps_spl_four_times() {
    let session = package_split(&ctx(2));
    let wrap = &session.commands[0];
    assert!(wrap.starts_with("mkpimage --header-version 1 -o spl/spl_w_dtb-mkpimage.bin"));
    assert_eq!(wrap.matches("spl/u-boot-spl-dtb.bin").count(), 4);
    assert_eq!(
      session.commands[1],
      "tools/mkimage -E -f board/altera/arria10-socdk/fit_uboot.its fit_uboot.itb"
    );
  }

  #[test]
  fn configure_resets_tree_then_applies_defconfig() {
    let toolchain = Toolchain {
      root: PathBuf::from("/tc"),
      prefix: "arm-none-linux-gnueabihf-".to_string(),
    };
    let session = configure(&ctx(0), &toolchain);
    assert_eq!(session.commands, vec!["make distclean", "make socfpga_cyclone5_defconfig"]);
    assert!(session.exports.iter().any(|(k, _)| k == "CROSS_COMPILE"));
    assert_eq!(compile(&ctx(0), &toolchain, 8).commands, vec!["make -j 8"]);
  }
}
