use anyhow::Result;

use socgen_lib::profile::PROFILES;

use crate::output::{print_json, print_stat, symbols};

pub fn cmd_profiles(json: bool) -> Result<()> {
  if json {
    return print_json(&PROFILES);
  }

  for profile in &PROFILES {
    println!("{} {} ({})", symbols::INFO, profile.device_name, profile.family);
    print_stat("defconfig", profile.defconfig);
    print_stat("device tree", profile.device_tree);
    print_stat("bootloader", profile.primary_artifact);
    print_stat("configuration", profile.config_format().suffix());
    if profile.split_artifact {
      print_stat("packaging", "wrapped SPL + FIT u-boot");
    }
    if profile.early_io_release {
      print_stat("requires", "early I/O release");
    }
    println!();
  }
  Ok(())
}
