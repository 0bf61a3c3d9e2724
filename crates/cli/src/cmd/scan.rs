//! Implementation of the `socgen scan` command.

use std::path::Path;

use anyhow::Result;

use socgen_lib::consts::BOOT_SCRIPT_NAME;
use socgen_lib::scanner::{ScanDecision, find_references, scan};

use super::Session;
use crate::output::{print_info, print_stat, print_success};

pub fn cmd_scan(dir: &Path) -> Result<()> {
  let session = Session::open(dir)?;
  let ctx = &session.ctx;
  let format = ctx.profile().config_format();
  let script = ctx.staging.fat.join(BOOT_SCRIPT_NAME);

  print_stat("Boot script", &script.display().to_string());
  print_stat("Format", &format!("{:?} ({})", format, format.suffix()).to_lowercase());

  if let Ok(content) = std::fs::read_to_string(&script) {
    for reference in find_references(&content, format.suffix()) {
      print_stat("Reference", &format!("{} (offset {})", reference.filename, reference.offset));
    }
  }

  match scan(&script, format, &ctx.staging.fat)? {
    ScanDecision::NoAction => print_info("No FPGA configuration needed"),
    ScanDecision::Generate(name) => print_success(&format!("Would generate {}", name.file_name)),
  }
  Ok(())
}
