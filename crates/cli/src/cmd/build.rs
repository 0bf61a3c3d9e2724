//! Implementation of the `socgen build` command.
//!
//! Runs the bootloader pipeline and then the configuration generator over
//! the same session. The generator only starts after the bootloader has been
//! placed; any fatal error stops the run.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use super::bitstream::run_bitstream;
use super::bootloader::run_bootloader;
use super::{Session, runtime};
use crate::output::{format_duration, print_placed, print_stat, print_success};
use crate::{BitstreamArgs, DecisionArgs};

pub fn cmd_build(dir: &Path, decisions: &DecisionArgs, bitstream: &BitstreamArgs) -> Result<()> {
  let session = Session::open(dir)?;
  let _lock = session.lock("build")?;

  let started = Instant::now();
  let rt = runtime()?;
  let (bootloader, configuration) = rt.block_on(async {
    let bootloader = run_bootloader(&session, decisions).await?;
    let configuration = run_bitstream(&session, bitstream).await?;
    anyhow::Ok((bootloader, configuration))
  })?;

  println!();
  print_success(&format!("Build complete in {}", format_duration(started.elapsed())));
  print_stat("Device", session.ctx.profile().device_name);
  print_placed(&bootloader.placed);
  if let Some(generated) = configuration {
    print_stat("FPGA configuration", &generated.path.display().to_string());
  }
  Ok(())
}
