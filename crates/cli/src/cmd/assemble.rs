//! Implementation of the `socgen assemble` command.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use socgen_lib::layout::{ImageLayout, image_file_name};

use super::{Session, runtime};
use crate::output::{format_bytes, print_stat, print_success};

pub fn cmd_assemble(dir: &Path, output: Option<&str>) -> Result<()> {
  let session = Session::open(dir)?;
  let _lock = session.lock("assemble")?;

  let folders = session.config.partition_folders(&session.generator_dir);
  let dirs = folders.stage_directories()?;
  for (tag, path) in &dirs {
    print_stat(&tag.to_string(), &path.display().to_string());
  }

  let name = output.map(str::to_string).unwrap_or_else(|| image_file_name(Local::now()));
  let image = runtime()?
    .block_on(folders.assemble(&session.shell, &name))
    .context("Failed to assemble the disk image")?;

  let size = std::fs::metadata(&image).map(|m| m.len()).unwrap_or(0);
  print_success(&format!("Image written: {} ({})", image.display(), format_bytes(size)));
  Ok(())
}
