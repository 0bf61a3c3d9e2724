//! Implementation of the `socgen bitstream` command.

use std::path::Path;

use anyhow::Result;

use socgen_lib::bitstream::{ConfigGenerator, GenerateRequest, Generated};
use socgen_lib::context::is_time_limited;

use super::{Session, runtime};
use crate::BitstreamArgs;
use crate::output::{print_info, print_success, print_warning};

pub fn cmd_bitstream(dir: &Path, args: &BitstreamArgs) -> Result<()> {
  let session = Session::open(dir)?;
  let _lock = session.lock("bitstream")?;

  runtime()?.block_on(run_bitstream(&session, args))?;
  Ok(())
}

/// Generate the configuration; unsupported combinations are reported and skipped.
pub(super) async fn run_bitstream(session: &Session, args: &BitstreamArgs) -> Result<Option<Generated>> {
  let mut ctx = session.ctx.clone();
  if let Some(sof) = &args.sof {
    ctx.flags.unlicensed_ip_detected = is_time_limited(sof);
  }

  let request = GenerateRequest {
    copy_existing: args.copy.is_some(),
    source: args.copy.clone().or_else(|| args.sof.clone()),
    for_host_write: args.host_write,
  };

  let generator = ConfigGenerator::new(&ctx, &session.shell);
  match generator.generate(&request).await {
    Ok(Some(generated)) => {
      let verb = if generated.copied { "Copied" } else { "Generated" };
      print_success(&format!("{} {}", verb, generated.path.display()));
      Ok(Some(generated))
    }
    Ok(None) => {
      print_info("Boot script references no FPGA configuration; nothing to generate");
      Ok(None)
    }
    Err(err) if !err.is_fatal() => {
      print_warning(&format!("FPGA configuration skipped: {err}"));
      Ok(None)
    }
    Err(err) => Err(err.into()),
  }
}
