//! Implementation of the `socgen bootloader` command.
//!
//! Drives the bootloader state machine step by step, answering its decision
//! points from the command-line flags or by asking the operator.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use socgen_lib::bootloader::{BootloaderBuild, BootloaderOutput, Choice, DecisionPoint, Step};
use socgen_lib::fetch::GitSource;

use super::{Session, runtime};
use crate::DecisionArgs;
use crate::output::{format_duration, print_info, print_placed, print_success};
use crate::prompts::choose;

pub fn cmd_bootloader(dir: &Path, decisions: &DecisionArgs) -> Result<()> {
  let session = Session::open(dir)?;
  let _lock = session.lock("bootloader")?;

  let started = Instant::now();
  let output = runtime()?.block_on(run_bootloader(&session, decisions))?;

  println!();
  print_success(&format!("Bootloader staged in {}", format_duration(started.elapsed())));
  print_placed(&output.placed);
  Ok(())
}

pub(super) async fn run_bootloader(session: &Session, decisions: &DecisionArgs) -> Result<BootloaderOutput> {
  let settings = session.config.bootloader_settings(&session.ctx);
  let mut build = BootloaderBuild::new(&session.ctx, settings, &session.shell, &GitSource);

  print_info(&format!(
    "Building u-boot for {} ({})",
    session.ctx.profile().device_name,
    session.ctx.profile().defconfig
  ));

  loop {
    match build.step().await? {
      Step::Completed(stage) => print_success(&format!("{stage}")),
      Step::Skipped(stage) => print_info(&format!("{stage} not used by this device, skipped")),
      Step::NeedsDecision(point) => {
        let choice = decide(&point, decisions)?;
        build.resolve(choice).await?;
      }
      Step::Finished(output) => {
        if output.reused {
          print_info("Packaged the previous build");
        }
        return Ok(output);
      }
    }
  }
}

/// Flags win over prompts; `--yes` picks the default (rebuild, then continue).
fn decide(point: &DecisionPoint, decisions: &DecisionArgs) -> Result<Choice> {
  match point {
    DecisionPoint::ReuseExisting { artifact, age } => {
      if decisions.reuse {
        return Ok(Choice::Reuse);
      }
      if decisions.rebuild {
        return Ok(Choice::Rebuild);
      }
      let age = humantime::format_duration(Duration::from_secs(age.as_secs()));
      choose(
        &format!("{} was built {} ago. Reuse it?", artifact.display(), age),
        point.options(),
        Choice::Rebuild,
        decisions.yes,
      )
    }
    DecisionPoint::EditConfiguration { source_dir } => {
      if decisions.menuconfig {
        return Ok(Choice::EditConfig);
      }
      if decisions.reuse || decisions.rebuild {
        return Ok(Choice::Continue);
      }
      choose(
        &format!("u-boot is configured in {}. Edit the configuration first?", source_dir.display()),
        point.options(),
        Choice::Continue,
        decisions.yes,
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn reuse_point() -> DecisionPoint {
    DecisionPoint::ReuseExisting {
      artifact: PathBuf::from("u-boot-with-spl.sfp"),
      age: Duration::from_secs(600),
    }
  }

  fn edit_point() -> DecisionPoint {
    DecisionPoint::EditConfiguration {
      source_dir: PathBuf::from("u-boot-socfpga"),
    }
  }

  #[test]
  fn flags_answer_without_prompting() {
    let reuse = DecisionArgs {
      reuse: true,
      ..Default::default()
    };
    assert_eq!(decide(&reuse_point(), &reuse).unwrap(), Choice::Reuse);
    assert_eq!(decide(&edit_point(), &reuse).unwrap(), Choice::Continue);

    let menuconfig = DecisionArgs {
      rebuild: true,
      menuconfig: true,
      ..Default::default()
    };
    assert_eq!(decide(&reuse_point(), &menuconfig).unwrap(), Choice::Rebuild);
    assert_eq!(decide(&edit_point(), &menuconfig).unwrap(), Choice::EditConfig);
  }

  #[test]
  fn yes_takes_defaults() {
    let yes = DecisionArgs {
      yes: true,
      ..Default::default()
    };
    assert_eq!(decide(&reuse_point(), &yes).unwrap(), Choice::Rebuild);
    assert_eq!(decide(&edit_point(), &yes).unwrap(), Choice::Continue);
  }
}
