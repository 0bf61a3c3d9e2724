//! Bootloader command integration tests.
//!
//! A u-boot tree that is not a git checkout stands in for an earlier build,
//! so every path here stays offline.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use predicates::prelude::*;

use super::common::TestProject;

const PRIMARY: &str = "project/software/bootloader/u-boot-socfpga/u-boot-with-spl.sfp";

fn with_previous_build(age: Duration) -> (TestProject, PathBuf) {
  let project = TestProject::cyclone5();
  project.write_file(PRIMARY, "spl+u-boot");
  let primary = project.temp.path().join(PRIMARY);
  std::fs::File::options()
    .write(true)
    .open(&primary)
    .unwrap()
    .set_modified(SystemTime::now() - age)
    .unwrap();
  (project, primary)
}

#[test]
fn reuse_packages_previous_build() {
  let (project, _) = with_previous_build(Duration::from_secs(60));

  project
    .socgen_cmd()
    .args(["bootloader", "--reuse"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Packaged the previous build"))
    .stdout(predicate::str::contains("Bootloader staged"));

  let placed = std::fs::read_to_string(project.raw_dir().join("u-boot-with-spl.sfp")).unwrap();
  assert_eq!(placed, "spl+u-boot");
}

#[test]
fn reuse_decision_needs_a_terminal_or_a_flag() {
  let (project, _) = with_previous_build(Duration::from_secs(60));

  project
    .socgen_cmd()
    .arg("bootloader")
    .assert()
    .failure()
    .stderr(predicate::str::contains("non-interactive mode"));

  assert!(!project.raw_dir().join("u-boot-with-spl.sfp").exists());
}

#[test]
fn rebuild_stops_when_sources_cannot_be_synced() {
  let (project, _) = with_previous_build(Duration::from_secs(60));

  project
    .socgen_cmd()
    .args(["bootloader", "--rebuild"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to acquire bootloader sources"));
}

#[test]
fn configured_reuse_window_is_honored() {
  let (project, _) = with_previous_build(Duration::from_secs(2 * 60 * 60));
  std::fs::write(
    project.generator_dir.join("socgen.toml"),
    "[freshness]\nreuse_window = \"1h\"\n",
  )
  .unwrap();

  // Too old to be offered, so the run goes straight to source acquisition.
  project
    .socgen_cmd()
    .arg("bootloader")
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to acquire bootloader sources"))
    .stderr(predicate::str::contains("non-interactive").not());
}

#[test]
fn invalid_config_is_reported() {
  let project = TestProject::cyclone5();
  std::fs::write(project.generator_dir.join("socgen.toml"), "[bootloader]\njobs = 4\n").unwrap();

  project
    .socgen_cmd()
    .arg("bootloader")
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid config file"));
}
