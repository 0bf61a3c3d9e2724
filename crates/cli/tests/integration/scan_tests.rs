//! Scan command integration tests.

use predicates::prelude::*;

use super::common::TestProject;

#[test]
fn scan_reports_referenced_configuration() {
  let project = TestProject::cyclone5();
  project.write_boot_script("fatload mmc 0:1 ${loadaddr} socfpga.rbf;\nfpga load 0 ${loadaddr} ${filesize}\n");

  project
    .socgen_cmd()
    .arg("scan")
    .assert()
    .success()
    .stdout(predicate::str::contains("socfpga.rbf (offset"))
    .stdout(predicate::str::contains("Would generate socfpga.rbf"));
}

#[test]
fn scan_creates_partition_folders() {
  let project = TestProject::cyclone5();

  project
    .socgen_cmd()
    .arg("scan")
    .assert()
    .success()
    .stdout(predicate::str::contains("No FPGA configuration needed"));

  assert!(project.fat_dir().is_dir());
  assert!(project.raw_dir().is_dir());
  assert!(project.generator_dir.join("Image_partitions/Pat_2_ext3").is_dir());
}

#[test]
fn scan_rejects_two_monolithic_references() {
  let project = TestProject::cyclone5();
  project.write_boot_script("fatload mmc 0:1 $a one.rbf\nfatload mmc 0:1 $a two.rbf\n");

  project
    .socgen_cmd()
    .arg("scan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("more than one configuration file"))
    .stderr(predicate::str::contains("one.rbf, two.rbf"));
}

#[test]
fn scan_uses_container_suffix_for_early_io_devices() {
  let project = TestProject::arria10();
  project.write_boot_script("load mmc 0:1 ${loadaddr} ghrd.itb\nfpga loadmk 0 ${loadaddr}:fpga-periph-1\n");

  project
    .socgen_cmd()
    .arg("scan")
    .assert()
    .success()
    .stdout(predicate::str::contains("composite (.itb)"))
    .stdout(predicate::str::contains("Would generate ghrd.itb"));
}

#[test]
fn early_io_device_without_capability_is_rejected() {
  let project = TestProject::new("Arria 10", false);

  project
    .socgen_cmd()
    .arg("scan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to select a device profile"))
    .stderr(predicate::str::contains("early I/O release"));
}

#[test]
fn unknown_family_is_rejected() {
  let project = TestProject::new("Stratix 10", false);

  project
    .socgen_cmd()
    .arg("scan")
    .assert()
    .failure()
    .stderr(predicate::str::contains("'Stratix 10' is not supported"));
}
