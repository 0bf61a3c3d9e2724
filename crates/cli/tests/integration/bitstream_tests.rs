//! Bitstream command integration tests.

use predicates::prelude::*;
use socgen_lib::lock::ProjectLock;

use super::common::TestProject;

const RBF_SCRIPT: &str = "fatload mmc 0:1 ${loadaddr} socfpga.rbf;\nfpga load 0 ${loadaddr} ${filesize}\n";

/// `quartus_cpf ... <output>` writes its last argument.
#[cfg(unix)]
const FAKE_CPF: &str = r#"for last; do :; done
printf '%s\n' "$*" > "$last""#;

#[test]
#[cfg(unix)]
fn bitstream_converts_design_into_fat_partition() {
  let project = TestProject::cyclone5();
  project.write_boot_script(RBF_SCRIPT);
  project.fake_tool("quartus_cpf", FAKE_CPF);

  project
    .socgen_cmd()
    .arg("bitstream")
    .assert()
    .success()
    .stdout(predicate::str::contains("Generated"));

  let rbf = project.fat_dir().join("socfpga.rbf");
  let args = std::fs::read_to_string(&rbf).unwrap();
  assert!(args.starts_with("-c -m FPPx16 "), "{args}");
  assert!(!project.project_dir().join("output_files/socfpga.rbf").exists());
}

#[test]
#[cfg(unix)]
fn host_write_uses_narrow_mode_and_ext_partition() {
  let project = TestProject::cyclone5();
  project.write_boot_script(RBF_SCRIPT);
  project.fake_tool("quartus_cpf", FAKE_CPF);

  project.socgen_cmd().args(["bitstream", "--host-write"]).assert().success();

  let ext = project.generator_dir.join("Image_partitions/Pat_2_ext3");
  let args = std::fs::read_to_string(ext.join("socfpga.rbf")).unwrap();
  assert!(args.starts_with("-c -m FPPx8 "), "{args}");
}

#[test]
#[cfg(unix)]
fn missing_tool_output_is_fatal() {
  let project = TestProject::cyclone5();
  project.write_boot_script(RBF_SCRIPT);
  project.fake_tool("quartus_cpf", "exit 0");

  project
    .socgen_cmd()
    .arg("bitstream")
    .assert()
    .failure()
    .stderr(predicate::str::contains("FPGA configuration is missing"));
}

#[test]
fn copy_places_supplied_file() {
  let project = TestProject::cyclone5();
  project.write_boot_script(RBF_SCRIPT);
  project.write_file("licensed.rbf", "licensed");

  project
    .socgen_cmd()
    .arg("bitstream")
    .arg("--copy")
    .arg(project.temp.path().join("licensed.rbf"))
    .assert()
    .success()
    .stdout(predicate::str::contains("Copied"));

  let staged = std::fs::read_to_string(project.fat_dir().join("socfpga.rbf")).unwrap();
  assert_eq!(staged, "licensed");
}

#[test]
fn time_limited_design_is_skipped_with_warning() {
  let project = TestProject::cyclone5();
  project.write_boot_script(RBF_SCRIPT);
  std::fs::remove_file(project.project_dir().join("output_files/ghrd.sof")).unwrap();
  project.write_file("project/output_files/ghrd_time_limited.sof", "sof");

  project
    .socgen_cmd()
    .arg("bitstream")
    .assert()
    .success()
    .stderr(predicate::str::contains("FPGA configuration skipped"))
    .stderr(predicate::str::contains("time-limited"));

  assert!(!project.fat_dir().join("socfpga.rbf").exists());
}

#[test]
fn host_write_for_container_device_is_skipped_with_warning() {
  let project = TestProject::arria10();
  project.write_boot_script("load mmc 0:1 ${loadaddr} ghrd.itb\n");

  project
    .socgen_cmd()
    .args(["bitstream", "--host-write"])
    .assert()
    .success()
    .stderr(predicate::str::contains("writing it from Linux is not supported"));
}

#[test]
#[cfg(unix)]
fn concurrent_run_is_refused() {
  let project = TestProject::cyclone5();
  project.write_boot_script(RBF_SCRIPT);
  let _held = ProjectLock::acquire(&project.project_dir(), "socgen build").unwrap();

  project
    .socgen_cmd()
    .arg("bitstream")
    .assert()
    .failure()
    .stderr(predicate::str::contains("project is in use"))
    .stderr(predicate::str::contains("socgen build"));
}
