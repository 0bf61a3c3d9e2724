//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

const HPS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hps>
  <system>
    <config name="DEVICE_FAMILY" value="{family}" />
  </system>
</hps>
"#;

/// Isolated Quartus project with a generator directory inside it.
///
/// Vendor tools are replaced by scripts in `<temp>/bin`, which is put in
/// front of `PATH`; the vendor shell is `/bin/sh`.
pub struct TestProject {
  pub temp: TempDir,
  pub generator_dir: PathBuf,
}

impl TestProject {
  pub fn new(family: &str, early_io: bool) -> Self {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let project = Self {
      generator_dir: root.join("project/socfpgaGenerator"),
      temp,
    };

    project.write_file("project/ghrd.qpf", "");
    project.write_file("project/soc_system.qsys", "");
    let qsf = if early_io {
      "set_global_assignment -name HPS_EARLY_IO_RELEASE ON\n"
    } else {
      "set_global_assignment -name TOP_LEVEL_ENTITY ghrd\n"
    };
    project.write_file("project/ghrd.qsf", qsf);
    project.write_file(
      "project/hps_isw_handoff/soc_system_hps_0/hps.xml",
      &HPS_XML.replace("{family}", family),
    );
    project.write_file("project/output_files/ghrd.sof", "sof");
    std::fs::create_dir_all(&project.generator_dir).unwrap();
    std::fs::create_dir_all(project.bin_dir()).unwrap();
    project
  }

  pub fn cyclone5() -> Self {
    Self::new("Cyclone V", false)
  }

  pub fn arria10() -> Self {
    Self::new("Arria 10", true)
  }

  pub fn project_dir(&self) -> PathBuf {
    self.temp.path().join("project")
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.temp.path().join("bin")
  }

  /// FAT partition folder of the default layout.
  pub fn fat_dir(&self) -> PathBuf {
    self.generator_dir.join("Image_partitions/Pat_1_vfat")
  }

  pub fn raw_dir(&self) -> PathBuf {
    self.generator_dir.join("Image_partitions/Pat_3_raw")
  }

  pub fn write_boot_script(&self, content: &str) {
    let path = self.fat_dir().join("boot.script");
    write(&path, content);
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    write(&self.temp.path().join(relative_path), content);
  }

  /// Install an executable shell script named `name` on the test `PATH`.
  #[cfg(unix)]
  pub fn fake_tool(&self, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = self.bin_dir().join(name);
    write(&path, &format!("#!/bin/sh\n{body}\n"));
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  }

  /// A socgen command pointed at this project with an isolated environment.
  pub fn socgen_cmd(&self) -> Command {
    let path = format!(
      "{}:{}",
      self.bin_dir().display(),
      std::env::var("PATH").unwrap_or_default()
    );
    let mut cmd = cargo_bin_cmd!("socgen");
    cmd
      .arg("-C")
      .arg(&self.generator_dir)
      .env("PATH", path)
      .env("SOCGEN_SHELL", "/bin/sh")
      .env("XDG_CONFIG_HOME", self.temp.path().join("config"))
      .env_remove("SOCGEN_CONFIG")
      .env_remove("SOCEDS_DEST_ROOT");
    cmd
  }
}

fn write(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}
