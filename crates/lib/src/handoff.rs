//! Quartus project discovery and hand-off metadata.
//!
//! The hand-off folder written by the hardware-design tooling describes the
//! HPS configuration. Only a handful of flat `<config name=".." value=".."/>`
//! entries are consumed here, so the document is read as a key/value list
//! rather than as a general XML tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::profile::{DeviceProfile, ProfileError, resolve_with_capabilities};

pub const HPS_XML: &str = "hps.xml";
pub const DEVICE_FAMILY_KEY: &str = "DEVICE_FAMILY";
const EARLY_IO_ASSIGNMENT: &str = "HPS_EARLY_IO_RELEASE";

#[derive(Debug, Error)]
pub enum HandoffError {
  #[error("no Quartus project (.qpf and .qsys) found in {}", .0.display())]
  NoQuartusProject(PathBuf),

  #[error("no *_handoff folder found in {}", .0.display())]
  NoHandoffFolder(PathBuf),

  #[error("more than one folder inside {}: {}; delete all but one", dir.display(), found.join(", "))]
  MultipleHandoffFolders { dir: PathBuf, found: Vec<String> },

  #[error("hand-off file not found: {}", .0.display())]
  MissingHpsXml(PathBuf),

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Paths of the Quartus project the generator works on.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
  pub project_dir: PathBuf,
  pub qpf: PathBuf,
  pub qsf: Option<PathBuf>,
  pub handoff_dir: PathBuf,
  /// Compiled design (`output_files/*.sof`), if Quartus has produced one.
  pub sof: Option<PathBuf>,
}

impl ProjectLayout {
  pub fn discover(project_dir: &Path) -> Result<Self, HandoffError> {
    let entries = sorted_entries(project_dir)?;

    let qpf = entries
      .iter()
      .find(|p| has_extension(p, "qpf"))
      .cloned()
      .ok_or_else(|| HandoffError::NoQuartusProject(project_dir.to_path_buf()))?;
    if !entries.iter().any(|p| has_extension(p, "qsys")) {
      return Err(HandoffError::NoQuartusProject(project_dir.to_path_buf()));
    }

    let qsf = qpf.with_extension("qsf");
    let qsf = qsf.is_file().then_some(qsf);

    let handoff_root = entries
      .iter()
      .find(|p| p.is_dir() && file_name(p).contains("_handoff"))
      .ok_or_else(|| HandoffError::NoHandoffFolder(project_dir.to_path_buf()))?;

    let subdirs: Vec<PathBuf> = sorted_entries(handoff_root)?.into_iter().filter(|p| p.is_dir()).collect();
    let handoff_dir = match subdirs.as_slice() {
      [single] => single.clone(),
      [] => return Err(HandoffError::NoHandoffFolder(handoff_root.clone())),
      many => {
        return Err(HandoffError::MultipleHandoffFolders {
          dir: handoff_root.clone(),
          found: many.iter().map(|p| file_name(p).to_string()).collect(),
        });
      }
    };

    let output_files = project_dir.join("output_files");
    let sof = if output_files.is_dir() {
      sorted_entries(&output_files)?.into_iter().find(|p| has_extension(p, "sof"))
    } else {
      None
    };

    debug!(project = %project_dir.display(), handoff = %handoff_dir.display(), "discovered Quartus project");

    Ok(Self {
      project_dir: project_dir.to_path_buf(),
      qpf,
      qsf,
      handoff_dir,
      sof,
    })
  }

  /// Project name as Quartus uses it for output files.
  pub fn project_name(&self) -> &str {
    self.qpf.file_stem().and_then(|s| s.to_str()).unwrap_or("socfpga")
  }
}

/// Key/value view of the hand-off metadata plus capability flags from the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffMetadata {
  entries: BTreeMap<String, String>,
  early_io_release: bool,
}

impl HandoffMetadata {
  pub fn new(entries: BTreeMap<String, String>, early_io_release: bool) -> Self {
    Self {
      entries,
      early_io_release,
    }
  }

  pub fn load(layout: &ProjectLayout) -> Result<Self, HandoffError> {
    let hps_xml = layout.handoff_dir.join(HPS_XML);
    if !hps_xml.is_file() {
      return Err(HandoffError::MissingHpsXml(hps_xml));
    }
    let content = read(&hps_xml)?;
    let entries = parse_config_entries(&content);

    let early_io_release = match &layout.qsf {
      Some(qsf) => qsf_enables_early_io(&read(qsf)?),
      None => false,
    };

    Ok(Self::new(entries, early_io_release))
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.entries.get(key).map(String::as_str)
  }

  pub fn device_family(&self) -> Option<&str> {
    self.get(DEVICE_FAMILY_KEY).filter(|v| !v.is_empty())
  }

  pub fn early_io_release(&self) -> bool {
    self.early_io_release
  }

  pub fn resolve_profile(&self) -> Result<&'static DeviceProfile, ProfileError> {
    let family = self.device_family().ok_or(ProfileError::MissingFamily)?;
    resolve_with_capabilities(family, self.early_io_release)
  }
}

/// Collect `name`/`value` attribute pairs of every `<config .../>` element.
pub fn parse_config_entries(content: &str) -> BTreeMap<String, String> {
  let mut entries = BTreeMap::new();
  let mut rest = content;

  while let Some(start) = rest.find("<config") {
    let tag_rest = &rest[start + "<config".len()..];
    let end = tag_rest.find('>').unwrap_or(tag_rest.len());
    let tag = &tag_rest[..end];
    if tag.starts_with(char::is_whitespace)
      && let (Some(name), Some(value)) = (attribute(tag, "name"), attribute(tag, "value"))
    {
      entries.entry(name.to_string()).or_insert_with(|| value.to_string());
    }
    rest = &tag_rest[end..];
  }

  entries
}

fn attribute<'a>(tag: &'a str, key: &str) -> Option<&'a str> {
  let needle = format!("{key}=\"");
  let mut search = tag;
  while let Some(pos) = search.find(&needle) {
    let preceded_by_space = search[..pos].chars().last().is_some_and(char::is_whitespace);
    let after = &search[pos + needle.len()..];
    if preceded_by_space {
      return after.find('"').map(|end| &after[..end]);
    }
    search = after;
  }
  None
}

/// True when the settings file assigns `HPS_EARLY_IO_RELEASE ON`.
pub fn qsf_enables_early_io(content: &str) -> bool {
  content.lines().map(str::trim).filter(|l| !l.starts_with('#')).any(|line| {
    let mut words = line.split_whitespace();
    words.next() == Some("set_global_assignment")
      && line.contains(EARLY_IO_ASSIGNMENT)
      && words.last().is_some_and(|v| v.eq_ignore_ascii_case("on"))
  })
}

fn read(path: &Path) -> Result<String, HandoffError> {
  fs::read_to_string(path).map_err(|source| HandoffError::Read {
    path: path.to_path_buf(),
    source,
  })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, HandoffError> {
  let read_dir = fs::read_dir(dir).map_err(|source| HandoffError::Read {
    path: dir.to_path_buf(),
    source,
  })?;
  let mut entries: Vec<PathBuf> = read_dir.flatten().map(|e| e.path()).collect();
  entries.sort();
  Ok(entries)
}

fn has_extension(path: &Path, ext: &str) -> bool {
  path.is_file() && path.extension().is_some_and(|e| e == ext)
}

fn file_name(path: &Path) -> &str {
  path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::DeviceFamily;
  use tempfile::TempDir;

  const HPS_XML_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hps>
  <system>
    <config name="DEVICE_FAMILY" value="Cyclone V" />
    <config name="dbctrl_stayosc1" value="true" />
  </system>
  <configuration name="ignored" value="x" />
</hps>
"#;

  fn quartus_project(root: &Path, handoff_subdirs: &[&str]) {
    fs::write(root.join("ghrd.qpf"), "").unwrap();
    fs::write(root.join("soc_system.qsys"), "").unwrap();
    for sub in handoff_subdirs {
      let dir = root.join("hps_isw_handoff").join(sub);
      fs::create_dir_all(&dir).unwrap();
      fs::write(dir.join(HPS_XML), HPS_XML_CONTENT).unwrap();
    }
  }

  #[test]
  fn parses_config_entries_only() {
    let entries = parse_config_entries(HPS_XML_CONTENT);
    assert_eq!(entries.get("DEVICE_FAMILY").map(String::as_str), Some("Cyclone V"));
    assert_eq!(entries.get("dbctrl_stayosc1").map(String::as_str), Some("true"));
    assert!(!entries.contains_key("ignored"));
  }

  #[test]
  fn attribute_requires_word_boundary() {
    let tag = r#" myname="a" name="b" value="c""#;
    assert_eq!(attribute(tag, "name"), Some("b"));
    assert_eq!(attribute(tag, "value"), Some("c"));
    assert_eq!(attribute(tag, "missing"), None);
  }

  #[test]
  fn early_io_assignment_detected() {
    let qsf = "# set_global_assignment -name HPS_EARLY_IO_RELEASE ON\n\
               set_global_assignment -name FAMILY \"Arria 10\"\n";
    assert!(!qsf_enables_early_io(qsf));

    let qsf = "set_global_assignment -name HPS_EARLY_IO_RELEASE ON\n";
    assert!(qsf_enables_early_io(qsf));

    let qsf = "set_global_assignment -name HPS_EARLY_IO_RELEASE OFF\n";
    assert!(!qsf_enables_early_io(qsf));
  }

  #[test]
  fn discovers_project_and_resolves_profile() {
    let temp = TempDir::new().unwrap();
    quartus_project(temp.path(), &["soc_system_hps_0"]);
    fs::create_dir(temp.path().join("output_files")).unwrap();
    fs::write(temp.path().join("output_files/ghrd.sof"), "").unwrap();

    let layout = ProjectLayout::discover(temp.path()).unwrap();
    assert_eq!(layout.project_name(), "ghrd");
    assert!(layout.handoff_dir.ends_with("hps_isw_handoff/soc_system_hps_0"));
    assert_eq!(layout.sof, Some(temp.path().join("output_files/ghrd.sof")));

    let metadata = HandoffMetadata::load(&layout).unwrap();
    assert_eq!(metadata.resolve_profile().unwrap().family, DeviceFamily::Cyclone5);
  }

  #[test]
  fn multiple_handoff_folders_rejected() {
    let temp = TempDir::new().unwrap();
    quartus_project(temp.path(), &["a", "b"]);

    let err = ProjectLayout::discover(temp.path()).unwrap_err();
    assert!(matches!(err, HandoffError::MultipleHandoffFolders { ref found, .. } if found.len() == 2));
  }

  #[test]
  fn missing_project_files_rejected() {
    let temp = TempDir::new().unwrap();
    let err = ProjectLayout::discover(temp.path()).unwrap_err();
    assert!(matches!(err, HandoffError::NoQuartusProject(_)));
  }

  #[test]
  fn missing_family_is_reported() {
    let metadata = HandoffMetadata::new(BTreeMap::new(), false);
    assert_eq!(metadata.resolve_profile(), Err(ProfileError::MissingFamily));
  }
}
