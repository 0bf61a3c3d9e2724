//! Boot-script reference scanner.
//!
//! Finds the configuration file a staged boot script loads, which decides
//! whether a configuration artifact has to be produced and under which name.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{BuildError, Result};
use crate::profile::ConfigFormat;

/// A configuration file name found in a boot script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootScriptReference {
  pub filename: String,
  /// Byte offset of the token in the script.
  pub offset: usize,
}

/// Name of the configuration artifact to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigName {
  pub format: ConfigFormat,
  /// File name including the format suffix, e.g. `socfpga.rbf` or `socfpga.itb`.
  pub file_name: String,
}

impl ConfigName {
  pub fn new(format: ConfigFormat, file_name: impl Into<String>) -> Self {
    Self {
      format,
      file_name: file_name.into(),
    }
  }

  /// File name with the format suffix stripped.
  pub fn body(&self) -> &str {
    self
      .file_name
      .strip_suffix(self.format.suffix())
      .unwrap_or(&self.file_name)
  }

  pub fn periph_region(&self) -> String {
    format!("{}.periph.rbf", self.body())
  }

  pub fn core_region(&self) -> String {
    format!("{}.core.rbf", self.body())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDecision {
  /// Nothing references a configuration file and none is staged.
  NoAction,
  /// Generate (or copy) the configuration under this name.
  Generate(ConfigName),
}

/// Every non-comment token in `content` that ends in `suffix`.
pub fn find_references(content: &str, suffix: &str) -> Vec<BootScriptReference> {
  let mut refs = Vec::new();
  let mut line_start = 0;

  for line in content.split_inclusive('\n') {
    let offset = line_start;
    line_start += line.len();
    let line = strip_comment(line);

    for (pos, _) in line.match_indices(suffix) {
      let end = pos + suffix.len();
      if line[end..].chars().next().is_some_and(is_name_char) {
        continue;
      }
      let start = line[..pos]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace() || *c == '"' || *c == '\'')
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
      if start == pos {
        continue;
      }
      refs.push(BootScriptReference {
        filename: line[start..end].to_string(),
        offset: offset + start,
      });
    }
  }
  refs
}

/// The part of `line` before a `#` that starts a word.
fn strip_comment(line: &str) -> &str {
  let mut prev = None;
  for (i, c) in line.char_indices() {
    if c == '#' && prev.is_none_or(char::is_whitespace) {
      return &line[..i];
    }
    prev = Some(c);
  }
  line
}

fn is_name_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Decide what the configuration generator has to do.
///
/// `script` is the staged boot script (a missing script references
/// nothing); `staged_dir` is where an existing configuration artifact would
/// sit.
pub fn scan(script: &Path, format: ConfigFormat, staged_dir: &Path) -> Result<ScanDecision> {
  let content = match fs::read_to_string(script) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      debug!(path = %script.display(), "no boot script staged");
      String::new()
    }
    Err(e) => return Err(BuildError::io(script, e)),
  };

  let refs = find_references(&content, format.suffix());
  let names = distinct(refs.iter().map(|r| file_name(&r.filename)));

  if let Some(first) = names.first().cloned() {
    if names.len() > 1 {
      if format == ConfigFormat::Monolithic {
        return Err(BuildError::AmbiguousConfiguration {
          script: script.to_path_buf(),
          candidates: names,
        });
      }
      warn!(used = %first, ignored = names.len() - 1, "boot script references several containers");
    }
    debug!(name = %first, "boot script reference found");
    return Ok(ScanDecision::Generate(ConfigName::new(format, first)));
  }

  let existing = staged_artifacts(staged_dir, format.suffix())?;
  match existing.as_slice() {
    [] => Ok(ScanDecision::NoAction),
    [only] => {
      debug!(name = %only, "regenerating staged configuration");
      Ok(ScanDecision::Generate(ConfigName::new(format, only.clone())))
    }
    _ => Err(BuildError::AmbiguousConfiguration {
      script: script.to_path_buf(),
      candidates: existing,
    }),
  }
}

fn file_name(token: &str) -> String {
  token.rsplit('/').next().unwrap_or(token).to_string()
}

fn distinct(names: impl Iterator<Item = String>) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for name in names {
    if !out.contains(&name) {
      out.push(name);
    }
  }
  out
}

fn staged_artifacts(dir: &Path, suffix: &str) -> Result<Vec<String>> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(BuildError::io(dir, e)),
  };

  let mut names = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|e| BuildError::io(dir, e))?;
    let name = entry.file_name().to_string_lossy().into_owned();
    if name.ends_with(suffix) && entry.path().is_file() {
      names.push(name);
    }
  }
  names.sort();
  Ok(names)
}
