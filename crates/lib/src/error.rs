//! Error kinds surfaced by the pipeline.
//!
//! Every stage validates its own postconditions and returns one of these
//! instead of continuing past a missing file. The orchestrator stops at the
//! first error; nothing is retried automatically.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::bootloader::Stage;
use crate::fetch::FetchError;
use crate::profile::ProfileError;

/// Coarse classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  ProfileResolution,
  Acquisition,
  ToolInvocation,
  ArtifactVerification,
  AmbiguousConfiguration,
  UnsupportedCombination,
  Io,
  Aborted,
}

/// Why an expected artifact was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
  Missing,
  Stale { age: Duration, max_age: Duration },
}

impl fmt::Display for VerifyFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VerifyFailure::Missing => write!(f, "missing"),
      VerifyFailure::Stale { age, max_age } => write!(
        f,
        "stale: {} old, limit {}",
        humantime::format_duration(Duration::from_secs(age.as_secs())),
        humantime::format_duration(*max_age)
      ),
    }
  }
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Profile(#[from] ProfileError),

  #[error("failed to acquire bootloader sources: {0}")]
  Acquisition(#[from] FetchError),

  #[error("failed to start {tool}: {source}")]
  ToolInvocation {
    tool: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{what} is {reason}: {}\n  inspect: {hint}", path.display())]
  ArtifactVerification {
    what: String,
    path: PathBuf,
    reason: VerifyFailure,
    hint: String,
  },

  #[error(
    "boot script {} references more than one configuration file ({}); remove all but one reference",
    script.display(),
    candidates.join(", ")
  )]
  AmbiguousConfiguration { script: PathBuf, candidates: Vec<String> },

  #[error("unsupported: {0}")]
  UnsupportedCombination(String),

  #[error("io error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("aborted by operator at {0}")]
  Aborted(Stage),

  #[error("pipeline already stopped at {0}; start a new run")]
  Halted(Stage),
}

impl BuildError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      BuildError::Profile(_) => ErrorKind::ProfileResolution,
      BuildError::Acquisition(_) => ErrorKind::Acquisition,
      BuildError::ToolInvocation { .. } => ErrorKind::ToolInvocation,
      BuildError::ArtifactVerification { .. } => ErrorKind::ArtifactVerification,
      BuildError::AmbiguousConfiguration { .. } => ErrorKind::AmbiguousConfiguration,
      BuildError::UnsupportedCombination(_) => ErrorKind::UnsupportedCombination,
      BuildError::Io { .. } => ErrorKind::Io,
      BuildError::Aborted(_) | BuildError::Halted(_) => ErrorKind::Aborted,
    }
  }

  /// Unsupported combinations are reported and skipped; everything else ends the run.
  pub fn is_fatal(&self) -> bool {
    self.kind() != ErrorKind::UnsupportedCombination
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    BuildError::Io {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn missing(what: impl Into<String>, path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
    BuildError::ArtifactVerification {
      what: what.into(),
      path: path.into(),
      reason: VerifyFailure::Missing,
      hint: hint.into(),
    }
  }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unsupported_combination_is_not_fatal() {
    let err = BuildError::UnsupportedCombination("host write".into());
    assert_eq!(err.kind(), ErrorKind::UnsupportedCombination);
    assert!(!err.is_fatal());
  }

  #[test]
  fn verification_error_names_path_and_hint() {
    let err = BuildError::missing("bootloader image", "/p/u-boot.img", "the make output in /p");
    let msg = err.to_string();
    assert!(msg.contains("/p/u-boot.img"));
    assert!(msg.contains("missing"));
    assert!(msg.contains("inspect: the make output in /p"));
    assert!(err.is_fatal());
  }

  #[test]
  fn stale_reason_formats_both_durations() {
    let reason = VerifyFailure::Stale {
      age: Duration::from_secs(360),
      max_age: Duration::from_secs(300),
    };
    assert_eq!(reason.to_string(), "stale: 6m old, limit 5m");
  }

  #[test]
  fn ambiguous_lists_candidates() {
    let err = BuildError::AmbiguousConfiguration {
      script: PathBuf::from("boot.script"),
      candidates: vec!["a.rbf".into(), "b.rbf".into()],
    };
    assert_eq!(err.kind(), ErrorKind::AmbiguousConfiguration);
    assert!(err.to_string().contains("a.rbf, b.rbf"));
  }
}
