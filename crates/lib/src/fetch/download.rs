//! Toolchain archive download.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::FetchError;

/// Download `url` into `dest_dir` unless an acceptable copy is already there.
///
/// When `expected_sha256` is given the archive must hash to it; a cached file
/// with a different hash is downloaded again.
pub async fn download_archive(
  url: &str,
  expected_sha256: Option<&str>,
  dest_dir: &Path,
) -> Result<PathBuf, FetchError> {
  fs::create_dir_all(dest_dir)
    .await
    .map_err(|e| FetchError::CreateDir(dest_dir.to_path_buf(), e))?;

  let dest_path = dest_dir.join(url_to_filename(url));

  if dest_path.exists() {
    match expected_sha256 {
      None => {
        info!(path = %dest_path.display(), "using cached archive");
        return Ok(dest_path);
      }
      Some(expected) => {
        let actual = hash_file(&dest_path).await?;
        if actual == expected {
          info!(path = %dest_path.display(), "using cached archive");
          return Ok(dest_path);
        }
        debug!(expected, actual = %actual, "cached archive hash mismatch, re-downloading");
      }
    }
  }

  info!(url, "downloading toolchain archive");
  let download_err = |message: String| FetchError::Download {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| download_err(e.to_string()))?;
  if !response.status().is_success() {
    return Err(download_err(format!("HTTP {}", response.status())));
  }
  let bytes = response.bytes().await.map_err(|e| download_err(e.to_string()))?;

  if let Some(expected) = expected_sha256 {
    let actual = hex::encode(Sha256::digest(&bytes));
    if actual != expected {
      return Err(FetchError::HashMismatch {
        url: url.to_string(),
        expected: expected.to_string(),
        actual,
      });
    }
  }

  let mut file = fs::File::create(&dest_path).await?;
  file.write_all(&bytes).await?;
  file.flush().await?;

  info!(path = %dest_path.display(), size = bytes.len(), "download complete");
  Ok(dest_path)
}

async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
  let bytes = fs::read(path).await?;
  Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Last path component of the URL, sanitized for use as a file name.
pub fn url_to_filename(url: &str) -> String {
  let last = url.rsplit('/').next().unwrap_or_default();
  let last = last.split('?').next().unwrap_or(last);

  let sanitized: String = last
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '_'
      }
    })
    .collect();

  if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
    return sanitized;
  }

  format!("download_{}", &hex::encode(Sha256::digest(url.as_bytes()))[..16])
}
