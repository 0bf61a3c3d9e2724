//! Git acquisition of the bootloader sources.
//!
//! A fresh checkout is cloned at the pinned branch. An existing checkout is
//! updated like `git pull --ff-only`: fetch, then fast-forward the checked-out
//! branch and its working tree. Local edits or a diverged branch stop the sync.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use gix::bstr::{BString, ByteSlice};
use gix::refs::Target;
use gix::refs::transaction::PreviousValue;
use gix::remote::Direction;
use tracing::{debug, info};

use super::{FetchError, SourceFetcher};

/// Reflog identity used when the host has no git committer configured.
const COMMITTER_FALLBACK: [&str; 2] = [
  "gitoxide.committer.nameFallback=socgen",
  "gitoxide.committer.emailFallback=socgen@localhost",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct GitSource;

impl SourceFetcher for GitSource {
  fn sync(&self, dir: &Path) -> Result<(), FetchError> {
    debug!(path = %dir.display(), "opening existing repository");
    let options = gix::open::Options::default().config_overrides(COMMITTER_FALLBACK);
    let repo = gix::open_opts(dir, options).map_err(|e| FetchError::Open {
      path: dir.to_path_buf(),
      source: Box::new(e),
    })?;

    let branch = match repo.head_name().map_err(|e| update_err(dir, e))? {
      Some(name) => name.shorten().to_string(),
      None => return Err(FetchError::Detached(dir.to_path_buf())),
    };
    if repo.is_dirty().map_err(|e| update_err(dir, e))? {
      return Err(FetchError::LocalChanges(dir.to_path_buf()));
    }

    let remote = fetch_updates(&repo, dir)?;
    fast_forward(&repo, dir, &remote, &branch)
  }

  fn fetch(&self, url: &str, branch: &str, dir: &Path) -> Result<(), FetchError> {
    if let Some(parent) = dir.parent()
      && !parent.exists()
    {
      fs::create_dir_all(parent).map_err(|e| FetchError::CreateDir(parent.to_path_buf(), e))?;
    }

    info!(url, branch, path = %dir.display(), "cloning repository");
    clone_repo(url, branch, dir)?;
    Ok(())
  }
}

fn update_err(dir: &Path, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> FetchError {
  FetchError::Update {
    path: dir.to_path_buf(),
    source: source.into(),
  }
}

/// Clone a git repository at `branch` to the specified path.
fn clone_repo(url: &str, branch: &str, dest: &Path) -> Result<gix::Repository, FetchError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| FetchError::Clone {
    url: url.to_string(),
    source: e,
  };

  let mut prepared = gix::prepare_clone(url, dest)
    .map_err(|e| clone_err(Box::new(e)))?
    .with_ref_name(Some(branch))
    .map_err(|e| clone_err(Box::new(e)))?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  Ok(repo)
}

/// Fetch updates from the default remote, returning the remote's name.
fn fetch_updates(repo: &gix::Repository, dir: &Path) -> Result<String, FetchError> {
  let remote = repo
    .find_default_remote(Direction::Fetch)
    .ok_or_else(|| FetchError::NoRemote(dir.to_path_buf()))?
    .map_err(|e| FetchError::Connect {
      url: dir.display().to_string(),
      source: Box::new(e),
    })?;

  let name = remote
    .name()
    .map(|n| n.as_bstr().to_string())
    .unwrap_or_else(|| "origin".to_string());
  let url = remote
    .url(Direction::Fetch)
    .map(|u| u.to_bstring().to_string())
    .unwrap_or_else(|| dir.display().to_string());
  debug!(url = %url, "fetching updates");

  let connection = remote.connect(Direction::Fetch).map_err(|e| FetchError::Connect {
    url: url.clone(),
    source: Box::new(e),
  })?;

  connection
    .prepare_fetch(gix::progress::Discard, Default::default())
    .map_err(|e| FetchError::Fetch {
      url: url.clone(),
      source: Box::new(e),
    })?
    .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Fetch {
      url: url.clone(),
      source: Box::new(e),
    })?;

  Ok(name)
}

/// Move `branch` and the working tree forward to `<remote>/<branch>`.
fn fast_forward(repo: &gix::Repository, dir: &Path, remote: &str, branch: &str) -> Result<(), FetchError> {
  let upstream = repo
    .find_reference(format!("refs/remotes/{remote}/{branch}").as_str())
    .map_err(|e| update_err(dir, e))?
    .peel_to_id()
    .map_err(|e| update_err(dir, e))?
    .detach();
  let head = repo.head_id().map_err(|e| update_err(dir, e))?.detach();

  if head == upstream {
    info!(branch, "bootloader sources up to date with remote");
    return Ok(());
  }
  let base = repo.merge_base(head, upstream).map_err(|_| FetchError::Diverged {
    path: dir.to_path_buf(),
    branch: branch.to_string(),
  })?;
  if base.detach() != head {
    return Err(FetchError::Diverged {
      path: dir.to_path_buf(),
      branch: branch.to_string(),
    });
  }

  checkout_tree(repo, dir, upstream)?;
  repo
    .reference(
      format!("refs/heads/{branch}"),
      upstream,
      PreviousValue::MustExistAndMatch(Target::Object(head)),
      format!("pull: fast-forward to {upstream}"),
    )
    .map_err(|e| update_err(dir, e))?;

  info!(branch, from = %head, to = %upstream, "fast-forwarded bootloader sources");
  Ok(())
}

/// Write the tree of `commit` over the working tree and index.
///
/// Files tracked before but absent from the new tree are removed.
fn checkout_tree(repo: &gix::Repository, dir: &Path, commit: gix::ObjectId) -> Result<(), FetchError> {
  let workdir = repo
    .workdir()
    .ok_or_else(|| update_err(dir, "repository has no working tree"))?;
  let tree = repo
    .find_commit(commit)
    .map_err(|e| update_err(dir, e))?
    .tree_id()
    .map_err(|e| update_err(dir, e))?
    .detach();

  let previous = repo.index_or_empty().map_err(|e| update_err(dir, e))?;
  let previous_paths: BTreeSet<BString> = previous
    .entries()
    .iter()
    .map(|entry| entry.path(&previous).to_owned())
    .collect();

  let mut index = repo.index_from_tree(&tree).map_err(|e| update_err(dir, e))?;
  let mut options = repo
    .checkout_options(gix::worktree::stack::state::attributes::Source::IdMapping)
    .map_err(|e| update_err(dir, e))?;
  options.overwrite_existing = true;
  let objects = repo.objects.clone().into_arc().map_err(|e| update_err(dir, e))?;

  gix::worktree::state::checkout(
    &mut index,
    workdir,
    objects,
    &gix::progress::Discard,
    &gix::progress::Discard,
    &gix::interrupt::IS_INTERRUPTED,
    options,
  )
  .map_err(|e| update_err(dir, e))?;

  for path in &previous_paths {
    if index.entry_by_path(path.as_bstr()).is_some() {
      continue;
    }
    let file = workdir.join(gix::path::from_bstr(path.as_bstr()));
    match fs::remove_file(&file) {
      Ok(()) => debug!(path = %file.display(), "removed file deleted upstream"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(update_err(dir, e)),
    }
  }

  index.write(Default::default()).map_err(|e| update_err(dir, e))?;
  Ok(())
}
