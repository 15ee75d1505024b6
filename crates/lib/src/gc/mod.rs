//! Store garbage collection.
//!
//! Install prefixes are live when their fingerprint belongs to the current
//! project's graph and they carry a completion marker. Everything else under
//! `i/`, and every leftover build directory under `b/`, is removed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprints;
use crate::store::{Store, read_marker};
use crate::util::fs::dir_size;

#[derive(Debug, Error)]
pub enum GcError {
  #[error("failed to read store directory {}: {source}", .path.display())]
  ReadStore {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default, Serialize)]
pub struct GcStats {
  pub installs_scanned: usize,
  pub installs_deleted: usize,
  pub installs_bytes_freed: u64,
  pub builds_deleted: usize,
  pub builds_bytes_freed: u64,
}

impl GcStats {
  pub fn total_deleted(&self) -> usize {
    self.installs_deleted + self.builds_deleted
  }

  pub fn total_bytes_freed(&self) -> u64 {
    self.installs_bytes_freed + self.builds_bytes_freed
  }
}

#[derive(Debug, Serialize)]
pub struct GcResult {
  pub stats: GcStats,
  pub deleted_paths: Vec<PathBuf>,
}

/// Remove everything in `store` not needed by a graph with `live` fingerprints.
///
/// With `dry_run` nothing is deleted; the result lists what would be.
pub fn collect_garbage(store: &Store, live: &Fingerprints, dry_run: bool) -> Result<GcResult, GcError> {
  let live: HashSet<&str> = live.iter().map(|(_, fp)| fp.as_str()).collect();
  debug!(count = live.len(), "live fingerprints");

  let mut stats = GcStats::default();
  let mut deleted_paths = Vec::new();

  for path in subdirs(&store.installs_dir())? {
    stats.installs_scanned += 1;

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
      continue;
    };
    let is_live = live.contains(name);
    let is_complete = matches!(read_marker(&path), Ok(Some(_)));
    if is_live && is_complete {
      continue;
    }

    if is_complete {
      debug!(path = %path.display(), "removing unreferenced install");
    } else {
      debug!(path = %path.display(), "removing incomplete install");
    }

    if let Some(size) = remove(&path, dry_run) {
      stats.installs_deleted += 1;
      stats.installs_bytes_freed += size;
      deleted_paths.push(path);
    }
  }

  for path in subdirs(&store.builds_dir())? {
    debug!(path = %path.display(), "removing leftover build directory");
    if let Some(size) = remove(&path, dry_run) {
      stats.builds_deleted += 1;
      stats.builds_bytes_freed += size;
      deleted_paths.push(path);
    }
  }

  info!(
    installs_deleted = stats.installs_deleted,
    builds_deleted = stats.builds_deleted,
    bytes_freed = stats.total_bytes_freed(),
    dry_run,
    "garbage collection complete"
  );

  Ok(GcResult { stats, deleted_paths })
}

/// Subdirectories of `dir`, sorted. A missing `dir` has none.
fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, GcError> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(source) => {
      return Err(GcError::ReadStore {
        path: dir.to_path_buf(),
        source,
      });
    }
  };

  let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()).collect();
  dirs.sort();
  Ok(dirs)
}

/// Delete `path`, returning the bytes freed, or `None` if deletion failed.
fn remove(path: &Path, dry_run: bool) -> Option<u64> {
  let size = dir_size(path);
  if dry_run {
    return Some(size);
  }

  match fs::remove_dir_all(path) {
    Ok(()) => Some(size),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "failed to delete");
      None
    }
  }
}
