//! In-memory build records.
//!
//! One [`Slot`] exists per fingerprint scheduled in this process. Status
//! changes go through a mutex, while the install path of a finished build is
//! published through a `OnceLock` so readers never wait on a running build.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::Serialize;
use tracing::trace;

use crate::graph::PackageId;
use crate::util::hash::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
  Pending,
  Queued,
  Building,
  Built,
  Failed,
}

impl BuildStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      BuildStatus::Pending => "pending",
      BuildStatus::Queued => "queued",
      BuildStatus::Building => "building",
      BuildStatus::Built => "built",
      BuildStatus::Failed => "failed",
    }
  }

  /// Allowed transitions. A failed record may be queued again by a later
  /// schedule in the same process; a built record is final.
  pub fn can_become(self, next: BuildStatus) -> bool {
    use BuildStatus::*;
    matches!(
      (self, next),
      (Pending, Queued)
        | (Pending, Failed)
        | (Queued, Building)
        | (Queued, Built)
        | (Queued, Failed)
        | (Building, Built)
        | (Building, Failed)
        | (Failed, Queued)
    )
  }
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRecord {
  pub package: PackageId,
  pub fingerprint: Fingerprint,
  pub status: BuildStatus,
  pub install_path: PathBuf,
}

#[derive(Debug)]
pub struct Slot {
  state: Mutex<BuildRecord>,
  built: OnceLock<PathBuf>,
  build_lock: tokio::sync::Mutex<()>,
}

impl Slot {
  fn new(record: BuildRecord) -> Self {
    Self {
      state: Mutex::new(record),
      built: OnceLock::new(),
      build_lock: tokio::sync::Mutex::new(()),
    }
  }

  fn state(&self) -> MutexGuard<'_, BuildRecord> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn record(&self) -> BuildRecord {
    self.state().clone()
  }

  pub fn status(&self) -> BuildStatus {
    self.state().status
  }

  /// Install path of a finished build, without locking.
  pub fn built(&self) -> Option<&Path> {
    self.built.get().map(PathBuf::as_path)
  }

  /// Move the record to `next`. Returns false, leaving the record unchanged,
  /// when the transition is not allowed.
  pub fn transition(&self, next: BuildStatus) -> bool {
    let mut state = self.state();
    if state.status == next {
      return true;
    }
    if !state.status.can_become(next) {
      trace!(package = %state.package, from = %state.status, to = %next, "rejected status change");
      return false;
    }

    trace!(package = %state.package, from = %state.status, to = %next, "status change");
    state.status = next;
    if next == BuildStatus::Built {
      let _ = self.built.set(state.install_path.clone());
    }
    true
  }

  /// Serializes builds of this fingerprint within the process.
  pub async fn lock_build(&self) -> tokio::sync::MutexGuard<'_, ()> {
    self.build_lock.lock().await
  }
}

/// Build records keyed by fingerprint.
#[derive(Debug, Default)]
pub struct Records {
  slots: Mutex<HashMap<Fingerprint, Arc<Slot>>>,
}

impl Records {
  /// The slot for `fingerprint`, created as `pending` if it does not exist.
  pub fn entry(&self, package: &PackageId, fingerprint: &Fingerprint, install_path: &Path) -> Arc<Slot> {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    slots
      .entry(fingerprint.clone())
      .or_insert_with(|| {
        Arc::new(Slot::new(BuildRecord {
          package: package.clone(),
          fingerprint: fingerprint.clone(),
          status: BuildStatus::Pending,
          install_path: install_path.to_path_buf(),
        }))
      })
      .clone()
  }

  pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Slot>> {
    self
      .slots
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(fingerprint)
      .cloned()
  }

  /// All records, sorted by package id.
  pub fn snapshot(&self) -> Vec<BuildRecord> {
    let slots: Vec<Arc<Slot>> = self
      .slots
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();
    let mut records: Vec<BuildRecord> = slots.iter().map(|s| s.record()).collect();
    records.sort_by(|a, b| a.package.cmp(&b.package));
    records
  }
}
