//! The package store.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── .lock               # store-wide advisory lock
//! ├── i/<fingerprint>/    # install prefixes (bin lib share etc man doc)
//! │   └── .lodge-complete # written last, once the build succeeded
//! ├── b/<fingerprint>/    # build directories, removed after every build
//! └── s/<name>/           # package sources searched during resolution
//! ```
//!
//! A [`Store`] is created per invocation and passed by reference; the
//! in-memory [`Records`] it holds track what this process has scheduled.

mod lock;
mod marker;
mod records;

pub use lock::{LockMetadata, LockMode, StoreLock, StoreLockError};
pub use marker::{MARKER_VERSION, Marker, MarkerError, VerifyOutcome, read_marker, verify_install, write_marker};
pub use records::{BuildRecord, BuildStatus, Records, Slot};

use std::io;
use std::path::{Path, PathBuf};

use crate::util::hash::Fingerprint;

const INSTALLS_DIR: &str = "i";
const BUILDS_DIR: &str = "b";
const SOURCES_DIR: &str = "s";
const LOCK_FILENAME: &str = ".lock";

#[derive(Debug)]
pub struct Store {
  root: PathBuf,
  records: Records,
}

impl Store {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      records: Records::default(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn records(&self) -> &Records {
    &self.records
  }

  pub fn installs_dir(&self) -> PathBuf {
    self.root.join(INSTALLS_DIR)
  }

  pub fn builds_dir(&self) -> PathBuf {
    self.root.join(BUILDS_DIR)
  }

  pub fn sources_dir(&self) -> PathBuf {
    self.root.join(SOURCES_DIR)
  }

  pub fn lock_path(&self) -> PathBuf {
    self.root.join(LOCK_FILENAME)
  }

  /// Install prefix of the build with `fingerprint`.
  pub fn install_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
    self.installs_dir().join(fingerprint.as_str())
  }

  /// Build directory of the build with `fingerprint`.
  ///
  /// The path is derived from the fingerprint only, so the build
  /// environment of a package is the same on every run.
  pub fn build_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
    self.builds_dir().join(fingerprint.as_str())
  }

  pub fn layout(&self, fingerprint: &Fingerprint) -> InstallLayout {
    InstallLayout::new(self.install_dir(fingerprint))
  }

  /// Whether the install prefix of `fingerprint` carries a completion marker.
  pub fn is_installed(&self, fingerprint: &Fingerprint) -> bool {
    matches!(read_marker(&self.install_dir(fingerprint)), Ok(Some(_)))
  }

  /// Lock the store, waiting for a conflicting holder to release it.
  pub fn lock(&self, mode: LockMode, command: &str) -> Result<StoreLock, StoreLockError> {
    StoreLock::wait(&self.root, mode, command)
  }
}

/// Standard directories of an install prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
  pub prefix: PathBuf,
  pub bin: PathBuf,
  pub lib: PathBuf,
  pub share: PathBuf,
  pub etc: PathBuf,
  pub man: PathBuf,
  pub doc: PathBuf,
}

impl InstallLayout {
  pub fn new(prefix: PathBuf) -> Self {
    Self {
      bin: prefix.join("bin"),
      lib: prefix.join("lib"),
      share: prefix.join("share"),
      etc: prefix.join("etc"),
      man: prefix.join("man"),
      doc: prefix.join("doc"),
      prefix,
    }
  }

  pub fn dirs(&self) -> [&Path; 6] {
    [&self.bin, &self.lib, &self.share, &self.etc, &self.man, &self.doc]
  }

  pub async fn create(&self) -> io::Result<()> {
    for dir in self.dirs() {
      tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
  }
}
