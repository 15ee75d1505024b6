//! Completion markers of install prefixes.
//!
//! An install prefix is only trusted once its marker exists. The marker
//! records a hash of the prefix contents taken right after the install
//! commands finished, so a prefix modified afterwards is detected and rebuilt.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::BUILD_COMPLETE_MARKER;
use crate::graph::PackageId;
use crate::util::hash::{DirHashError, hash_directory};

pub const MARKER_VERSION: u32 = 1;

/// Excluded from the output hash: the marker itself is written after hashing.
const OUTPUT_HASH_EXCLUSIONS: &[&str] = &[BUILD_COMPLETE_MARKER];

#[derive(Debug, Error)]
pub enum MarkerError {
  #[error("failed to hash install prefix: {0}")]
  Hash(#[from] DirHashError),

  #[error("failed to read marker: {0}")]
  Read(#[source] std::io::Error),

  #[error("failed to parse marker: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to encode marker: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("failed to write marker: {0}")]
  Write(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
  pub version: u32,
  pub status: String,
  pub package: String,
  /// SHA-256 of the install prefix contents.
  pub output_hash: String,
}

/// Hash the prefix at `install_dir` and write its completion marker.
pub async fn write_marker(install_dir: &Path, package: &PackageId) -> Result<Marker, MarkerError> {
  let output_hash = hash_directory(install_dir, OUTPUT_HASH_EXCLUSIONS)?;

  let marker = Marker {
    version: MARKER_VERSION,
    status: "complete".to_string(),
    package: package.to_string(),
    output_hash: output_hash.0,
  };
  let content = serde_json::to_string(&marker).map_err(MarkerError::Encode)?;
  tokio::fs::write(install_dir.join(BUILD_COMPLETE_MARKER), format!("{content}\n"))
    .await
    .map_err(MarkerError::Write)?;

  Ok(marker)
}

/// Read the marker of `install_dir`. `None` if there is none.
pub fn read_marker(install_dir: &Path) -> Result<Option<Marker>, MarkerError> {
  let path = install_dir.join(BUILD_COMPLETE_MARKER);
  if !path.exists() {
    return Ok(None);
  }

  let content = std::fs::read_to_string(&path).map_err(MarkerError::Read)?;
  serde_json::from_str(&content).map(Some).map_err(MarkerError::Parse)
}

/// State of an install prefix found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
  /// Nothing at the path.
  Absent,
  /// Marker present and contents unchanged.
  Valid(Marker),
  /// Directory present but unusable; it must be removed before rebuilding.
  Invalid(String),
}

/// Check whether `install_dir` holds a complete, unmodified install.
pub fn verify_install(install_dir: &Path) -> VerifyOutcome {
  if !install_dir.exists() {
    return VerifyOutcome::Absent;
  }

  let marker = match read_marker(install_dir) {
    Ok(Some(marker)) => marker,
    Ok(None) => return VerifyOutcome::Invalid("no completion marker".to_string()),
    Err(e) => return VerifyOutcome::Invalid(e.to_string()),
  };

  if marker.version != MARKER_VERSION {
    return VerifyOutcome::Invalid(format!("unsupported marker version {}", marker.version));
  }

  match hash_directory(install_dir, OUTPUT_HASH_EXCLUSIONS) {
    Ok(current) if current.0 == marker.output_hash => {
      debug!(path = %install_dir.display(), "install prefix verified");
      VerifyOutcome::Valid(marker)
    }
    Ok(current) => {
      warn!(
        path = %install_dir.display(),
        expected = %marker.output_hash,
        actual = %current,
        "install prefix modified, will rebuild"
      );
      VerifyOutcome::Invalid("contents do not match marker".to_string())
    }
    Err(e) => VerifyOutcome::Invalid(e.to_string()),
  }
}
