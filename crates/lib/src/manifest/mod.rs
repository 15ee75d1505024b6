//! Loading and validating package manifests.

mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::consts::MANIFEST_FILE;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("no package.json found in {}", .dir.display())]
  Missing { dir: PathBuf },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid manifest {}: {reason}", .path.display())]
  Invalid { path: PathBuf, reason: String },
}

/// A manifest that passed validation, with its typed fields parsed.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
  pub path: PathBuf,
  pub manifest: PackageManifest,
  pub version: semver::Version,
  /// Parsed dependency specs, in declaration order.
  pub dependencies: Vec<(String, DependencySpec)>,
}

pub fn manifest_path(dir: &Path) -> PathBuf {
  dir.join(MANIFEST_FILE)
}

pub fn has_manifest(dir: &Path) -> bool {
  manifest_path(dir).is_file()
}

/// Read and validate the manifest of the package in `dir`.
pub fn load_manifest(dir: &Path) -> Result<LoadedManifest, ManifestError> {
  let path = manifest_path(dir);
  if !path.is_file() {
    return Err(ManifestError::Missing { dir: dir.to_path_buf() });
  }

  trace!(path = %path.display(), "reading manifest");

  let content = std::fs::read_to_string(&path).map_err(|source| ManifestError::Read {
    path: path.clone(),
    source,
  })?;
  let manifest: PackageManifest = serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
    path: path.clone(),
    source,
  })?;

  validate(path, manifest)
}

fn validate(path: PathBuf, manifest: PackageManifest) -> Result<LoadedManifest, ManifestError> {
  let invalid = |reason: String| ManifestError::Invalid {
    path: path.clone(),
    reason,
  };

  validate_name(&manifest.name).map_err(|reason| invalid(format!("package name: {reason}")))?;

  let version = match manifest.version.as_deref() {
    None => semver::Version::new(0, 0, 0),
    Some(raw) => semver::Version::parse(raw).map_err(|e| invalid(format!("version '{raw}': {e}")))?,
  };

  let mut dependencies = Vec::with_capacity(manifest.dependencies.len());
  for (name, raw) in &manifest.dependencies {
    validate_name(name).map_err(|reason| invalid(format!("dependency name '{name}': {reason}")))?;
    if name == &manifest.name {
      return Err(invalid(format!("package '{name}' depends on itself")));
    }
    let spec = raw
      .parse::<DependencySpec>()
      .map_err(|reason| invalid(format!("dependency '{name}': {reason}")))?;
    dependencies.push((name.clone(), spec));
  }

  for (phase, commands) in [("build", &manifest.lodge.build), ("install", &manifest.lodge.install)] {
    if let Some(idx) = commands.iter().position(CommandSpec::is_empty) {
      return Err(invalid(format!("{phase} command #{idx} is empty")));
    }
  }

  for (section, vars) in [
    ("buildEnv", &manifest.lodge.build_env),
    ("exportedEnv", &manifest.lodge.exported_env),
  ] {
    if let Some(bad) = vars.keys().find(|k| !is_valid_var_name(k)) {
      return Err(invalid(format!("{section}: invalid variable name '{bad}'")));
    }
  }

  Ok(LoadedManifest {
    path,
    manifest,
    version,
    dependencies,
  })
}

fn validate_name(name: &str) -> Result<(), String> {
  if name.is_empty() {
    return Err("must not be empty".to_string());
  }
  if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
    return Err("must not contain whitespace".to_string());
  }
  if name.contains(':') {
    return Err("must not contain ':'".to_string());
  }
  Ok(())
}

fn is_valid_var_name(name: &str) -> bool {
  !name.is_empty() && !name.contains('=') && !name.contains('\0')
}
