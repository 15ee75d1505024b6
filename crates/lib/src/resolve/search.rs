//! Locating dependency sources on disk.

use std::path::{Path, PathBuf};

use tracing::trace;

use super::{ResolveError, canonical};
use crate::config::Config;
use crate::manifest::{DependencySpec, has_manifest, load_manifest};

/// Directories searched for dependencies declared with a version requirement.
#[derive(Debug, Clone, Default)]
pub struct SearchPaths {
  /// Searched as `<root>/<name>`, in order.
  pub source_roots: Vec<PathBuf>,
  /// The store's source area, searched last as `<dir>/<name>`.
  pub store_sources: Option<PathBuf>,
}

impl SearchPaths {
  pub fn new(source_roots: Vec<PathBuf>, store_dir: impl AsRef<Path>) -> Self {
    Self {
      source_roots,
      store_sources: Some(store_dir.as_ref().join("s")),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.source_roots.clone(), &config.store_dir)
  }

  /// Find the directory of dependency `name` declared by `package`.
  ///
  /// `ancestors` lists the declaring package's directory first, followed by
  /// the directories of the packages above it on the resolution path.
  pub(super) fn locate(
    &self,
    package: &str,
    name: &str,
    spec: &DependencySpec,
    declaring_dir: &Path,
    ancestors: &[&Path],
  ) -> Result<PathBuf, ResolveError> {
    let unresolved = |searched: Vec<String>| ResolveError::Unresolved {
      package: package.to_string(),
      dependency: name.to_string(),
      requirement: spec.to_string(),
      searched,
    };

    let req = match spec {
      DependencySpec::Path(path) => {
        let candidate = declaring_dir.join(path);
        return match canonical(&candidate) {
          Ok(dir) if has_manifest(&dir) => Ok(dir),
          _ => Err(unresolved(vec![candidate.display().to_string()])),
        };
      }
      DependencySpec::Version(req) => req,
    };

    let candidates = ancestors
      .iter()
      .map(|dir| dir.join("node_modules").join(name))
      .chain(self.source_roots.iter().map(|root| root.join(name)))
      .chain(self.store_sources.iter().map(|dir| dir.join(name)));

    let mut searched = Vec::new();
    for candidate in candidates {
      trace!(dependency = %name, candidate = %candidate.display(), "checking candidate");
      if !has_manifest(&candidate) {
        searched.push(candidate.display().to_string());
        continue;
      }

      let loaded = load_manifest(&candidate)?;
      if !req.matches(&loaded.version) {
        searched.push(format!(
          "{} (version {} does not match '{req}')",
          candidate.display(),
          loaded.version
        ));
        continue;
      }

      return canonical(&candidate).map_err(|_| unresolved(vec![candidate.display().to_string()]));
    }

    Err(unresolved(searched))
  }
}
