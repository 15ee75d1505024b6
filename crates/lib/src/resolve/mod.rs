//! Resolving a project's manifests into a [`DependencyGraph`].
//!
//! Resolution walks dependencies depth-first using an explicit work stack.
//! The packages currently on the stack form the resolution path; meeting one
//! of them again is a cycle. A package is added to the graph once all of its
//! dependencies are resolved, so [`resolve`] yields packages in post-order.

mod search;

pub use search::SearchPaths;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{DependencyGraph, GraphError, Package, PackageId};
use crate::manifest::{DependencySpec, LoadedManifest, ManifestError, load_manifest};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(
    "cannot resolve dependency '{dependency}' ({requirement}) of '{package}'; searched:{}",
    format_searched(.searched)
  )]
  Unresolved {
    package: String,
    dependency: String,
    requirement: String,
    searched: Vec<String>,
  },

  #[error("dependency cycle: {chain}")]
  Cycle { chain: String },

  #[error("conflicting sources for '{name}': {reason}")]
  Conflict { name: String, reason: String },

  #[error(transparent)]
  Graph(#[from] GraphError),
}

fn format_searched(searched: &[String]) -> String {
  searched.iter().map(|s| format!("\n  - {s}")).collect()
}

/// A package whose dependencies are still being resolved.
struct Frame {
  dir: PathBuf,
  loaded: LoadedManifest,
  next: usize,
}

impl Frame {
  fn name(&self) -> &str {
    &self.loaded.manifest.name
  }
}

/// Where an already-resolved package came from.
struct Resolved {
  dir: PathBuf,
  version: semver::Version,
}

/// Resolve the project rooted at `root` into a dependency graph.
pub fn resolve(root: &Path, search: &SearchPaths) -> Result<DependencyGraph, ResolveError> {
  let root_dir = canonical(root).map_err(|_| ManifestError::Missing { dir: root.to_path_buf() })?;
  let root_manifest = load_manifest(&root_dir)?;
  let root_name = root_manifest.manifest.name.clone();

  let mut packages = Vec::new();
  let mut resolved: HashMap<String, Resolved> = HashMap::new();
  let mut resolving: HashSet<String> = HashSet::from([root_name.clone()]);
  let mut stack = vec![Frame {
    dir: root_dir,
    loaded: root_manifest,
    next: 0,
  }];

  while let Some(top) = stack.last_mut() {
    let Some((dep_name, spec)) = top.loaded.dependencies.get(top.next).cloned() else {
      let Some(frame) = stack.pop() else { break };
      resolving.remove(frame.name());
      debug!(package = %frame.name(), dir = %frame.dir.display(), "resolved package");
      resolved.insert(
        frame.name().to_string(),
        Resolved {
          dir: frame.dir.clone(),
          version: frame.loaded.version.clone(),
        },
      );
      packages.push(into_package(frame));
      continue;
    };
    top.next += 1;

    let declaring = top.name().to_string();
    let declaring_dir = top.dir.clone();

    if resolving.contains(&dep_name) {
      let mut chain: Vec<&str> = stack
        .iter()
        .map(Frame::name)
        .skip_while(|name| *name != dep_name)
        .collect();
      chain.push(&dep_name);
      return Err(ResolveError::Cycle { chain: chain.join(" -> ") });
    }

    if let Some(existing) = resolved.get(&dep_name) {
      check_compatible(&dep_name, &spec, &declaring_dir, existing)?;
      continue;
    }

    let ancestors: Vec<&Path> = stack.iter().rev().map(|f| f.dir.as_path()).collect();
    let dir = search.locate(&declaring, &dep_name, &spec, &declaring_dir, &ancestors)?;
    let loaded = load_manifest(&dir)?;
    if loaded.manifest.name != dep_name {
      return Err(
        ManifestError::Invalid {
          path: loaded.path,
          reason: format!(
            "package is named '{}' but '{declaring}' depends on it as '{dep_name}'",
            loaded.manifest.name
          ),
        }
        .into(),
      );
    }

    debug!(package = %declaring, dependency = %dep_name, dir = %dir.display(), "located dependency");
    resolving.insert(dep_name);
    stack.push(Frame { dir, loaded, next: 0 });
  }

  info!(root = %root_name, packages = packages.len(), "resolved dependency graph");
  Ok(DependencyGraph::new(packages, &root_name)?)
}

fn into_package(frame: Frame) -> Package {
  let LoadedManifest {
    manifest,
    version,
    dependencies,
    ..
  } = frame.loaded;

  Package::new(
    PackageId::new(manifest.name, version),
    frame.dir,
    dependencies.into_iter().map(|(name, _)| name).collect(),
    manifest.lodge,
  )
}

/// A second reference to an already-resolved package must agree with it.
fn check_compatible(
  name: &str,
  spec: &DependencySpec,
  declaring_dir: &Path,
  existing: &Resolved,
) -> Result<(), ResolveError> {
  match spec {
    DependencySpec::Path(path) => {
      let dir = canonical(&declaring_dir.join(path)).unwrap_or_else(|_| declaring_dir.join(path));
      if dir != existing.dir {
        return Err(ResolveError::Conflict {
          name: name.to_string(),
          reason: format!("{} and {}", existing.dir.display(), dir.display()),
        });
      }
    }
    DependencySpec::Version(req) => {
      if !req.matches(&existing.version) {
        return Err(ResolveError::Conflict {
          name: name.to_string(),
          reason: format!(
            "{} (version {}) does not satisfy '{req}'",
            existing.dir.display(),
            existing.version
          ),
        });
      }
    }
  }
  Ok(())
}

pub(crate) fn canonical(path: &Path) -> std::io::Result<PathBuf> {
  dunce::canonicalize(path)
}
