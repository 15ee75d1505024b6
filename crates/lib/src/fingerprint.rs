//! Fingerprints of resolved packages.
//!
//! A fingerprint covers everything that can change a package's install
//! prefix: its identity, the build section of its manifest, the contents of
//! its source tree and the fingerprints of its direct dependencies. Since
//! each dependency fingerprint covers that dependency's own closure, a change
//! anywhere below a package changes its fingerprint too.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::SOURCE_EXCLUSIONS;
use crate::graph::{DependencyGraph, PackageId};
use crate::manifest::BuildSection;
use crate::util::hash::{ContentHash, DirHashError, Fingerprint, Hashable, hash_directory};

#[derive(Debug, Error)]
pub enum FingerprintError {
  #[error("failed to hash sources of {package}: {source}")]
  Source {
    package: PackageId,
    #[source]
    source: DirHashError,
  },

  #[error("failed to serialize fingerprint input of {package}: {source}")]
  Serialize {
    package: PackageId,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
  name: &'a str,
  version: String,
  build: &'a BuildSection,
  source: ContentHash,
  dependencies: Vec<(&'a str, &'a Fingerprint)>,
}

impl Hashable for FingerprintInput<'_> {}

/// Fingerprints of every package in a graph.
#[derive(Debug, Clone, Default)]
pub struct Fingerprints {
  by_id: HashMap<PackageId, Fingerprint>,
}

impl Fingerprints {
  /// Fingerprint every package, dependencies first.
  pub fn compute(graph: &DependencyGraph) -> Result<Self, FingerprintError> {
    let mut by_id: HashMap<PackageId, Fingerprint> = HashMap::with_capacity(graph.len());

    for package in graph.topological_order() {
      let source =
        hash_directory(&package.source_path, SOURCE_EXCLUSIONS).map_err(|source| FingerprintError::Source {
          package: package.id.clone(),
          source,
        })?;

      let dependencies = graph
        .dependencies(&package.id)
        .into_iter()
        .filter_map(|dep| by_id.get(&dep.id).map(|fp| (dep.name(), fp)))
        .collect();

      let input = FingerprintInput {
        name: package.name(),
        version: package.version().to_string(),
        build: &package.build,
        source,
        dependencies,
      };

      let fingerprint = input.fingerprint().map_err(|source| FingerprintError::Serialize {
        package: package.id.clone(),
        source,
      })?;

      debug!(package = %package.id, fingerprint = %fingerprint, "computed fingerprint");
      by_id.insert(package.id.clone(), fingerprint);
    }

    Ok(Self { by_id })
  }

  pub fn get(&self, id: &PackageId) -> Option<&Fingerprint> {
    self.by_id.get(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&PackageId, &Fingerprint)> {
    self.by_id.iter()
  }

  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }
}
