use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::manifest::{BuildSection, EnvDecl, ExportScope};

/// Identity of a package: name and version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageId {
  pub name: String,
  pub version: semver::Version,
}

impl PackageId {
  pub fn new(name: impl Into<String>, version: semver::Version) -> Self {
    Self {
      name: name.into(),
      version,
    }
  }
}

impl fmt::Display for PackageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.name, self.version)
  }
}

/// A resolved package.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
  pub id: PackageId,
  /// Canonical directory holding the package's manifest and sources.
  pub source_path: PathBuf,
  /// Names of direct dependencies, in declaration order.
  pub dependencies: Vec<String>,
  pub build: BuildSection,
}

impl Package {
  pub fn new(id: PackageId, source_path: PathBuf, dependencies: Vec<String>, build: BuildSection) -> Self {
    Self {
      id,
      source_path,
      dependencies,
      build,
    }
  }

  pub fn name(&self) -> &str {
    &self.id.name
  }

  pub fn version(&self) -> &semver::Version {
    &self.id.version
  }

  /// Exports with the given scope, in declaration order.
  pub fn exports(&self, scope: ExportScope) -> impl Iterator<Item = (&String, &EnvDecl)> {
    self.build.exported_env.iter().filter(move |(_, decl)| decl.scope == scope)
  }

  pub fn has_build_steps(&self) -> bool {
    !self.build.build.is_empty() || !self.build.install.is_empty()
  }
}
