//! Placeholder values for a package and its dependencies.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprints;
use crate::graph::{DependencyGraph, Package};
use crate::placeholder::{Field, PlaceholderError, Resolver, Scope};
use crate::store::{InstallLayout, Store};

/// Resolves `$${self:...}` to `current` and `$${<name>:...}` to one of its
/// transitive dependencies.
pub struct Locations<'a> {
  graph: &'a DependencyGraph,
  fingerprints: &'a Fingerprints,
  store: &'a Store,
  current: &'a Package,
  visible: HashSet<&'a str>,
  /// Set while `current` is being built: its build directory.
  build_root: Option<PathBuf>,
}

impl<'a> Locations<'a> {
  pub fn new(graph: &'a DependencyGraph, fingerprints: &'a Fingerprints, store: &'a Store, current: &'a Package) -> Self {
    let visible = graph
      .transitive_dependencies(&current.id)
      .into_iter()
      .map(Package::name)
      .collect();

    Self {
      graph,
      fingerprints,
      store,
      current,
      visible,
      build_root: None,
    }
  }

  pub fn building_in(mut self, build_root: impl Into<PathBuf>) -> Self {
    self.build_root = Some(build_root.into());
    self
  }

  fn package(&self, scope: &Scope) -> Result<&'a Package, PlaceholderError> {
    let name = match scope {
      Scope::Current => return Ok(self.current),
      Scope::Package(name) if name == self.current.name() => return Ok(self.current),
      Scope::Package(name) => name,
    };

    if !self.visible.contains(name.as_str()) {
      return Err(PlaceholderError::UnknownScope {
        package: self.current.name().to_string(),
        scope: name.clone(),
      });
    }

    self.graph.by_name(name).ok_or_else(|| PlaceholderError::UnknownScope {
      package: self.current.name().to_string(),
      scope: name.clone(),
    })
  }

  pub fn layout(&self, package: &Package) -> Option<InstallLayout> {
    self.fingerprints.get(&package.id).map(|fp| self.store.layout(fp))
  }
}

impl Resolver for Locations<'_> {
  fn resolve(&self, scope: &Scope, field: Field) -> Result<String, PlaceholderError> {
    let package = self.package(scope)?;
    let is_current = package.id == self.current.id;
    let unavailable = || PlaceholderError::Unavailable {
      scope: package.name().to_string(),
      field,
    };

    let layout = || self.layout(package).ok_or_else(unavailable);

    let path: PathBuf = match field {
      Field::Name => return Ok(package.name().to_string()),
      Field::Version => return Ok(package.version().to_string()),
      Field::Root => match &self.build_root {
        Some(root) if is_current => root.clone(),
        _ => package.source_path.clone(),
      },
      Field::TargetDir => match &self.build_root {
        Some(root) if is_current => target_dir(root),
        _ => return Err(unavailable()),
      },
      Field::Install => layout()?.prefix,
      Field::Bin => layout()?.bin,
      Field::Lib => layout()?.lib,
      Field::Share => layout()?.share,
      Field::Etc => layout()?.etc,
      Field::Man => layout()?.man,
      Field::Doc => layout()?.doc,
    };

    Ok(path.to_string_lossy().into_owned())
  }
}

/// Where a build keeps its intermediate artifacts.
pub fn target_dir(build_root: &Path) -> PathBuf {
  build_root.join("_build")
}
