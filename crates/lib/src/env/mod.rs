//! Environment composition.
//!
//! Every package has three environment projections:
//!
//! - **build**: an isolated base environment, the locations and exports of
//!   all dependencies, then the package's own `cur__*` variables and
//!   `buildEnv`. Build commands run in it.
//! - **install**: the caller's environment plus the locations and global
//!   exports of all dependencies. Used to run commands before the package
//!   itself is built.
//! - **command**: the install environment with the package's own
//!   installation applied last, so its binaries shadow same-named
//!   binaries of its dependencies.
//!
//! Dependencies are applied in post-order (dependencies before dependents,
//! siblings in declaration order), so the nearest declaration wins.

mod locations;
mod types;

pub use locations::{Locations, target_dir};
pub use types::*;

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::consts::SOURCE_DATE_EPOCH;
use crate::fingerprint::Fingerprints;
use crate::graph::{DependencyGraph, Package, PackageId};
use crate::manifest::{EnvDecl, ExportScope, MergePolicy};
use crate::placeholder::{self, PlaceholderError};
use crate::store::{InstallLayout, Store};
use crate::util::hash::Fingerprint;

#[derive(Debug, Error)]
pub enum EnvError {
  #[error("unknown package {0}")]
  UnknownPackage(PackageId),

  #[error("no fingerprint for {0}")]
  MissingFingerprint(PackageId),

  #[error("{package}: invalid value for {variable}: {source}")]
  Placeholder {
    package: PackageId,
    variable: String,
    #[source]
    source: PlaceholderError,
  },
}

type CacheKey = (PackageId, EnvKind);

/// Derives and caches environment snapshots.
pub struct EnvComposer {
  graph: Arc<DependencyGraph>,
  fingerprints: RwLock<Arc<Fingerprints>>,
  store: Arc<Store>,
  system_path: String,
  inherited: IndexMap<String, String>,
  cache: Mutex<HashMap<CacheKey, (Fingerprint, Arc<EnvSnapshot>)>>,
}

impl EnvComposer {
  /// A composer whose install and command environments start from the
  /// current process environment.
  pub fn new(
    graph: Arc<DependencyGraph>,
    fingerprints: Arc<Fingerprints>,
    store: Arc<Store>,
    system_path: impl Into<String>,
  ) -> Self {
    let inherited = utf8_vars(std::env::vars_os());

    Self {
      graph,
      fingerprints: RwLock::new(fingerprints),
      store,
      system_path: system_path.into(),
      inherited,
      cache: Mutex::new(HashMap::new()),
    }
  }

  /// Replace the environment install and command snapshots start from.
  pub fn with_inherited(mut self, inherited: IndexMap<String, String>) -> Self {
    self.inherited = inherited;
    self
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn fingerprints(&self) -> Arc<Fingerprints> {
    self.fingerprints.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Swap in recomputed fingerprints. Cached snapshots of packages whose
  /// fingerprint changed are recomputed on next use.
  pub fn set_fingerprints(&self, fingerprints: Arc<Fingerprints>) {
    *self.fingerprints.write().unwrap_or_else(PoisonError::into_inner) = fingerprints;
  }

  /// Drop every cached snapshot.
  pub fn invalidate(&self) {
    self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
  }

  /// The `kind` snapshot of package `id`.
  pub fn snapshot(&self, id: &PackageId, kind: EnvKind) -> Result<Arc<EnvSnapshot>, EnvError> {
    let fingerprints = self.fingerprints();
    let fingerprint = fingerprints
      .get(id)
      .ok_or_else(|| EnvError::MissingFingerprint(id.clone()))?;
    let key = (id.clone(), kind);

    if let Some((cached_fp, snapshot)) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key)
      && cached_fp == fingerprint
    {
      trace!(package = %id, %kind, "environment cache hit");
      return Ok(snapshot.clone());
    }

    let package = self.graph.get(id).ok_or_else(|| EnvError::UnknownPackage(id.clone()))?;
    let snapshot = Arc::new(self.compose(package, kind, &fingerprints)?);
    debug!(package = %id, %kind, vars = snapshot.len(), "composed environment");

    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key, (fingerprint.clone(), snapshot.clone()));
    Ok(snapshot)
  }

  fn compose(&self, package: &Package, kind: EnvKind, fingerprints: &Fingerprints) -> Result<EnvSnapshot, EnvError> {
    let mut vars = match kind {
      EnvKind::Build => self.isolated_base(),
      EnvKind::Install | EnvKind::Command => self.inherited.clone(),
    };

    let direct: HashSet<&str> = package.dependencies.iter().map(String::as_str).collect();

    for dep in self.graph.transitive_dependencies(&package.id) {
      let locations = Locations::new(&self.graph, fingerprints, &self.store, dep);
      let layout = self.layout_of(dep, fingerprints)?;

      apply_locations(&mut vars, dep, &layout);
      self.apply_exports(&mut vars, dep, dep.exports(ExportScope::Global), &locations)?;
      if kind == EnvKind::Build && direct.contains(dep.name()) {
        self.apply_exports(&mut vars, dep, dep.exports(ExportScope::Local), &locations)?;
      }
    }

    let layout = self.layout_of(package, fingerprints)?;
    match kind {
      EnvKind::Build => {
        let build_root = self.store.build_dir(self.fingerprint_of(package, fingerprints)?);
        let locations = Locations::new(&self.graph, fingerprints, &self.store, package).building_in(&build_root);

        apply_current(&mut vars, package, &layout, &build_root);
        self.apply_exports(&mut vars, package, package.build.build_env.iter(), &locations)?;
      }
      EnvKind::Command => {
        let locations = Locations::new(&self.graph, fingerprints, &self.store, package);

        apply_locations(&mut vars, package, &layout);
        self.apply_exports(&mut vars, package, package.build.exported_env.iter(), &locations)?;
      }
      EnvKind::Install => {}
    }

    Ok(EnvSnapshot {
      kind,
      package: package.id.clone(),
      vars,
    })
  }

  fn isolated_base(&self) -> IndexMap<String, String> {
    IndexMap::from([
      ("PATH".to_string(), self.system_path.clone()),
      ("HOME".to_string(), "/homeless-shelter".to_string()),
      ("LANG".to_string(), "C".to_string()),
      ("LC_ALL".to_string(), "C".to_string()),
      ("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string()),
    ])
  }

  fn apply_exports<'p>(
    &self,
    vars: &mut IndexMap<String, String>,
    package: &Package,
    decls: impl Iterator<Item = (&'p String, &'p EnvDecl)>,
    locations: &Locations<'_>,
  ) -> Result<(), EnvError> {
    for (name, decl) in decls {
      let value = placeholder::substitute(&decl.val, locations).map_err(|source| EnvError::Placeholder {
        package: package.id.clone(),
        variable: name.clone(),
        source,
      })?;
      merge(vars, name, value, decl.merge);
    }
    Ok(())
  }

  fn fingerprint_of<'f>(&self, package: &Package, fingerprints: &'f Fingerprints) -> Result<&'f Fingerprint, EnvError> {
    fingerprints
      .get(&package.id)
      .ok_or_else(|| EnvError::MissingFingerprint(package.id.clone()))
  }

  fn layout_of(&self, package: &Package, fingerprints: &Fingerprints) -> Result<InstallLayout, EnvError> {
    Ok(self.store.layout(self.fingerprint_of(package, fingerprints)?))
  }
}

/// Variables of `vars` whose name and value are valid UTF-8.
fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> IndexMap<String, String> {
  vars
    .into_iter()
    .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
      (Ok(name), Ok(value)) => Some((name, value)),
      (Ok(name), Err(_)) => {
        debug!(%name, "skipping inherited variable with a non-UTF-8 value");
        None
      }
      (Err(name), _) => {
        debug!(name = %name.to_string_lossy(), "skipping inherited variable with a non-UTF-8 name");
        None
      }
    })
    .collect()
}

/// Namespaced location variables of `package` and its `bin`/`man` on the
/// search paths.
fn apply_locations(vars: &mut IndexMap<String, String>, package: &Package, layout: &InstallLayout) {
  let ns = namespace(package.name());
  let set = |vars: &mut IndexMap<String, String>, field: &str, value: String| {
    vars.insert(format!("{ns}__{field}"), value);
  };

  set(vars, "name", package.name().to_string());
  set(vars, "version", package.version().to_string());
  set(vars, "root", display(&package.source_path));
  set(vars, "install", display(&layout.prefix));
  set(vars, "bin", display(&layout.bin));
  set(vars, "lib", display(&layout.lib));
  set(vars, "share", display(&layout.share));
  set(vars, "etc", display(&layout.etc));
  set(vars, "man", display(&layout.man));
  set(vars, "doc", display(&layout.doc));

  merge(vars, "PATH", display(&layout.bin), MergePolicy::PrependPath);
  merge(vars, "MAN_PATH", display(&layout.man), MergePolicy::PrependPath);
}

/// `cur__*` variables of the package being built.
fn apply_current(vars: &mut IndexMap<String, String>, package: &Package, layout: &InstallLayout, build_root: &Path) {
  let entries = [
    ("name", package.name().to_string()),
    ("version", package.version().to_string()),
    ("root", display(build_root)),
    ("original_root", display(&package.source_path)),
    ("target_dir", display(&target_dir(build_root))),
    ("install", display(&layout.prefix)),
    ("bin", display(&layout.bin)),
    ("lib", display(&layout.lib)),
    ("share", display(&layout.share)),
    ("etc", display(&layout.etc)),
    ("man", display(&layout.man)),
    ("doc", display(&layout.doc)),
  ];

  for (field, value) in entries {
    vars.insert(format!("cur__{field}"), value);
  }
}

fn display(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
