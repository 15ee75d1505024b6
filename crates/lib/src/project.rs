//! The project facade.
//!
//! A [`Project`] is a resolved dependency graph rooted at a project directory,
//! together with the store it builds into. The CLI commands are thin
//! wrappers over its methods.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::build::{BuildContext, BuildError, BuildReport, BuildTarget, Scheduler};
use crate::config::Config;
use crate::env::{EnvComposer, EnvError, EnvKind, EnvSnapshot};
use crate::exec::{self, ExecError};
use crate::fingerprint::{FingerprintError, Fingerprints};
use crate::gc::{GcError, GcResult, collect_garbage};
use crate::graph::{DependencyGraph, Package, PackageId};
use crate::manifest::has_manifest;
use crate::resolve::{ResolveError, SearchPaths, resolve};
use crate::store::{BuildStatus, LockMode, Store, StoreLock, StoreLockError, VerifyOutcome, verify_install};
use crate::util::hash::Fingerprint;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("no package.json found in {} or any parent directory", .start.display())]
  NotFound { start: PathBuf },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Fingerprint(#[from] FingerprintError),

  #[error(transparent)]
  Lock(#[from] StoreLockError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("{}", describe_failure(.0))]
  BuildFailed(BuildReport),

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error(transparent)]
  Gc(#[from] GcError),

  #[error("no package named '{0}' in the project")]
  UnknownPackage(String),
}

fn describe_failure(report: &BuildReport) -> String {
  match (report.failed.first(), report.skipped.first()) {
    (Some((_, err)), _) => format!("build failed: {err}"),
    (None, Some((_, err))) => format!("build failed: {err}"),
    (None, None) => "build failed".to_string(),
  }
}

impl ProjectError {
  /// Process exit code for this error.
  pub fn exit_code(&self) -> i32 {
    match self {
      ProjectError::BuildFailed(report) => report.exit_code(),
      ProjectError::Exec(e) => e.exit_code(),
      ProjectError::Build(BuildError::Cancelled) => 130,
      _ => 1,
    }
  }
}

/// One row of `ls-builds`.
#[derive(Debug, Clone, Serialize)]
pub struct PackageStatus {
  pub name: String,
  pub version: String,
  pub fingerprint: Fingerprint,
  pub status: BuildStatus,
  pub install_path: PathBuf,
  pub dependencies: Vec<String>,
}

pub struct Project {
  config: Config,
  graph: Arc<DependencyGraph>,
  fingerprints: Arc<Fingerprints>,
  store: Arc<Store>,
  composer: Arc<EnvComposer>,
}

impl fmt::Debug for Project {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Project")
      .field("root", &self.graph.root().id.to_string())
      .field("packages", &self.graph.len())
      .field("store", &self.store.root())
      .finish_non_exhaustive()
  }
}

impl Project {
  /// The nearest directory at or above `start` that has a manifest.
  pub fn discover(start: &Path) -> Result<PathBuf, ProjectError> {
    start
      .ancestors()
      .find(|dir| has_manifest(dir))
      .map(Path::to_path_buf)
      .ok_or_else(|| ProjectError::NotFound {
        start: start.to_path_buf(),
      })
  }

  /// Resolve and fingerprint the project rooted at `root`.
  pub fn load(root: &Path, config: Config) -> Result<Self, ProjectError> {
    let search = SearchPaths::from_config(&config);
    let graph = Arc::new(resolve(root, &search)?);
    let fingerprints = Arc::new(Fingerprints::compute(&graph)?);
    let store = Arc::new(Store::new(&config.store_dir));
    let composer = Arc::new(EnvComposer::new(
      graph.clone(),
      fingerprints.clone(),
      store.clone(),
      config.system_path.clone(),
    ));

    info!(
      root = %graph.root().id,
      packages = graph.len(),
      store = %store.root().display(),
      "project loaded"
    );

    Ok(Self {
      config,
      graph,
      fingerprints,
      store,
      composer,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn fingerprints(&self) -> &Fingerprints {
    &self.fingerprints
  }

  pub fn store(&self) -> &Store {
    &self.store
  }

  pub fn root(&self) -> &Package {
    self.graph.root()
  }

  /// Recompute fingerprints from the sources on disk. Cached environment
  /// snapshots are dropped when any fingerprint changed.
  pub fn refresh(&mut self) -> Result<bool, ProjectError> {
    let fingerprints = Fingerprints::compute(&self.graph)?;
    let changed = fingerprints.iter().any(|(id, fp)| self.fingerprints.get(id) != Some(fp));
    if changed {
      debug!("fingerprints changed, dropping cached environments");
      let fingerprints = Arc::new(fingerprints);
      self.composer.set_fingerprints(fingerprints.clone());
      self.fingerprints = fingerprints;
    }
    Ok(changed)
  }

  /// Take the store lock for the duration of a command, waiting while
  /// another process holds a conflicting lock.
  pub fn lock(&self, mode: LockMode, command: &str) -> Result<StoreLock, ProjectError> {
    Ok(self.store.lock(mode, command)?)
  }

  /// Id of the package called `name`.
  pub fn package_id(&self, name: &str) -> Result<PackageId, ProjectError> {
    self
      .graph
      .by_name(name)
      .map(|p| p.id.clone())
      .ok_or_else(|| ProjectError::UnknownPackage(name.to_string()))
  }

  pub async fn build(&self, target: &BuildTarget) -> Result<BuildReport, ProjectError> {
    self.build_until(target, std::future::pending()).await
  }

  /// Build `target`. A report with failures is returned as
  /// [`ProjectError::BuildFailed`].
  pub async fn build_until<F>(&self, target: &BuildTarget, shutdown: F) -> Result<BuildReport, ProjectError>
  where
    F: Future<Output = ()>,
  {
    let ctx = Arc::new(BuildContext {
      graph: self.graph.clone(),
      fingerprints: self.fingerprints.clone(),
      store: self.store.clone(),
      composer: self.composer.clone(),
      shell: self.config.shell.clone(),
    });
    let report = Scheduler::new(ctx, self.config.jobs).run_until(target, shutdown).await?;

    if report.is_success() {
      Ok(report)
    } else {
      Err(ProjectError::BuildFailed(report))
    }
  }

  /// What must be built before a command can run in the `kind` environment
  /// of the root package.
  pub fn target_for(&self, kind: EnvKind) -> BuildTarget {
    match kind {
      EnvKind::Command => BuildTarget::All,
      EnvKind::Build | EnvKind::Install => BuildTarget::DependenciesOf(self.root().id.clone()),
    }
  }

  /// The `kind` environment of the root package.
  pub fn snapshot(&self, kind: EnvKind) -> Result<Arc<EnvSnapshot>, ProjectError> {
    Ok(self.composer.snapshot(&self.root().id, kind)?)
  }

  /// Build what `kind` needs, then run `argv` in that environment.
  ///
  /// When every install prefix the environment needs is complete the store
  /// is not locked at all. Otherwise the store is locked exclusively while
  /// building, waiting for another holder if needed, and released before
  /// the command starts. Returns the command's exit code.
  pub async fn exec<F>(&self, kind: EnvKind, argv: &[String], cwd: &Path, shutdown: F) -> Result<i32, ProjectError>
  where
    F: Future<Output = ()>,
  {
    let target = self.target_for(kind);
    if self.is_built(&target).await? {
      debug!(%kind, "environment already built");
    } else {
      let lock = self.wait_for_lock(LockMode::Exclusive, format!("exec ({kind} env)")).await?;
      let report = self.build_until(&target, shutdown).await?;
      drop(lock);
      debug!(built = report.built.len(), cached = report.cached.len(), %kind, "environment ready");
    }

    let env = self.snapshot(kind)?;
    Ok(exec::run(&env, argv, cwd).await?)
  }

  /// Whether every package of `target` has a verified install prefix.
  pub async fn is_built(&self, target: &BuildTarget) -> Result<bool, ProjectError> {
    let dirs: Vec<PathBuf> = target
      .scope(&self.graph)?
      .iter()
      .filter_map(|id| self.fingerprints.get(id))
      .map(|fp| self.store.install_dir(fp))
      .collect();

    let built = tokio::task::spawn_blocking(move || {
      dirs
        .iter()
        .all(|dir| matches!(verify_install(dir), VerifyOutcome::Valid(_)))
    })
    .await
    .unwrap_or(false);
    Ok(built)
  }

  async fn wait_for_lock(&self, mode: LockMode, command: String) -> Result<StoreLock, ProjectError> {
    let root = self.store.root().to_path_buf();
    let lock = tokio::task::spawn_blocking(move || StoreLock::wait(&root, mode, &command))
      .await
      .map_err(|e| StoreLockError::LockFailed(std::io::Error::other(e)))??;
    Ok(lock)
  }

  /// Every package with its fingerprint and build status, dependencies first.
  pub fn statuses(&self) -> Vec<PackageStatus> {
    self
      .graph
      .topological_order()
      .into_iter()
      .filter_map(|package| {
        let fingerprint = self.fingerprints.get(&package.id)?;
        let install_path = self.store.install_dir(fingerprint);
        let status = match self.store.records().get(fingerprint) {
          Some(slot) => slot.status(),
          None if self.store.is_installed(fingerprint) => BuildStatus::Built,
          None => BuildStatus::Pending,
        };

        Some(PackageStatus {
          name: package.name().to_string(),
          version: package.version().to_string(),
          fingerprint: fingerprint.clone(),
          status,
          install_path,
          dependencies: package.dependencies.clone(),
        })
      })
      .collect()
  }

  /// Remove store entries this project does not use.
  pub fn gc(&self, dry_run: bool) -> Result<GcResult, ProjectError> {
    Ok(collect_garbage(&self.store, &self.fingerprints, dry_run)?)
  }
}
