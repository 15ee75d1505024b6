//! Build scheduling.
//!
//! The scheduler builds a subgraph of the dependency graph. A package is
//! queued once all of its dependencies are built; queued packages run
//! concurrently as tokio tasks, bounded by a semaphore of `jobs` permits.
//!
//! When a package fails, every package that depends on it within the
//! requested subgraph is skipped. Independent packages keep building.
//!
//! # Submodules
//!
//! - [`cmd`] - Running build and install commands
//! - `execute` - Realizing a single package in the store

pub mod cmd;
mod execute;
mod types;

pub use types::*;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::env::EnvComposer;
use crate::fingerprint::Fingerprints;
use crate::graph::{DependencyGraph, PackageId};
use crate::store::{BuildStatus, Slot, Store};

/// Everything a build needs, shared by all build tasks.
pub struct BuildContext {
  pub graph: Arc<DependencyGraph>,
  pub fingerprints: Arc<Fingerprints>,
  pub store: Arc<Store>,
  pub composer: Arc<EnvComposer>,
  /// Shell for string commands; `None` uses `/bin/sh`.
  pub shell: Option<String>,
}

pub struct Scheduler {
  ctx: Arc<BuildContext>,
  jobs: usize,
}

impl Scheduler {
  pub fn new(ctx: Arc<BuildContext>, jobs: usize) -> Self {
    Self { ctx, jobs: jobs.max(1) }
  }

  /// Build `target` to completion.
  pub async fn run(&self, target: &BuildTarget) -> Result<BuildReport, BuildError> {
    self.run_until(target, std::future::pending()).await
  }

  /// Build `target`, stopping early when `shutdown` resolves.
  ///
  /// On shutdown every running build is aborted, its child process killed
  /// and its record marked failed, and [`BuildError::Cancelled`] is
  /// returned. Packages that finished before remain in the store.
  pub async fn run_until<F>(&self, target: &BuildTarget, shutdown: F) -> Result<BuildReport, BuildError>
  where
    F: Future<Output = ()>,
  {
    let graph = &self.ctx.graph;
    let scope = target.scope(graph)?;

    info!(target = %target, packages = scope.len(), jobs = self.jobs, "starting build");
    for (wave, packages) in graph.waves().iter().enumerate() {
      let names: Vec<&str> = packages
        .iter()
        .filter(|p| scope.contains(&p.id))
        .map(|p| p.name())
        .collect();
      if !names.is_empty() {
        debug!(wave, packages = ?names, "build wave");
      }
    }

    let mut slots: HashMap<PackageId, Arc<Slot>> = HashMap::with_capacity(scope.len());
    let mut remaining: HashMap<PackageId, usize> = HashMap::with_capacity(scope.len());
    let mut ready: BTreeSet<PackageId> = BTreeSet::new();

    for id in &scope {
      slots.insert(id.clone(), self.slot(id)?);
      let deps = graph.dependencies(id).len();
      if deps == 0 {
        ready.insert(id.clone());
      } else {
        remaining.insert(id.clone(), deps);
      }
    }

    let semaphore = Arc::new(Semaphore::new(self.jobs));
    let mut tasks: JoinSet<(PackageId, Result<Outcome, BuildError>)> = JoinSet::new();
    let mut in_flight: HashSet<PackageId> = HashSet::new();
    let mut finished: HashSet<PackageId> = HashSet::new();
    let mut report = BuildReport::default();

    tokio::pin!(shutdown);

    loop {
      while let Some(id) = ready.pop_first() {
        let slot = slots[&id].clone();
        slot.transition(BuildStatus::Queued);
        in_flight.insert(id.clone());
        self.spawn(&mut tasks, &semaphore, id, slot);
      }

      if tasks.is_empty() {
        break;
      }

      tokio::select! {
        biased;

        _ = &mut shutdown => {
          warn!(running = in_flight.len(), "shutdown requested, aborting builds");
          tasks.abort_all();
          while tasks.join_next().await.is_some() {}
          for id in &in_flight {
            slots[id].transition(BuildStatus::Failed);
          }
          return Err(BuildError::Cancelled);
        }

        joined = tasks.join_next() => {
          let Some(joined) = joined else {
            break;
          };

          match joined {
            Ok((id, Ok(outcome))) => {
              in_flight.remove(&id);
              finished.insert(id.clone());

              for dependent in graph.dependents(&id) {
                if !scope.contains(&dependent.id) || finished.contains(&dependent.id) {
                  continue;
                }
                if let Some(count) = remaining.get_mut(&dependent.id) {
                  *count = count.saturating_sub(1);
                  if *count == 0 {
                    remaining.remove(&dependent.id);
                    ready.insert(dependent.id.clone());
                  }
                }
              }

              report.record(id, outcome);
            }
            Ok((id, Err(err))) => {
              debug!(package = %id, error = %err, "build failed");
              in_flight.remove(&id);
              finished.insert(id.clone());
              slots[&id].transition(BuildStatus::Failed);

              for dependent in graph.transitive_dependents(&id) {
                if !scope.contains(&dependent.id) || !finished.insert(dependent.id.clone()) {
                  continue;
                }
                warn!(package = %dependent.id, dependency = %id, "skipping build due to failed dependency");
                remaining.remove(&dependent.id);
                slots[&dependent.id].transition(BuildStatus::Failed);
                report.skipped.push((
                  dependent.id.clone(),
                  BuildError::DependencyBuildFailed {
                    package: dependent.id.clone(),
                    dependency: id.clone(),
                  },
                ));
              }

              report.failed.push((id, err));
            }
            Err(e) => {
              error!(error = %e, "build task did not complete");
            }
          }
        }
      }
    }

    // Only reachable for packages whose task panicked, or their dependents.
    let mut unfinished: Vec<&PackageId> = scope.iter().filter(|id| !finished.contains(*id)).collect();
    unfinished.sort();
    for id in unfinished {
      slots[id].transition(BuildStatus::Failed);
      report
        .failed
        .push((id.clone(), BuildError::Interrupted { package: id.clone() }));
    }

    info!(
      built = report.built.len(),
      cached = report.cached.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "build finished"
    );

    Ok(report)
  }

  fn slot(&self, id: &PackageId) -> Result<Arc<Slot>, BuildError> {
    let fingerprint = self
      .ctx
      .fingerprints
      .get(id)
      .ok_or_else(|| BuildError::UnknownPackage(id.clone()))?;
    let install_dir = self.ctx.store.install_dir(fingerprint);
    Ok(self.ctx.store.records().entry(id, fingerprint, &install_dir))
  }

  fn spawn(
    &self,
    tasks: &mut JoinSet<(PackageId, Result<Outcome, BuildError>)>,
    semaphore: &Arc<Semaphore>,
    id: PackageId,
    slot: Arc<Slot>,
  ) {
    let ctx = self.ctx.clone();
    let semaphore = semaphore.clone();

    tasks.spawn(async move {
      let Ok(_permit) = semaphore.acquire_owned().await else {
        return (id, Err(BuildError::Cancelled));
      };
      let Some(package) = ctx.graph.get(&id) else {
        return (id.clone(), Err(BuildError::UnknownPackage(id)));
      };

      let result = execute::realize(&ctx, package, &slot).await;
      (id, result)
    });
  }
}

impl BuildTarget {
  /// Packages this target covers in `graph`.
  pub fn scope(&self, graph: &DependencyGraph) -> Result<HashSet<PackageId>, BuildError> {
    let closure = |id: &PackageId| -> Result<Vec<PackageId>, BuildError> {
      if graph.get(id).is_none() {
        return Err(BuildError::UnknownPackage(id.clone()));
      }
      Ok(graph.transitive_dependencies(id).into_iter().map(|p| p.id.clone()).collect())
    };

    Ok(match self {
      BuildTarget::All => graph.packages().map(|p| p.id.clone()).collect(),
      BuildTarget::Package(id) => {
        let mut scope: HashSet<PackageId> = closure(id)?.into_iter().collect();
        scope.insert(id.clone());
        scope
      }
      BuildTarget::DependenciesOf(id) => closure(id)?.into_iter().collect(),
    })
  }
}

#[cfg(all(test, unix))]
mod tests;
