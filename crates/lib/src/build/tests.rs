use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tracing_test::traced_test;

use super::*;
use crate::resolve::{SearchPaths, resolve};
use crate::util::testutil::{write_manifest, write_package_with_bin};

const SYSTEM_PATH: &str = "/usr/bin:/bin";

struct Fixture {
  temp: TempDir,
  project: PathBuf,
}

impl Fixture {
  fn new(write: impl FnOnce(&Path)) -> Self {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    write(&project);
    Self { temp, project }
  }

  fn store_root(&self) -> PathBuf {
    self.temp.path().join("store")
  }

  /// A scheduler over a fresh resolution, as a new invocation would create.
  fn scheduler(&self, jobs: usize) -> (Scheduler, Arc<BuildContext>) {
    let graph = Arc::new(resolve(&self.project, &SearchPaths::default()).unwrap());
    let fingerprints = Arc::new(Fingerprints::compute(&graph).unwrap());
    let store = Arc::new(Store::new(self.store_root()));
    let composer = Arc::new(EnvComposer::new(
      graph.clone(),
      fingerprints.clone(),
      store.clone(),
      SYSTEM_PATH,
    ));
    let ctx = Arc::new(BuildContext {
      graph,
      fingerprints,
      store,
      composer,
      shell: None,
    });
    (Scheduler::new(ctx.clone(), jobs), ctx)
  }
}

fn id_of(ctx: &BuildContext, name: &str) -> PackageId {
  ctx.graph.by_name(name).unwrap().id.clone()
}

fn names(ids: &[PackageId]) -> Vec<&str> {
  let mut names: Vec<&str> = ids.iter().map(|id| id.name.as_str()).collect();
  names.sort();
  names
}

fn manifest(dir: &Path, value: serde_json::Value) {
  write_manifest(dir, &serde_json::to_string_pretty(&value).unwrap());
}

// app uses the `dep-tool` binary installed by dep while building.
fn app_with_dep(root: &Path) {
  write_package_with_bin(&root.join("dep"), "dep", "dep-tool", "from-dep", &[]);
  manifest(
    root,
    json!({
      "name": "app",
      "version": "1.0.0",
      "dependencies": { "dep": "path:./dep" },
      "lodge": {
        "build": ["dep-tool > $cur__target_dir/out.txt"],
        "install": [["cp", "$${self:target_dir}/out.txt", "$${self:share}/out.txt"]]
      }
    }),
  );
}

#[tokio::test]
async fn builds_dependencies_first_and_installs_outputs() {
  let fx = Fixture::new(app_with_dep);
  let (scheduler, ctx) = fx.scheduler(4);

  let report = scheduler.run(&BuildTarget::All).await.unwrap();

  assert!(report.is_success());
  assert_eq!(names(&report.built), vec!["app", "dep"]);

  let app = id_of(&ctx, "app");
  let install = ctx.store.install_dir(ctx.fingerprints.get(&app).unwrap());
  assert_eq!(
    std::fs::read_to_string(install.join("share/out.txt")).unwrap().trim(),
    "from-dep"
  );
  assert!(ctx.store.is_installed(ctx.fingerprints.get(&app).unwrap()));

  let builds = std::fs::read_dir(ctx.store.builds_dir()).unwrap().count();
  assert_eq!(builds, 0, "build directories are removed after building");

  for record in ctx.store.records().snapshot() {
    assert_eq!(record.status, BuildStatus::Built);
  }
}

#[tokio::test]
async fn second_run_uses_cached_installs() {
  let fx = Fixture::new(app_with_dep);
  let (first, _) = fx.scheduler(2);
  first.run(&BuildTarget::All).await.unwrap();

  let (second, _) = fx.scheduler(2);
  let report = second.run(&BuildTarget::All).await.unwrap();

  assert!(report.built.is_empty());
  assert_eq!(names(&report.cached), vec!["app", "dep"]);
}

#[tokio::test]
async fn same_process_rebuild_is_cached() {
  let fx = Fixture::new(app_with_dep);
  let (scheduler, _) = fx.scheduler(2);

  scheduler.run(&BuildTarget::All).await.unwrap();
  let report = scheduler.run(&BuildTarget::All).await.unwrap();

  assert!(report.built.is_empty());
  assert_eq!(report.cached.len(), 2);
}

#[tokio::test]
#[traced_test]
async fn cache_hit_is_logged() {
  let fx = Fixture::new(app_with_dep);
  let (first, _) = fx.scheduler(1);
  first.run(&BuildTarget::All).await.unwrap();

  let (second, _) = fx.scheduler(1);
  second.run(&BuildTarget::All).await.unwrap();

  assert!(logs_contain("using cached build"));
}

#[tokio::test]
async fn modified_install_is_rebuilt() {
  let fx = Fixture::new(app_with_dep);
  let (first, ctx) = fx.scheduler(2);
  first.run(&BuildTarget::All).await.unwrap();

  let dep = id_of(&ctx, "dep");
  let install = ctx.store.install_dir(ctx.fingerprints.get(&dep).unwrap());
  std::fs::write(install.join("bin/extra"), "tampered").unwrap();

  let (second, _) = fx.scheduler(2);
  let report = second.run(&BuildTarget::All).await.unwrap();

  assert_eq!(names(&report.built), vec!["dep"]);
  assert_eq!(names(&report.cached), vec!["app"]);
  assert!(!install.join("bin/extra").exists());
}

#[tokio::test]
async fn dependencies_of_excludes_the_package_itself() {
  let fx = Fixture::new(app_with_dep);
  let (scheduler, ctx) = fx.scheduler(2);
  let app = id_of(&ctx, "app");

  let report = scheduler.run(&BuildTarget::DependenciesOf(app.clone())).await.unwrap();

  assert_eq!(names(&report.built), vec!["dep"]);
  assert!(!ctx.store.is_installed(ctx.fingerprints.get(&app).unwrap()));
}

#[tokio::test]
async fn failure_skips_dependents_but_not_independent_packages() {
  let fx = Fixture::new(|root| {
    manifest(
      root,
      json!({
        "name": "app",
        "dependencies": { "broken": "path:./broken", "fine": "path:./fine" }
      }),
    );
    manifest(
      &root.join("broken"),
      json!({
        "name": "broken",
        "lodge": { "build": ["echo 'cannot build' >&2; exit 3"] }
      }),
    );
    manifest(
      &root.join("fine"),
      json!({ "name": "fine", "lodge": { "install": ["touch $cur__lib/ok"] } }),
    );
  });
  let (scheduler, ctx) = fx.scheduler(4);

  let report = scheduler.run(&BuildTarget::All).await.unwrap();

  assert!(!report.is_success());
  assert_eq!(report.exit_code(), 3);
  assert_eq!(names(&report.built), vec!["fine"]);

  let (failed, err) = &report.failed[0];
  assert_eq!(failed.name, "broken");
  assert!(err.to_string().contains("cannot build"));

  let (skipped, err) = &report.skipped[0];
  assert_eq!(skipped.name, "app");
  assert!(matches!(err, BuildError::DependencyBuildFailed { dependency, .. } if dependency.name == "broken"));

  let broken = id_of(&ctx, "broken");
  let fp = ctx.fingerprints.get(&broken).unwrap();
  assert!(!ctx.store.install_dir(fp).exists(), "partial install is removed");
  assert!(!ctx.store.build_dir(fp).exists());
  assert_eq!(
    ctx.store.records().get(fp).unwrap().status(),
    BuildStatus::Failed
  );
}

#[tokio::test]
async fn missing_program_fails_the_package() {
  let fx = Fixture::new(|root| {
    manifest(
      root,
      json!({ "name": "app", "lodge": { "build": [["definitely-not-a-program-xyz"]] } }),
    );
  });
  let (scheduler, _) = fx.scheduler(1);

  let report = scheduler.run(&BuildTarget::All).await.unwrap();

  assert!(matches!(
    report.first_failure(),
    Some(BuildError::ProgramNotFound { program, .. }) if program == "definitely-not-a-program-xyz"
  ));
  assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn unknown_target_is_rejected() {
  let fx = Fixture::new(app_with_dep);
  let (scheduler, _) = fx.scheduler(1);
  let stranger = PackageId::new("stranger", semver::Version::new(0, 0, 1));

  let err = scheduler.run(&BuildTarget::Package(stranger)).await.unwrap_err();
  assert!(matches!(err, BuildError::UnknownPackage(_)));
}

#[tokio::test]
async fn shutdown_aborts_running_builds() {
  let fx = Fixture::new(|root| {
    manifest(root, json!({ "name": "slow", "lodge": { "build": ["sleep 30"] } }));
  });
  let (scheduler, ctx) = fx.scheduler(1);

  let result = tokio::time::timeout(
    Duration::from_secs(10),
    scheduler.run_until(&BuildTarget::All, tokio::time::sleep(Duration::from_millis(300))),
  )
  .await
  .expect("cancellation should not wait for the build");

  assert!(matches!(result, Err(BuildError::Cancelled)));

  let slow = id_of(&ctx, "slow");
  let fp = ctx.fingerprints.get(&slow).unwrap();
  assert_eq!(ctx.store.records().get(fp).unwrap().status(), BuildStatus::Failed);
  assert!(!ctx.store.build_dir(fp).exists());
  assert!(!ctx.store.install_dir(fp).exists());
}

#[tokio::test]
async fn shutdown_kills_background_processes_of_a_build() {
  let marker_dir = TempDir::new().unwrap();
  let marker = marker_dir.path().join("late");
  let script = format!("(sleep 1; touch '{}') & sleep 30", marker.display());
  let fx = Fixture::new(|root| {
    manifest(root, json!({ "name": "spawner", "lodge": { "build": [script] } }));
  });
  let (scheduler, _ctx) = fx.scheduler(1);

  let result = scheduler
    .run_until(&BuildTarget::All, tokio::time::sleep(Duration::from_millis(300)))
    .await;
  assert!(matches!(result, Err(BuildError::Cancelled)));

  tokio::time::sleep(Duration::from_millis(2000)).await;
  assert!(!marker.exists());
}

#[tokio::test]
async fn single_job_builds_chain_in_order() {
  let fx = Fixture::new(|root| {
    manifest(
      root,
      json!({
        "name": "top",
        "dependencies": { "mid": "path:./mid" },
        "lodge": { "build": ["test -f $mid__lib/mid.txt"] }
      }),
    );
    manifest(
      &root.join("mid"),
      json!({
        "name": "mid",
        "dependencies": { "low": "path:../low" },
        "lodge": { "install": ["test -f $low__lib/low.txt && touch $cur__lib/mid.txt"] }
      }),
    );
    manifest(
      &root.join("low"),
      json!({ "name": "low", "lodge": { "install": ["touch $cur__lib/low.txt"] } }),
    );
  });
  let (scheduler, _) = fx.scheduler(1);

  let report = scheduler.run(&BuildTarget::All).await.unwrap();

  assert!(report.is_success(), "{:?}", report.first_failure());
  assert_eq!(names(&report.built), vec!["low", "mid", "top"]);
}
