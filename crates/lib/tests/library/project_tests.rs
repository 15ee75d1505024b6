use std::future::pending;

use serde_json::json;

use lodge_lib::build::BuildTarget;
use lodge_lib::env::EnvKind;
use lodge_lib::project::{Project, ProjectError};
use lodge_lib::store::{BuildStatus, LockMode, StoreLock};

use super::common::{Workspace, argv, read, tool_package};

fn with_dep_in_source(ws: &Workspace) {
  ws.package("project/dep", tool_package("dep", "dep", "dep", json!({})));
  ws.package(
    "project",
    tool_package(
      "with-dep-in-source",
      "with-dep-in-source",
      "with-dep-in-source",
      json!({ "dep": "path:./dep" }),
    ),
  );
}

#[tokio::test]
async fn commands_see_binaries_of_the_selected_environment() {
  let ws = Workspace::new();
  with_dep_in_source(&ws);
  let project = ws.load();
  let out = ws.path("out");
  std::fs::create_dir_all(&out).unwrap();

  let report = project.build(&BuildTarget::All).await.unwrap();
  assert_eq!(report.built.len(), 2);

  let cases = [
    (EnvKind::Install, "dep", "dep"),
    (EnvKind::Build, "dep", "dep"),
    (EnvKind::Command, "dep", "dep"),
    (EnvKind::Command, "with-dep-in-source", "with-dep-in-source"),
  ];
  for (i, (kind, program, expected)) in cases.into_iter().enumerate() {
    let target = out.join(format!("{i}.txt"));
    let script = format!("{program} > '{}'", target.display());
    let code = project
      .exec(kind, &argv(&["sh", "-c", &script]), &out, pending())
      .await
      .unwrap();
    assert_eq!(code, 0, "{kind} {program}");
    assert_eq!(read(&target).trim(), expected);
  }
}

#[tokio::test]
async fn rebuilding_an_unchanged_project_is_a_no_op() {
  let ws = Workspace::new();
  with_dep_in_source(&ws);

  let first_project = ws.load();
  let first = first_project.build(&BuildTarget::All).await.unwrap();
  assert_eq!(first.built.len(), 2);

  let project = ws.load();
  let second = project.build(&BuildTarget::All).await.unwrap();
  assert!(second.built.is_empty());
  assert_eq!(second.cached.len(), 2);

  assert!(project.statuses().iter().all(|s| s.status == BuildStatus::Built));

  for kind in [EnvKind::Build, EnvKind::Install, EnvKind::Command] {
    assert_eq!(
      first_project.snapshot(kind).unwrap(),
      project.snapshot(kind).unwrap(),
      "{kind} environment changed"
    );
  }
}

#[tokio::test]
async fn exec_of_a_built_project_ignores_a_held_store_lock() {
  let ws = Workspace::new();
  with_dep_in_source(&ws);
  let project = ws.load();
  project.build(&BuildTarget::All).await.unwrap();

  let _held = StoreLock::acquire(&ws.store_dir(), LockMode::Exclusive, "build").unwrap();

  for kind in [EnvKind::Build, EnvKind::Install, EnvKind::Command] {
    let code = project
      .exec(kind, &argv(&["sh", "-c", "exit 0"]), &ws.project_dir(), pending())
      .await
      .unwrap();
    assert_eq!(code, 0);
  }
}

#[tokio::test]
async fn exec_waits_for_the_store_lock_when_it_must_build() {
  let ws = Workspace::new();
  with_dep_in_source(&ws);
  let project = ws.load();

  let held = StoreLock::acquire(&ws.store_dir(), LockMode::Exclusive, "build").unwrap();
  let release = std::thread::spawn(move || {
    std::thread::sleep(std::time::Duration::from_millis(300));
    drop(held);
  });

  let code = project
    .exec(EnvKind::Command, &argv(&["with-dep-in-source"]), &ws.project_dir(), pending())
    .await
    .unwrap();
  assert_eq!(code, 0);
  release.join().unwrap();
}

#[test]
fn fingerprints_follow_dependency_changes() {
  let ws = Workspace::new();
  with_dep_in_source(&ws);
  let before = ws.load();
  let fp = |project: &Project, name: &str| {
    let id = project.package_id(name).unwrap();
    project.fingerprints().get(&id).unwrap().clone()
  };

  let mut dep = tool_package("dep", "dep", "dep", json!({}));
  dep["lodge"]["buildEnv"] = json!({ "OPT_LEVEL": { "val": "3" } });
  ws.package("project/dep", dep);
  let after = ws.load();

  assert_ne!(fp(&before, "dep"), fp(&after, "dep"));
  assert_ne!(fp(&before, "with-dep-in-source"), fp(&after, "with-dep-in-source"));
}

#[tokio::test]
async fn failing_dependency_reports_its_exit_code() {
  let ws = Workspace::new();
  ws.package(
    "project/broken",
    json!({ "name": "broken", "lodge": { "build": ["exit 9"] } }),
  );
  ws.package("project", json!({ "name": "app", "dependencies": { "broken": "path:./broken" } }));
  let project = ws.load();

  let err = project.build(&BuildTarget::All).await.unwrap_err();
  assert_eq!(err.exit_code(), 9);
  let ProjectError::BuildFailed(report) = err else {
    panic!("expected a build failure");
  };
  assert_eq!(report.failed.len(), 1);
  assert_eq!(report.skipped.len(), 1);

  let statuses = project.statuses();
  let app = statuses.iter().find(|s| s.name == "app").unwrap();
  assert_eq!(app.status, BuildStatus::Failed);
}

#[tokio::test]
async fn gc_keeps_what_the_project_uses() {
  let ws = Workspace::new();
  with_dep_in_source(&ws);
  let project = ws.load();
  project.build(&BuildTarget::All).await.unwrap();

  let stale = ws.store_dir().join("i").join("stale");
  std::fs::create_dir_all(&stale).unwrap();

  let result = project.gc(false).unwrap();
  assert_eq!(result.stats.installs_deleted, 1);
  assert!(!stale.exists());

  let rebuilt = ws.load().build(&BuildTarget::All).await.unwrap();
  assert!(rebuilt.built.is_empty());
}
