use serde_json::json;

use lodge_lib::env::EnvKind;
use lodge_lib::project::{Project, ProjectError};
use lodge_lib::resolve::ResolveError;

use super::common::Workspace;

#[test]
fn cycles_are_rejected() {
  let ws = Workspace::new();
  ws.package("project", json!({ "name": "a", "dependencies": { "b": "path:./b" } }));
  ws.package("project/b", json!({ "name": "b", "dependencies": { "a": "path:.." } }));

  let err = Project::load(&ws.project_dir(), ws.config()).unwrap_err();
  assert!(matches!(
    err,
    ProjectError::Resolve(ResolveError::Cycle { ref chain }) if chain == "a -> b -> a"
  ));
  assert_eq!(err.exit_code(), 1);
}

#[test]
fn version_dependencies_come_from_source_roots() {
  let ws = Workspace::new();
  ws.package("roots/util", json!({ "name": "util", "version": "1.4.0" }));
  ws.package("project", json!({ "name": "app", "dependencies": { "util": "^1.2" } }));

  let config = ws.config().with_source_roots(vec![ws.path("roots")]);
  let project = Project::load(&ws.project_dir(), config).unwrap();

  let util = project.graph().by_name("util").unwrap();
  assert_eq!(util.version().to_string(), "1.4.0");
}

#[test]
fn node_modules_is_searched_before_source_roots() {
  let ws = Workspace::new();
  ws.package("roots/util", json!({ "name": "util", "version": "1.0.0" }));
  ws.package("project/node_modules/util", json!({ "name": "util", "version": "1.1.0" }));
  ws.package("project", json!({ "name": "app", "dependencies": { "util": "1" } }));

  let config = ws.config().with_source_roots(vec![ws.path("roots")]);
  let project = Project::load(&ws.project_dir(), config).unwrap();

  assert_eq!(project.graph().by_name("util").unwrap().version().to_string(), "1.1.0");
}

#[test]
fn unmatched_version_is_reported_with_search_locations() {
  let ws = Workspace::new();
  ws.package("roots/util", json!({ "name": "util", "version": "2.0.0" }));
  ws.package("project", json!({ "name": "app", "dependencies": { "util": "^1" } }));

  let config = ws.config().with_source_roots(vec![ws.path("roots")]);
  let err = Project::load(&ws.project_dir(), config).unwrap_err();

  let message = err.to_string();
  assert!(message.contains("cannot resolve dependency 'util'"), "{message}");
  assert!(message.contains("version 2.0.0 does not match"), "{message}");
}

#[test]
fn discover_walks_up_to_the_project() {
  let ws = Workspace::new();
  ws.package("project", json!({ "name": "app" }));
  let nested = ws.path("project/src/deep");
  std::fs::create_dir_all(&nested).unwrap();

  let root = Project::discover(&nested).unwrap();
  assert_eq!(
    dunce::canonicalize(root).unwrap(),
    dunce::canonicalize(ws.project_dir()).unwrap()
  );
}

#[test]
fn build_env_is_isolated_from_the_caller() {
  let ws = Workspace::new();
  ws.package(
    "project",
    json!({ "name": "app", "lodge": { "buildEnv": { "CC": { "val": "clang" } } } }),
  );
  let project = ws.load();

  let build = project.snapshot(EnvKind::Build).unwrap();
  assert_eq!(build.get("CC"), Some("clang"));
  assert_eq!(build.get("cur__name"), Some("app"));
  assert_eq!(build.get("HOME"), Some("/homeless-shelter"));

  let command = project.snapshot(EnvKind::Command).unwrap();
  assert_eq!(command.get("CC"), None);
  assert_eq!(command.get("app__name"), Some("app"));
}
