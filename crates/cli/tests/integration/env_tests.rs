use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_env_has_package_variables() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["env", "--kind", "build"])
    .assert()
    .success()
    .stdout(predicate::str::contains("export cur__name=\"with-dep-in-source\""))
    .stdout(predicate::str::contains("export APP_MODE=\"release\""))
    .stdout(predicate::str::contains("export DEP_GREETING=\"hello from dep\""));
}

#[test]
fn command_env_includes_own_exports() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  let output = env.lodge_cmd().args(["env", "--json"]).output().unwrap();
  assert!(output.status.success());

  let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(snapshot["kind"], "command");
  assert_eq!(snapshot["vars"]["DEP_GREETING"], "hello from dep");

  let app_home = snapshot["vars"]["APP_HOME"].as_str().unwrap();
  let store = env.store_path();
  assert!(app_home.starts_with(store.join("i").to_str().unwrap()));
  assert!(snapshot["vars"].get("APP_MODE").is_none());
}

#[test]
fn install_env_excludes_own_exports() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["env", "--kind", "install"])
    .assert()
    .success()
    .stdout(predicate::str::contains("DEP_GREETING"))
    .stdout(predicate::str::contains("APP_HOME").not());
}

#[test]
fn env_does_not_build() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("env").assert().success();
  assert!(env.installs().is_empty());
}

#[test]
fn unknown_kind_is_rejected() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().args(["env", "--kind", "runtime"]).assert().failure();
}
