use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn dependency_binaries_are_on_path_in_every_env() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("build").assert().success();

  env.lodge_cmd().arg("dep").assert().success().stdout("dep\n");
  env.lodge_cmd().args(["b", "dep"]).assert().success().stdout("dep\n");
  env.lodge_cmd().args(["x", "dep"]).assert().success().stdout("dep\n");
  env
    .lodge_cmd()
    .args(["x", "with-dep-in-source"])
    .assert()
    .success()
    .stdout("with-dep-in-source\n");
}

#[test]
fn x_builds_before_running() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["x", "with-dep-in-source"])
    .assert()
    .success()
    .stdout("with-dep-in-source\n");
  assert_eq!(env.installs().len(), 2);
}

#[test]
fn default_command_builds_dependencies_only() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("dep").assert().success().stdout("dep\n");

  let installs = env.installs();
  assert_eq!(installs.len(), 1);
  assert!(installs[0].join("bin/dep").is_file());
}

#[test]
fn project_binary_is_not_in_install_env() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .arg("with-dep-in-source")
    .assert()
    .code(127)
    .stderr(predicate::str::contains("command not found: with-dep-in-source"));
}

#[test]
fn project_binary_shadows_dependency_in_command_env() {
  let env = TestEnv::from_fixture("shadowed-tool");

  env.lodge_cmd().args(["x", "tool"]).assert().success().stdout("from-root\n");
  env.lodge_cmd().arg("tool").assert().success().stdout("from-helper\n");
}

#[test]
fn exit_code_of_command_is_propagated() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().args(["x", "sh", "-c", "exit 7"]).assert().code(7);
}

#[test]
fn command_flags_are_passed_through() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["b", "sh", "-c", "echo $cur__name"])
    .assert()
    .success()
    .stdout("with-dep-in-source\n");
}

#[test]
fn missing_command_exits_127() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["x", "definitely-not-a-real-command"])
    .assert()
    .code(127);
}

#[test]
fn failed_build_prevents_command() {
  let env = TestEnv::from_fixture("failing-build");

  env
    .lodge_cmd()
    .args(["x", "echo", "unreachable"])
    .assert()
    .code(3)
    .stdout(predicate::str::contains("unreachable").not());
}
