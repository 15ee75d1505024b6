use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_installs_every_package() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .arg("build")
    .assert()
    .success()
    .stderr(predicate::str::contains("Built: 2"));

  let installs = env.installs();
  assert_eq!(installs.len(), 2);
  assert!(installs.iter().any(|p| p.join("bin/dep").is_file()));
  assert!(installs.iter().any(|p| p.join("bin/with-dep-in-source").is_file()));
}

#[test]
fn no_subcommand_builds_the_project() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().assert().success();

  assert_eq!(env.installs().len(), 2);
}

#[test]
fn second_build_is_cached() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("build").assert().success();
  env
    .lodge_cmd()
    .arg("build")
    .assert()
    .success()
    .stderr(predicate::str::contains("Built: 0"))
    .stderr(predicate::str::contains("Cached: 2"));
}

#[test]
fn build_single_package_leaves_dependents_alone() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().args(["build", "dep"]).assert().success();

  let installs = env.installs();
  assert_eq!(installs.len(), 1);
  assert!(installs[0].join("bin/dep").is_file());
}

#[test]
fn build_unknown_package_fails() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["build", "nope"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("no package named 'nope'"));
}

#[test]
fn source_change_triggers_rebuild() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("build").assert().success();
  env.write_file("dep/README", "changed\n");

  // The dependency changed, so both fingerprints move.
  env
    .lodge_cmd()
    .arg("build")
    .assert()
    .success()
    .stderr(predicate::str::contains("Built: 2"));
  assert_eq!(env.installs().len(), 4);
}

#[test]
fn failed_build_exits_with_command_code() {
  let env = TestEnv::from_fixture("failing-build");

  env
    .lodge_cmd()
    .arg("build")
    .assert()
    .code(3)
    .stderr(predicate::str::contains("failing-build@0.1.0"))
    .stderr(predicate::str::contains("compiling"))
    .stderr(predicate::function(|stderr: &str| stderr.matches("exit 3` failed").count() == 1));

  assert!(env.installs().is_empty());
}

#[test]
fn failed_dependency_skips_dependent() {
  let env = TestEnv::empty();
  env.write_file(
    "package.json",
    r#"{ "name": "app", "dependencies": { "broken": "path:./broken" } }"#,
  );
  env.write_file(
    "broken/package.json",
    r#"{ "name": "broken", "lodge": { "build": ["exit 5"] } }"#,
  );

  env
    .lodge_cmd()
    .arg("build")
    .assert()
    .code(5)
    .stderr(predicate::str::contains("not built because dependency broken@0.0.0 failed"));
}

#[test]
fn dependency_cycle_is_rejected() {
  let env = TestEnv::empty();
  env.write_file(
    "package.json",
    r#"{ "name": "a", "dependencies": { "b": "path:./b" } }"#,
  );
  env.write_file(
    "b/package.json",
    r#"{ "name": "b", "dependencies": { "a": "path:.." } }"#,
  );

  env
    .lodge_cmd()
    .arg("build")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("dependency cycle"));
}

#[test]
fn project_flag_selects_directory() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .current_dir(env.temp.path())
    .arg("-C")
    .arg(env.project_path())
    .arg("build")
    .assert()
    .success();

  assert_eq!(env.installs().len(), 2);
}

#[test]
fn ls_builds_reports_status() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .arg("ls-builds")
    .assert()
    .success()
    .stdout(predicate::str::contains("with-dep-in-source@1.0.0"))
    .stdout(predicate::str::contains("└── dep@1.0.0"))
    .stdout(predicate::str::contains("pending"));

  env.lodge_cmd().arg("build").assert().success();

  let output = env.lodge_cmd().args(["ls-builds", "--json"]).output().unwrap();
  assert!(output.status.success());
  let statuses: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let statuses = statuses.as_array().unwrap();
  assert_eq!(statuses.len(), 2);
  assert!(statuses.iter().all(|s| s["status"] == "built"));
}
