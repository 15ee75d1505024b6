use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn gc_with_empty_store_succeeds() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .arg("gc")
    .assert()
    .success()
    .stderr(predicate::str::contains("Garbage collection complete"));
}

#[test]
fn gc_keeps_live_installs() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("build").assert().success();
  env
    .lodge_cmd()
    .arg("gc")
    .assert()
    .success()
    .stderr(predicate::str::contains("Installs removed: 0"));

  assert_eq!(env.installs().len(), 2);
  env.lodge_cmd().args(["x", "dep"]).assert().success().stdout("dep\n");
}

#[test]
fn gc_removes_stale_installs() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env.lodge_cmd().arg("build").assert().success();
  let stale = env.store_path().join("i").join("0000stale");
  std::fs::create_dir_all(stale.join("bin")).unwrap();

  env
    .lodge_cmd()
    .arg("gc")
    .assert()
    .success()
    .stderr(predicate::str::contains("Installs removed: 1"));

  assert!(!stale.exists());
  assert_eq!(env.installs().len(), 2);
}

#[test]
fn gc_dry_run_lists_without_deleting() {
  let env = TestEnv::from_fixture("with-dep-in-source");
  let stale = env.store_path().join("i").join("0000stale");
  std::fs::create_dir_all(&stale).unwrap();

  env
    .lodge_cmd()
    .args(["gc", "--dry-run"])
    .assert()
    .success()
    .stderr(predicate::str::contains("Dry run"))
    .stdout(predicate::str::contains("0000stale"));

  assert!(stale.exists());
}

#[test]
fn gc_json_output_is_valid() {
  let env = TestEnv::from_fixture("with-dep-in-source");

  env
    .lodge_cmd()
    .args(["gc", "--json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("installs_deleted"))
    .stdout(predicate::str::contains("deleted_paths"));
}
