//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture project.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

fn copy_dir(from: &Path, to: &Path) {
  std::fs::create_dir_all(to).unwrap();
  for entry in std::fs::read_dir(from).unwrap() {
    let entry = entry.unwrap();
    let target = to.join(entry.file_name());
    if entry.file_type().unwrap().is_dir() {
      copy_dir(&entry.path(), &target);
    } else {
      std::fs::copy(entry.path(), &target).unwrap();
    }
  }
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding a copy of the
/// project and a private store.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Copy the fixture project `name` into a fresh temporary directory.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    copy_dir(&fixture_path(name), &temp.path().join("project"));
    Self { temp }
  }

  /// A temporary directory with no project in it.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("project")).unwrap();
    Self { temp }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.project_path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn project_path(&self) -> PathBuf {
    let p = self.temp.path().join("project");
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Install prefixes currently in the store.
  pub fn installs(&self) -> Vec<PathBuf> {
    match std::fs::read_dir(self.store_path().join("i")) {
      Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
      Err(_) => Vec::new(),
    }
  }

  /// Get a pre-configured Command for the lodge binary.
  ///
  /// Runs inside the project directory against the isolated store, with
  /// every other `LODGE_*` setting cleared.
  pub fn lodge_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("lodge");
    cmd.current_dir(self.project_path());
    cmd.env("LODGE_STORE", self.store_path());
    for var in ["LODGE_JOBS", "LODGE_SOURCE_ROOTS", "LODGE_SYSTEM_PATH", "LODGE_SHELL", "LODGE_LOG"] {
      cmd.env_remove(var);
    }
    cmd
  }
}
