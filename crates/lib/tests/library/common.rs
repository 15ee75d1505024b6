//! Shared helpers for building throwaway projects.

use std::path::{Path, PathBuf};

use lodge_lib::config::Config;
use lodge_lib::project::Project;
use serde_json::{Value, json};
use tempfile::TempDir;

/// A temporary workspace holding a project tree and a private store.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  pub fn project_dir(&self) -> PathBuf {
    self.path("project")
  }

  pub fn store_dir(&self) -> PathBuf {
    self.path("store")
  }

  /// Write `manifest` as `<relative>/package.json`.
  pub fn package(&self, relative: &str, manifest: Value) -> PathBuf {
    let dir = self.path(relative);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("package.json"), serde_json::to_string_pretty(&manifest).unwrap()).unwrap();
    dir
  }

  pub fn config(&self) -> Config {
    Config::default()
      .with_store_dir(self.store_dir())
      .with_jobs(2)
  }

  pub fn load(&self) -> Project {
    Project::load(&self.project_dir(), self.config()).unwrap()
  }
}

/// Manifest of a package whose install step creates `bin/<bin>` printing `output`.
pub fn tool_package(name: &str, bin: &str, output: &str, dependencies: Value) -> Value {
  json!({
    "name": name,
    "version": "1.0.0",
    "dependencies": dependencies,
    "lodge": {
      "install": [
        format!("printf '#!/bin/sh\\necho {output}\\n' > \"$cur__bin/{bin}\""),
        format!("chmod +x \"$cur__bin/{bin}\""),
      ]
    }
  })
}

pub fn argv(words: &[&str]) -> Vec<String> {
  words.iter().map(|w| w.to_string()).collect()
}

pub fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap()
}
