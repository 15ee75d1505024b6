//! Test helpers for building throwaway package trees.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::consts::MANIFEST_FILE;

/// Write `content` as the manifest of the package in `dir`.
pub fn write_manifest(dir: &Path, content: &str) {
  std::fs::create_dir_all(dir).unwrap();
  std::fs::write(dir.join(MANIFEST_FILE), content).unwrap();
}

/// Write a package whose install step creates `bin/<bin_name>` printing `output`.
///
/// `dependencies` are `(name, spec)` pairs.
#[cfg(unix)]
pub fn write_package_with_bin(dir: &Path, name: &str, bin_name: &str, output: &str, dependencies: &[(&str, &str)]) {
  let deps: serde_json::Map<String, serde_json::Value> = dependencies
    .iter()
    .map(|(n, s)| (n.to_string(), json!(s)))
    .collect();

  let manifest = json!({
    "name": name,
    "version": "1.0.0",
    "dependencies": deps,
    "lodge": {
      "install": [
        format!("printf '#!/bin/sh\\necho {output}\\n' > \"$cur__bin/{bin_name}\""),
        format!("chmod +x \"$cur__bin/{bin_name}\""),
      ]
    }
  });

  write_manifest(dir, &serde_json::to_string_pretty(&manifest).unwrap());
}

/// Write a package with no build steps.
pub fn write_package(dir: &Path, name: &str, dependencies: &[(&str, &str)]) -> PathBuf {
  let deps: serde_json::Map<String, serde_json::Value> = dependencies
    .iter()
    .map(|(n, s)| (n.to_string(), json!(s)))
    .collect();
  let manifest = json!({ "name": name, "version": "1.0.0", "dependencies": deps });
  write_manifest(dir, &serde_json::to_string_pretty(&manifest).unwrap());
  dir.to_path_buf()
}
