//! Manifest types.
//!
//! A package is described by the `package.json` in its directory. Only the
//! fields below are read; everything else in the file is ignored.
//!
//! ```json
//! {
//!   "name": "with-dep-in-source",
//!   "version": "1.0.0",
//!   "dependencies": { "dep": "path:./dep" },
//!   "lodge": {
//!     "build": ["make"],
//!     "install": [["cp", "tool", "$${self:bin}/tool"]],
//!     "exportedEnv": {
//!       "TOOL_HOME": { "val": "$${self:install}", "scope": "global" }
//!     }
//!   }
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  /// Dependency name -> dependency spec, in declaration order.
  #[serde(default)]
  pub dependencies: IndexMap<String, String>,

  #[serde(default)]
  pub lodge: BuildSection,
}

/// The build-related part of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildSection {
  pub build: Vec<CommandSpec>,
  pub install: Vec<CommandSpec>,
  pub build_env: IndexMap<String, EnvDecl>,
  pub exported_env: IndexMap<String, EnvDecl>,
}

/// A single build or install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
  /// Run through the shell (`sh -c`).
  Shell(String),
  /// Spawned directly; the first element is the program.
  Argv(Vec<String>),
}

impl CommandSpec {
  pub fn is_empty(&self) -> bool {
    match self {
      CommandSpec::Shell(cmd) => cmd.trim().is_empty(),
      CommandSpec::Argv(argv) => argv.first().is_none_or(|p| p.is_empty()),
    }
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CommandSpec::Shell(cmd) => write!(f, "{cmd}"),
      CommandSpec::Argv(argv) => write!(f, "{}", argv.join(" ")),
    }
  }
}

/// A declared environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvDecl {
  pub val: String,

  #[serde(default)]
  pub scope: ExportScope,

  #[serde(default)]
  pub merge: MergePolicy,
}

impl EnvDecl {
  pub fn new(val: impl Into<String>) -> Self {
    Self {
      val: val.into(),
      scope: ExportScope::default(),
      merge: MergePolicy::default(),
    }
  }

  pub fn with_scope(mut self, scope: ExportScope) -> Self {
    self.scope = scope;
    self
  }
}

/// Who sees an exported variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportScope {
  /// Every transitive dependent, in all environments.
  #[default]
  Global,
  /// Only the build environment of direct dependents.
  Local,
}

/// How a declared value combines with the value already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
  #[default]
  Override,
  PrependPath,
  AppendPath,
}

/// Where a dependency comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpec {
  /// `path:<dir>`, relative to the declaring package.
  Path(PathBuf),
  /// A semver requirement matched against packages found on the search path.
  Version(semver::VersionReq),
}

impl FromStr for DependencySpec {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if let Some(path) = s.strip_prefix("path:") {
      if path.is_empty() {
        return Err("empty path in dependency spec".to_string());
      }
      return Ok(DependencySpec::Path(PathBuf::from(path)));
    }

    let req = if s.is_empty() { "*" } else { s };
    semver::VersionReq::parse(req)
      .map(DependencySpec::Version)
      .map_err(|e| format!("invalid version requirement '{s}': {e}"))
  }
}

impl fmt::Display for DependencySpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DependencySpec::Path(path) => write!(f, "path:{}", path.display()),
      DependencySpec::Version(req) => write!(f, "{req}"),
    }
  }
}
