use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::graph::PackageId;
use crate::manifest::MergePolicy;

#[cfg(unix)]
pub const PATH_LIST_SEPARATOR: char = ':';
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';

/// Which projection of a package's environment a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
  /// Isolated environment the package's own build runs in.
  Build,
  /// Caller's environment plus everything the dependencies export globally.
  Install,
  /// The install environment with the package's own installation on top.
  Command,
}

impl EnvKind {
  pub fn as_str(self) -> &'static str {
    match self {
      EnvKind::Build => "build",
      EnvKind::Install => "install",
      EnvKind::Command => "command",
    }
  }
}

impl fmt::Display for EnvKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EnvKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "build" => Ok(EnvKind::Build),
      "install" => Ok(EnvKind::Install),
      "command" => Ok(EnvKind::Command),
      other => Err(format!("unknown environment kind '{other}'")),
    }
  }
}

/// A fully resolved environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvSnapshot {
  pub kind: EnvKind,
  pub package: PackageId,
  pub vars: IndexMap<String, String>,
}

impl EnvSnapshot {
  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(name).map(String::as_str)
  }

  pub fn path(&self) -> Option<&str> {
    self.get("PATH")
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }
}

/// Combine `value` into `vars[name]` according to `policy`.
///
/// Path-like merges do not deduplicate segments.
pub fn merge(vars: &mut IndexMap<String, String>, name: &str, value: String, policy: MergePolicy) {
  let merged = match (policy, vars.get(name)) {
    (MergePolicy::Override, _) => value,
    (MergePolicy::PrependPath, Some(old)) if !old.is_empty() => format!("{value}{PATH_LIST_SEPARATOR}{old}"),
    (MergePolicy::AppendPath, Some(old)) if !old.is_empty() => format!("{old}{PATH_LIST_SEPARATOR}{value}"),
    (MergePolicy::PrependPath | MergePolicy::AppendPath, _) => value,
  };
  vars.insert(name.to_string(), merged);
}

/// Prefix used for a package's namespaced variables.
///
/// `@scope/my-pkg.js` becomes `scope__slash__my_pkg__dot__js`.
pub fn namespace(package_name: &str) -> String {
  let mut ns = String::with_capacity(package_name.len());
  for c in package_name.chars() {
    match c {
      '@' => {}
      '-' => ns.push('_'),
      '/' => ns.push_str("__slash__"),
      '.' => ns.push_str("__dot__"),
      c => ns.extend(c.to_lowercase()),
    }
  }
  ns
}
