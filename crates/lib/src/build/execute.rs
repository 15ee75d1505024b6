//! Realizing a single package.
//!
//! A package is realized at most once per fingerprint: either a complete
//! install prefix is found in the store, or its sources are copied into a
//! build directory and its build and install commands are run there.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::BuildContext;
use super::cmd::run_command;
use super::types::{BuildError, Outcome};
use crate::consts::SOURCE_EXCLUSIONS;
use crate::env::{EnvKind, Locations, target_dir};
use crate::graph::Package;
use crate::manifest::CommandSpec;
use crate::placeholder::{self, PlaceholderError};
use crate::store::{BuildStatus, Slot, VerifyOutcome, verify_install, write_marker};
use crate::util::fs::copy_tree;

/// Removes a directory when dropped, unless disarmed.
///
/// Covers every exit path of a build, including the future being dropped
/// when the build is cancelled.
struct DirGuard {
  path: PathBuf,
  armed: bool,
}

impl DirGuard {
  fn new(path: PathBuf) -> Self {
    Self { path, armed: true }
  }

  fn disarm(&mut self) {
    self.armed = false;
  }
}

impl Drop for DirGuard {
  fn drop(&mut self) {
    if self.armed && self.path.exists() {
      if let Err(e) = std::fs::remove_dir_all(&self.path) {
        warn!(path = %self.path.display(), error = %e, "failed to remove directory");
      } else {
        debug!(path = %self.path.display(), "removed directory");
      }
    }
  }
}

/// Build `package` unless a complete install of its fingerprint exists.
///
/// The caller has checked that every dependency is built.
pub(super) async fn realize(ctx: &BuildContext, package: &Package, slot: &Slot) -> Result<Outcome, BuildError> {
  let id = &package.id;
  let _build = slot.lock_build().await;

  if slot.built().is_some() {
    debug!(package = %id, "already built in this run");
    return Ok(Outcome::Cached);
  }

  let fingerprint = ctx
    .fingerprints
    .get(id)
    .ok_or_else(|| BuildError::UnknownPackage(id.clone()))?;
  let install_dir = ctx.store.install_dir(fingerprint);

  match verify(install_dir.clone()).await {
    VerifyOutcome::Valid(_) => {
      info!(package = %id, fingerprint = %fingerprint, "using cached build");
      slot.transition(BuildStatus::Built);
      return Ok(Outcome::Cached);
    }
    VerifyOutcome::Invalid(reason) => {
      warn!(package = %id, path = %install_dir.display(), reason = %reason, "removing unusable install");
      tokio::fs::remove_dir_all(&install_dir)
        .await
        .map_err(BuildError::io(id, "failed to remove stale install"))?;
    }
    VerifyOutcome::Absent => {}
  }

  slot.transition(BuildStatus::Building);
  info!(package = %id, fingerprint = %fingerprint, "building");
  if !package.has_build_steps() {
    debug!(package = %id, "no build or install commands");
  }

  let env = ctx.composer.snapshot(id, EnvKind::Build)?;

  let build_dir = ctx.store.build_dir(fingerprint);
  if build_dir.exists() {
    tokio::fs::remove_dir_all(&build_dir)
      .await
      .map_err(BuildError::io(id, "failed to remove leftover build directory"))?;
  }
  let _build_dir_guard = DirGuard::new(build_dir.clone());

  let copied = copy_sources(package.source_path.clone(), build_dir.clone())
    .await
    .map_err(BuildError::io(id, "failed to copy sources"))?;
  debug!(package = %id, files = copied, dir = %build_dir.display(), "copied sources");

  tokio::fs::create_dir_all(target_dir(&build_dir))
    .await
    .map_err(BuildError::io(id, "failed to create target directory"))?;

  let mut install_guard = DirGuard::new(install_dir.clone());
  ctx
    .store
    .layout(fingerprint)
    .create()
    .await
    .map_err(BuildError::io(id, "failed to create install prefix"))?;

  let locations = Locations::new(&ctx.graph, &ctx.fingerprints, &ctx.store, package).building_in(&build_dir);
  let commands = package.build.build.iter().chain(package.build.install.iter());

  for command in commands {
    let command = substitute_command(command, &locations).map_err(|source| BuildError::Placeholder {
      package: id.clone(),
      source,
    })?;
    if command.is_empty() {
      continue;
    }
    run_command(id, &command, &env, &build_dir, ctx.shell.as_deref()).await?;
  }

  write_marker(&install_dir, id)
    .await
    .map_err(|source| BuildError::Marker {
      package: id.clone(),
      source,
    })?;
  install_guard.disarm();

  slot.transition(BuildStatus::Built);
  info!(package = %id, fingerprint = %fingerprint, "build complete");

  Ok(Outcome::Built)
}

/// Substitute placeholders in every part of `command`.
fn substitute_command(command: &CommandSpec, locations: &Locations<'_>) -> Result<CommandSpec, PlaceholderError> {
  Ok(match command {
    CommandSpec::Shell(script) => CommandSpec::Shell(placeholder::substitute(script, locations)?),
    CommandSpec::Argv(argv) => CommandSpec::Argv(
      argv
        .iter()
        .map(|arg| placeholder::substitute(arg, locations))
        .collect::<Result<_, _>>()?,
    ),
  })
}

async fn verify(install_dir: PathBuf) -> VerifyOutcome {
  let fallback = install_dir.clone();
  tokio::task::spawn_blocking(move || verify_install(&install_dir))
    .await
    .unwrap_or_else(|e| VerifyOutcome::Invalid(format!("verification of {} panicked: {e}", fallback.display())))
}

async fn copy_sources(src: PathBuf, dst: PathBuf) -> std::io::Result<u64> {
  tokio::task::spawn_blocking(move || copy_tree(&src, &dst, SOURCE_EXCLUSIONS))
    .await
    .map_err(std::io::Error::other)?
}
