//! lodge-lib: package build orchestration.
//!
//! A project is a tree of packages, each described by a `package.json`.
//! This crate resolves that tree into a dependency graph, fingerprints every
//! package, builds packages into a content-addressed store in dependency
//! order and composes the environments commands run in:
//!
//! - `resolve` / `graph`: manifests to an acyclic dependency graph
//! - `fingerprint`: content hashes addressing install prefixes
//! - `env`: build, install and command environment snapshots
//! - `build`: the parallel build scheduler
//! - `project`: the facade the CLI drives

pub mod build;
pub mod config;
pub mod consts;
pub mod env;
pub mod exec;
pub mod fingerprint;
pub mod gc;
pub mod graph;
pub mod manifest;
pub mod placeholder;
pub mod platform;
pub mod project;
pub mod resolve;
pub mod store;
pub mod util;
