//! End-to-end tests driving the `lodge` binary against fixture projects.

mod common;

#[cfg(unix)]
mod build_tests;
#[cfg(unix)]
mod env_tests;
#[cfg(unix)]
mod exec_tests;
#[cfg(unix)]
mod gc_tests;
