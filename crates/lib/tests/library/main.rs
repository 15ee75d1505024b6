//! Tests driving the public `Project` API end to end.

mod common;

#[cfg(unix)]
mod project_tests;
mod resolution_tests;
