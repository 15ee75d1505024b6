//! Crate-wide constants.

pub const APP_NAME: &str = "lodge";

/// Name of the manifest file in every package directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Number of hex characters kept from a SHA-256 digest for fingerprints.
pub const FINGERPRINT_LEN: usize = 20;

/// Marker file written into an install prefix once its build succeeded.
pub const BUILD_COMPLETE_MARKER: &str = ".lodge-complete";

/// Source entries that are never copied into build directories nor hashed.
pub const SOURCE_EXCLUSIONS: &[&str] = &[".git", "node_modules", "_build", "_lodge"];

pub const DEFAULT_SYSTEM_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch)
pub const SOURCE_DATE_EPOCH: &str = "315532800";

pub const ENV_STORE: &str = "LODGE_STORE";
pub const ENV_JOBS: &str = "LODGE_JOBS";
pub const ENV_SOURCE_ROOTS: &str = "LODGE_SOURCE_ROOTS";
pub const ENV_SYSTEM_PATH: &str = "LODGE_SYSTEM_PATH";
pub const ENV_SHELL: &str = "LODGE_SHELL";
