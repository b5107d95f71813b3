//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - config file unreadable or invalid
pub const CONFIG_ERROR: i32 = 2;

/// Render error - class files unreadable or templates invalid
pub const RENDER_ERROR: i32 = 3;

/// Sweep finished but some objects could not be reconciled
pub const PARTIAL_FAILURE: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Cluster unavailable - no credentials or API server unreachable (sysexits EX_UNAVAILABLE)
pub const CLUSTER_UNAVAILABLE: i32 = 69;
