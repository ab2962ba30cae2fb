//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Input error - invalid owner reference or option value
pub const INPUT_ERROR: i32 = 2;

/// Manifest error - unreadable document or unmanaged kind
pub const MANIFEST_ERROR: i32 = 3;

/// Cluster error - connection, discovery or owner lookup failed
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Reconcile error - at least one object could not be reconciled
pub const RECONCILE_ERROR: i32 = 6;

/// Config error - invalid configuration file
pub const CONFIG_ERROR: i32 = 78;
