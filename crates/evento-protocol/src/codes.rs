//! Wire error codes.
//!
//! The string values are the contract; the constants exist so server and
//! clients cannot drift on spelling.

pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
pub const AUTH_INVALID: &str = "AUTH_INVALID";
pub const STREAM_VERSION_CONFLICT: &str = "STREAM_VERSION_CONFLICT";
pub const NAMESPACE_EXISTS: &str = "NAMESPACE_EXISTS";
pub const NAMESPACE_NOT_FOUND: &str = "NAMESPACE_NOT_FOUND";
pub const SCHEMA_VALIDATION_FAILED: &str = "SCHEMA_VALIDATION_FAILED";
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
pub const POSITION_EXISTS: &str = "POSITION_EXISTS";
pub const INTERNAL: &str = "INTERNAL";

/// Synthesized by clients for transport-level failures; never sent by the
/// server.
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
