//! Sandbox rules shared by the tool kinds.
//!
//! The outbound HTTP allowlist lives in `toolgate_http_tools::safety`; this module holds the
//! local-resource policies.

pub mod paths;
pub mod sql;

pub use paths::PathSandbox;
pub use sql::check_read_only;
