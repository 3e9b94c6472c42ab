//! Tool kinds and server selection.
//!
//! A process serves exactly one [`ToolKind`], chosen at startup. [`build_server`] turns the kind
//! and the [`PolicyConfig`] into the immutable [`ServerDescriptor`] the protocol layer serves.

pub mod db;
pub mod fetch;
pub mod fs;
pub mod git;
pub mod proxy;

use crate::config::PolicyConfig;
use crate::error::{GatewayError, Result};
use crate::registry::ServerDescriptor;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Fetch,
    Fs,
    N8n,
    Pm,
    Git,
    Db,
    Stripe,
}

impl ToolKind {
    pub const ALL: [Self; 7] = [
        Self::Fetch,
        Self::Fs,
        Self::N8n,
        Self::Pm,
        Self::Git,
        Self::Db,
        Self::Stripe,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Fs => "fs",
            Self::N8n => "n8n",
            Self::Pm => "pm",
            Self::Git => "git",
            Self::Db => "db",
            Self::Stripe => "stripe",
        }
    }

    /// Name announced in the discovery `schema` event.
    #[must_use]
    pub fn server_name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch-mcp",
            Self::Fs => "fs-mcp",
            Self::N8n => "n8n-mcp",
            Self::Pm => "pm-mcp",
            Self::Git => "git-mcp",
            Self::Db => "db-mcp",
            Self::Stripe => "stripe-mcp",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| GatewayError::Config(format!("Unknown MCP_KIND: {wanted}")))
    }
}

/// Build the single server this process exposes.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] when the kind's configuration is unusable (bad roots,
/// invalid descriptor document, HTTP client setup failure).
pub fn build_server(kind: ToolKind, policy: &PolicyConfig) -> Result<ServerDescriptor> {
    match kind {
        ToolKind::Fetch => fetch::server(policy),
        ToolKind::Fs => fs::server(policy),
        ToolKind::Db => db::server(policy),
        ToolKind::Git => git::server(policy),
        ToolKind::N8n | ToolKind::Pm | ToolKind::Stripe => proxy::server(kind, policy),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("git".parse::<ToolKind>().expect("git"), ToolKind::Git);
        assert_eq!(" FETCH ".parse::<ToolKind>().expect("fetch"), ToolKind::Fetch);
        assert_eq!("Stripe".parse::<ToolKind>().expect("stripe"), ToolKind::Stripe);
        for kind in ToolKind::ALL {
            assert_eq!(kind.to_string().parse::<ToolKind>().expect("round trip"), kind);
        }
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let err = "ftp".parse::<ToolKind>().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Unknown MCP_KIND: ftp");
    }

    #[test]
    fn every_kind_builds_a_named_server() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_str().expect("utf8 path");
        let policy = test_policy::policy(root, false);
        for kind in ToolKind::ALL {
            let server = build_server(kind, &policy).expect("server builds");
            assert_eq!(server.name(), kind.server_name());
            assert!(!server.tools().is_empty(), "{kind} has tools");
        }
    }
}
