//! Error types for the gateway.

use axum::http::StatusCode;
use thiserror::Error;
use toolgate_http_tools::runtime::HttpToolsError;

/// Startup-time errors. Any of these keeps the process from serving traffic.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (bad values, invalid descriptor documents)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Registry errors (duplicate tool names)
    #[error("Registry error: {0}")]
    Registry(String),
}

impl From<HttpToolsError> for GatewayError {
    fn from(e: HttpToolsError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Error returned by a tool handler.
///
/// The variant decides the dispatch status code; the message is returned to the caller as-is.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Missing or mistyped arguments.
    #[error("{0}")]
    InvalidArgs(String),

    /// The call would breach the server's sandbox; nothing reached the backend.
    #[error("{0}")]
    Policy(String),

    /// The backend call failed (network, database, subprocess, upstream status).
    #[error("{0}")]
    Backend(String),
}

impl ToolError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgs(_) => StatusCode::BAD_REQUEST,
            Self::Policy(_) => StatusCode::FORBIDDEN,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgs(_) => "invalid_args",
            Self::Policy(_) => "policy",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<HttpToolsError> for ToolError {
    fn from(e: HttpToolsError) -> Self {
        match e {
            HttpToolsError::InvalidArgs(s) => Self::InvalidArgs(s),
            HttpToolsError::Blocked(s) => Self::Policy(s),
            HttpToolsError::Config(_) | HttpToolsError::Http(_) | HttpToolsError::Transport(_) => {
                Self::Backend(e.to_string())
            }
        }
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<sqlx::Error> for ToolError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => Self::Backend(db.message().to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Result type alias for startup operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
