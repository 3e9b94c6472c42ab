//! HTTP semantics helpers.
//!
//! Declarative proxy tools are gated on their method: only GET runs without write mode.

use reqwest::Method;

/// Parse a configured method name (case-insensitive, surrounding whitespace ignored).
///
/// Returns `None` if the string is not a valid HTTP method token.
#[must_use]
pub fn parse_method(method: &str) -> Option<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).ok()
}

/// `true` only for GET. Every other method requires write mode.
#[must_use]
pub fn is_read_only(method: &Method) -> bool {
    method == Method::GET
}
