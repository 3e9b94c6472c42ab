//! Shared outbound-HTTP pieces for toolgate servers.
//!
//! Used by:
//! - the `fetch` server (domain allowlist, bounded body reads, redaction)
//! - the declarative proxy servers (`n8n`, `pm`, `stripe`, or any descriptor document)
//!
//! It contains **no** knowledge of the dispatch protocol or the tool registry.

pub mod config;
pub mod runtime;
pub mod safety;
pub mod semantics;
