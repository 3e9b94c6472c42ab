//! Read-only SQL guard.
//!
//! A query is rejected if it contains any data- or schema-modifying keyword anywhere in its
//! text, in any letter case, including inside identifiers such as `created_at`. The check runs
//! before a database connection is opened.

use crate::error::ToolError;
use regex::Regex;
use std::sync::LazyLock;

static WRITE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(insert|update|delete|alter|drop|create|grant|revoke|truncate)")
        .expect("static keyword pattern is valid")
});

/// Reject queries that could modify the database.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArgs`] for an empty query and [`ToolError::Policy`] if a write
/// keyword is present.
pub fn check_read_only(sql: &str) -> Result<(), ToolError> {
    if sql.trim().is_empty() {
        return Err(ToolError::InvalidArgs("sql required".into()));
    }
    if let Some(m) = WRITE_KEYWORDS.find(sql) {
        tracing::warn!(keyword = %m.as_str(), "rejected write query");
        return Err(ToolError::Policy("write queries are disabled".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::check_read_only;
    use crate::error::ToolError;

    #[test]
    fn drop_is_rejected_in_any_case() {
        for q in [
            "SELECT 1; DROP TABLE users;",
            "SELECT 1; Drop TABLE users;",
            "SELECT 1; drop TABLE users;",
        ] {
            assert!(
                matches!(check_read_only(q), Err(ToolError::Policy(_))),
                "{q} must be rejected"
            );
        }
    }

    #[test]
    fn every_write_keyword_is_rejected() {
        for kw in [
            "insert", "update", "delete", "alter", "drop", "create", "grant", "revoke", "truncate",
        ] {
            let q = format!("{kw} something");
            assert!(check_read_only(&q).is_err(), "{kw}");
            assert!(check_read_only(&q.to_uppercase()).is_err(), "{kw} upper");
        }
    }

    #[test]
    fn keywords_inside_identifiers_and_literals_are_rejected() {
        for q in [
            "SELECT created_at FROM t",
            "select updated_by from audit",
            "SELECT * FROM t WHERE status = 'DROPped'",
        ] {
            assert!(
                matches!(check_read_only(q), Err(ToolError::Policy(_))),
                "{q} must be rejected"
            );
        }
    }

    #[test]
    fn plain_reads_are_allowed() {
        check_read_only("SELECT id, total FROM orders WHERE total > 10").expect("read query");
        check_read_only("SHOW server_version").expect("read query");
        check_read_only("EXPLAIN SELECT 1").expect("read query");
    }

    #[test]
    fn empty_query_is_invalid_args() {
        assert!(matches!(check_read_only("  "), Err(ToolError::InvalidArgs(_))));
    }
}
