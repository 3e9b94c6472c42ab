//! `db-mcp`: read-only SQL over one short-lived PostgreSQL connection per call.

use crate::config::PolicyConfig;
use crate::error::{Result, ToolError};
use crate::policy::check_read_only;
use crate::registry::{
    ArgSpec, Args, RequestContext, ServerDescriptor, ToolDescriptor, ToolHandler, required_str,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sqlx::postgres::PgRow;
use sqlx::{Column, Connection, Executor, PgConnection, Row};
use std::time::Duration;
use tracing::{debug, warn};

struct Query {
    url: String,
    timeout: Duration,
}

impl Query {
    async fn run(&self, sql: &str) -> std::result::Result<Value, ToolError> {
        check_read_only(sql)?;

        let mut conn = tokio::time::timeout(self.timeout, PgConnection::connect(&self.url))
            .await
            .map_err(|_| ToolError::Backend("database connection timed out".into()))??;

        let result = self.execute(&mut conn, sql).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "closing database connection failed");
        }
        result
    }

    async fn execute(
        &self,
        conn: &mut PgConnection,
        sql: &str,
    ) -> std::result::Result<Value, ToolError> {
        sqlx::query("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
            .execute(&mut *conn)
            .await?;
        let statement_timeout = format!("SET statement_timeout = {}", self.timeout.as_millis());
        sqlx::query(&statement_timeout).execute(&mut *conn).await?;

        let rows = match wrap_as_json(sql) {
            Some(wrapped) => {
                sqlx::query_scalar::<_, Value>(&wrapped)
                    .fetch_one(&mut *conn)
                    .await?
            }
            None => {
                let rows = conn.fetch_all(sqlx::raw_sql(sql)).await?;
                let rows = rows
                    .iter()
                    .map(text_row)
                    .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
                Value::Array(rows)
            }
        };
        let row_count = rows.as_array().map_or(0, Vec::len);
        debug!(row_count, "query finished");
        Ok(json!({ "rows": rows, "rowCount": row_count }))
    }
}

/// Aggregate the rows of a single row-returning statement into one JSON array so every column
/// type comes back as JSON.
///
/// Returns `None` for statements that cannot be used as a subquery (`SHOW`, `EXPLAIN`, several
/// statements); those run as-is and come back as text.
fn wrap_as_json(sql: &str) -> Option<String> {
    let inner = sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    let first = inner
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let subquery = matches!(first.as_str(), "select" | "with" | "values" | "table");
    if !subquery || inner.contains(';') {
        return None;
    }
    Some(format!("SELECT COALESCE(json_agg(q), '[]'::json) FROM (\n{inner}\n) AS q"))
}

/// Simple-protocol rows arrive in text format; each column becomes a string or null.
fn text_row(row: &PgRow) -> std::result::Result<Value, sqlx::Error> {
    let mut out = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value: Option<String> = row.try_get_unchecked(i)?;
        out.insert(column.name().to_string(), value.map_or(Value::Null, Value::String));
    }
    Ok(Value::Object(out))
}

#[async_trait]
impl ToolHandler for Query {
    async fn call(
        &self,
        args: Args,
        _ctx: RequestContext,
    ) -> std::result::Result<Value, ToolError> {
        self.run(required_str(&args, "sql")?).await
    }
}

/// # Errors
///
/// Only fails on registry errors; the database is not contacted until the first call.
pub fn server(policy: &PolicyConfig) -> Result<ServerDescriptor> {
    Ok(ServerDescriptor::builder("db-mcp")
        .tool(
            ToolDescriptor::new(
                "query",
                "Run a read-only SQL query",
                vec![ArgSpec::required("sql", "string")],
            ),
            Query {
                url: policy.pg_url.clone(),
                timeout: policy.request_timeout,
            },
        )?
        .build())
}
