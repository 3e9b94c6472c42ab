use std::time::{Duration, Instant};

pub async fn wait_pg_ready(database_url: &str, timeout: Duration) -> anyhow::Result<()> {
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            anyhow::bail!("timed out waiting for Postgres");
        }

        if sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .is_ok()
        {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Create a small fixture table.
pub async fn seed(database_url: &str) -> anyhow::Result<()> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    for stmt in [
        "CREATE TABLE orders (id INT PRIMARY KEY, total NUMERIC, placed_at TIMESTAMPTZ DEFAULT now())",
        "INSERT INTO orders (id, total) VALUES (1, 9.50), (2, 20), (3, 4.25)",
    ] {
        sqlx::query(stmt).execute(&pool).await?;
    }
    pool.close().await;
    Ok(())
}
