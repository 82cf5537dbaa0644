//! Schema for the local SQLite row store.
//!
//! Only the SQLite sink needs this; a remote store manages its own schema.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{is_valid_table_name, Config};
use crate::db;

/// Creates the rows table and its indexes. Idempotent.
pub async fn create_schema(pool: &SqlitePool, table: &str) -> Result<()> {
    if !is_valid_table_name(table) {
        anyhow::bail!("invalid table name: '{}'", table);
    }

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            type TEXT NOT NULL,
            value REAL NOT NULL DEFAULT 0,
            unit TEXT NOT NULL DEFAULT '',
            start_time TEXT,
            end_time TEXT,
            imported_at INTEGER NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_user_type ON {table}(user_id, type)"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_start_time ON {table}(start_time)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    if config.sink.kind != "sqlite" {
        anyhow::bail!(
            "init only applies to the sqlite sink (configured: '{}')",
            config.sink.kind
        );
    }
    let pool = db::connect(&config.db.path).await?;
    create_schema(&pool, &config.pipeline.table).await?;
    pool.close().await;
    Ok(())
}
