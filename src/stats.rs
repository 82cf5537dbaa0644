//! Row store summary.
//!
//! `hkload stats` shows what has been imported into the local SQLite
//! store: total rows, rows per owner, rows per record type, and when the
//! last batch landed.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::{is_valid_table_name, Config};
use crate::db;

/// Row counts for one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeStats {
    pub record_type: String,
    pub rows: i64,
    pub first_start: Option<String>,
    pub last_start: Option<String>,
}

/// Aggregate view of the rows table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub total_rows: i64,
    pub owners: i64,
    pub last_import_ts: Option<i64>,
    pub by_type: Vec<TypeStats>,
}

pub async fn collect_stats(pool: &SqlitePool, table: &str) -> Result<StoreStats> {
    if !is_valid_table_name(table) {
        anyhow::bail!("invalid table name: '{}'", table);
    }

    let totals = sqlx::query(&format!(
        "SELECT COUNT(*) AS total, COUNT(DISTINCT user_id) AS owners, MAX(imported_at) AS last_ts FROM {}",
        table
    ))
    .fetch_one(pool)
    .await?;

    let type_rows = sqlx::query(&format!(
        r#"
        SELECT type, COUNT(*) AS n, MIN(start_time) AS first_start, MAX(start_time) AS last_start
        FROM {}
        GROUP BY type
        ORDER BY n DESC, type ASC
        "#,
        table
    ))
    .fetch_all(pool)
    .await?;

    let by_type = type_rows
        .iter()
        .map(|row| TypeStats {
            record_type: row.get("type"),
            rows: row.get("n"),
            first_start: row.get("first_start"),
            last_start: row.get("last_start"),
        })
        .collect();

    Ok(StoreStats {
        total_rows: totals.get("total"),
        owners: totals.get("owners"),
        last_import_ts: totals.get("last_ts"),
        by_type,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    if config.sink.kind != "sqlite" {
        anyhow::bail!(
            "stats only applies to the sqlite sink (configured: '{}')",
            config.sink.kind
        );
    }
    let pool = db::connect(&config.db.path).await?;
    let stats = collect_stats(&pool, &config.pipeline.table).await?;

    println!("Health Import: Store Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Table:       {}", config.pipeline.table);
    println!("  Rows:        {}", stats.total_rows);
    println!("  Owners:      {}", stats.owners);
    println!(
        "  Last import: {}",
        stats
            .last_import_ts
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!(
            "  {:<48} {:>8}   {:<26} {}",
            "TYPE", "ROWS", "FIRST START", "LAST START"
        );
        println!("  {}", "-".repeat(112));
        for t in &stats.by_type {
            println!(
                "  {:<48} {:>8}   {:<26} {}",
                t.record_type,
                t.rows,
                t.first_start.as_deref().unwrap_or("-"),
                t.last_start.as_deref().unwrap_or("-")
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
