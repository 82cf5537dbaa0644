//! Row stores the batch loader submits to.
//!
//! The pipeline only sees [`RowSink::insert`]: one call per batch, which
//! either succeeds as a whole or returns a descriptive error. Payload
//! limits and request timeouts belong to the sink.
//!
//! | Sink | Backend |
//! |------|---------|
//! | [`SqliteSink`] | Local SQLite file (`hkload init` creates the table) |
//! | [`RestSink`] | PostgREST-style HTTP endpoint, e.g. a Supabase project |
//! | [`InMemorySink`] | Records calls in memory |

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::{is_valid_table_name, Config};
use crate::db;
use crate::models::HealthRow;

/// Bulk-insert capability.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Short label used in logs and CLI output.
    fn name(&self) -> &str;

    /// Inserts `rows` into `table` in a single call.
    async fn insert(&self, table: &str, rows: &[HealthRow]) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// SQLite
// ═══════════════════════════════════════════════════════════════════════

/// Writes each batch inside one transaction.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RowSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, table: &str, rows: &[HealthRow]) -> Result<()> {
        if !is_valid_table_name(table) {
            anyhow::bail!("invalid table name: '{}'", table);
        }
        let sql = format!(
            "INSERT INTO {} (id, user_id, type, value, unit, start_time, end_time, imported_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            table
        );
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(&row.owner_id)
                .bind(&row.record_type)
                .bind(row.value)
                .bind(&row.unit)
                .bind(&row.start_time)
                .bind(&row.end_time)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// REST
// ═══════════════════════════════════════════════════════════════════════

/// `POST {base_url}/rest/v1/{table}` with a JSON array body.
pub struct RestSink {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: String,
}

impl RestSink {
    pub fn new(
        base_url: &str,
        api_key: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let access_token = access_token.unwrap_or_else(|| api_key.clone());
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            access_token,
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

/// Pulls `message` out of a PostgREST error body, else the raw body.
fn rest_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    match message {
        Some(m) => m,
        None if body.trim().is_empty() => format!("HTTP {}", status),
        None => format!("HTTP {}: {}", status, body.trim()),
    }
}

#[async_trait]
impl RowSink for RestSink {
    fn name(&self) -> &str {
        "rest"
    }

    async fn insert(&self, table: &str, rows: &[HealthRow]) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(rest_error_message(status, &body))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════════════════════════════════

/// Keeps every accepted batch, per table, in call order.
///
/// [`InMemorySink::failing_on`] makes the n-th call (1-based) fail.
#[derive(Default)]
pub struct InMemorySink {
    batches: Mutex<HashMap<String, Vec<Vec<HealthRow>>>>,
    calls: Mutex<usize>,
    fail_on_call: Option<(usize, String)>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize, message: impl Into<String>) -> Self {
        Self {
            fail_on_call: Some((call, message.into())),
            ..Self::default()
        }
    }

    /// Number of `insert` calls issued, including a failed one.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sizes of accepted batches for `table`, in order.
    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        let batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        batches
            .get(table)
            .map(|b| b.iter().map(Vec::len).collect())
            .unwrap_or_default()
    }

    /// All accepted rows for `table`, flattened in submission order.
    pub fn rows(&self, table: &str) -> Vec<HealthRow> {
        let batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        batches
            .get(table)
            .map(|b| b.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RowSink for InMemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, table: &str, rows: &[HealthRow]) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            *calls += 1;
            *calls
        };
        if let Some((n, message)) = &self.fail_on_call {
            if *n == call {
                anyhow::bail!("{}", message);
            }
        }
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(table.to_string())
            .or_default()
            .push(rows.to_vec());
        Ok(())
    }
}

/// Builds the sink selected by `sink.kind`.
pub async fn build_sink(config: &Config) -> Result<Box<dyn RowSink>> {
    match config.sink.kind.as_str() {
        "sqlite" => {
            let pool = db::connect(&config.db.path).await?;
            Ok(Box::new(SqliteSink::new(pool)))
        }
        "rest" => {
            let rest = config
                .rest
                .as_ref()
                .context("[rest] section is required when sink.kind is 'rest'")?;
            let api_key = std::env::var(&rest.api_key_env)
                .with_context(|| format!("{} is not set", rest.api_key_env))?;
            let access_token = match &rest.access_token_env {
                Some(var) => Some(
                    std::env::var(var).with_context(|| format!("{} is not set", var))?,
                ),
                None => None,
            };
            let sink = RestSink::new(
                &rest.url,
                api_key,
                access_token,
                Duration::from_secs(rest.timeout_secs),
            )?;
            Ok(Box::new(sink))
        }
        other => anyhow::bail!("Unknown sink kind: '{}'", other),
    }
}
