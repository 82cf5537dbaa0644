use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::normalize::{AllowList, DEFAULT_ALLOWED_TYPES};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub rest: Option<RestConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            batch_size: default_batch_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_table() -> String {
    "health_data".to_string()
}
fn default_batch_size() -> usize {
    5000
}
fn default_allowed_types() -> Vec<String> {
    DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect()
}

impl PipelineConfig {
    pub fn allow_list(&self) -> AllowList {
        AllowList::new(self.allowed_types.iter().cloned())
    }
}

/// Debug-only knobs. `record_limit = 0` means no limit.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    #[serde(default)]
    pub record_limit: usize,
}

impl DebugConfig {
    pub fn limit(&self) -> Option<usize> {
        (self.record_limit > 0).then_some(self.record_limit)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
        }
    }
}

fn default_sink_kind() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/health.sqlite")
}

/// PostgREST-compatible endpoint (e.g. a Supabase project).
#[derive(Debug, Deserialize, Clone)]
pub struct RestConfig {
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Env var holding the signed-in user's access token. Falls back to
    /// the API key when unset.
    #[serde(default)]
    pub access_token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "HKLOAD_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// Plain SQL identifier check; the table name is interpolated into SQL.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("pipeline.batch_size must be > 0");
        }

        if self.pipeline.allowed_types.is_empty() {
            anyhow::bail!("pipeline.allowed_types must list at least one record type");
        }

        if !is_valid_table_name(&self.pipeline.table) {
            anyhow::bail!(
                "pipeline.table '{}' must be a plain identifier (letters, digits, underscore)",
                self.pipeline.table
            );
        }

        match self.sink.kind.as_str() {
            "sqlite" => {}
            "rest" => {
                let rest = self
                    .rest
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("[rest] section is required when sink.kind is 'rest'"))?;
                if rest.url.trim().is_empty() {
                    anyhow::bail!("rest.url must not be empty");
                }
            }
            other => anyhow::bail!("Unknown sink kind: '{}'. Must be sqlite or rest.", other),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.pipeline.table, "health_data");
        assert_eq!(config.pipeline.batch_size, 5000);
        assert_eq!(config.pipeline.allow_list().len(), 9);
        assert_eq!(config.debug.limit(), None);
        assert_eq!(config.sink.kind, "sqlite");
    }

    #[test]
    fn debug_limit_is_opt_in() {
        let config = parse("[debug]\nrecord_limit = 2000\n").unwrap();
        assert_eq!(config.debug.limit(), Some(2000));
    }

    #[test]
    fn rejects_zero_batch_size() {
        assert!(parse("[pipeline]\nbatch_size = 0\n").is_err());
    }

    #[test]
    fn rejects_empty_allow_list() {
        assert!(parse("[pipeline]\nallowed_types = []\n").is_err());
    }

    #[test]
    fn rejects_unsafe_table_name() {
        assert!(parse("[pipeline]\ntable = \"health; DROP TABLE x\"\n").is_err());
        assert!(is_valid_table_name("health_data"));
        assert!(is_valid_table_name("_t2"));
        assert!(!is_valid_table_name("2t"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn rest_sink_requires_section() {
        assert!(parse("[sink]\nkind = \"rest\"\n").is_err());
        let config = parse("[sink]\nkind = \"rest\"\n[rest]\nurl = \"https://example.supabase.co\"\n").unwrap();
        let rest = config.rest.unwrap();
        assert_eq!(rest.api_key_env, "HKLOAD_API_KEY");
        assert_eq!(rest.timeout_secs, 30);
    }

    #[test]
    fn rejects_unknown_sink() {
        assert!(parse("[sink]\nkind = \"kafka\"\n").is_err());
    }
}
