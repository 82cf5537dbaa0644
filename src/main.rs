//! # Health Ingest CLI (`hkload`)
//!
//! ## Usage
//!
//! ```bash
//! hkload --config ./config/hkload.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hkload init` | Create the SQLite database and rows table |
//! | `hkload import <zip>` | Import an Apple Health export bundle |
//! | `hkload types` | List the record types that will be imported |
//! | `hkload stats` | Summarize rows in the SQLite store |
//!
//! Set `RUST_LOG=debug` for diagnostic logs on stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use health_ingest::config::{self, Config};
use health_ingest::pipeline::{ImportOptions, ImportSettings, Importer};
use health_ingest::progress::ProgressMode;
use health_ingest::{migrate, sink, stats};

/// Import Apple Health export bundles into a row store.
#[derive(Parser)]
#[command(name = "hkload", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hkload.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and rows table.
    ///
    /// Idempotent. Only valid with `sink.kind = "sqlite"`.
    Init,

    /// Import an export bundle (a `.zip` containing `export.xml`).
    Import {
        /// Path to the export archive.
        archive: PathBuf,

        /// Owner id stamped on every row. Overrides `identity.owner_id`.
        #[arg(long)]
        owner: Option<String>,

        /// Import at most this many matching records (debugging aid).
        #[arg(long)]
        limit: Option<usize>,

        /// Read, parse and filter, then report counts without writing.
        #[arg(long)]
        dry_run: bool,

        /// Status output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List the record types that will be imported.
    Types,

    /// Summarize rows in the SQLite store.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Commands::Types = cli.command {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            Config::default()
        };
        for t in cfg.pipeline.allow_list().iter() {
            println!("{}", t);
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            archive,
            owner,
            limit,
            dry_run,
            progress,
        } => {
            run_import(&cfg, archive, owner, limit, dry_run, progress).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Types => unreachable!(),
    }

    Ok(())
}

async fn run_import(
    cfg: &Config,
    archive: PathBuf,
    owner: Option<String>,
    limit: Option<usize>,
    dry_run: bool,
    progress: Option<ProgressMode>,
) -> anyhow::Result<()> {
    let owner_id = owner
        .or_else(|| cfg.identity.owner_id.clone())
        .context("No owner id: pass --owner or set identity.owner_id")?;

    let bytes = tokio::fs::read(&archive)
        .await
        .with_context(|| format!("Failed to read {}", archive.display()))?;

    let row_sink: Arc<dyn sink::RowSink> = Arc::from(sink::build_sink(cfg).await?);
    let reporter = progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();
    let importer = Importer::new(ImportSettings::from_config(cfg), Arc::clone(&row_sink), Arc::from(reporter));

    let options = ImportOptions { dry_run, limit };
    let outcome = importer.import(bytes, &owner_id, &options).await;

    println!("import {}{}", archive.display(), if dry_run { " (dry-run)" } else { "" });
    if let Some(path) = &outcome.document_path {
        println!("  document: {}", path);
    }
    println!("  records seen: {}", outcome.records_seen);
    println!("  rows matched: {}", outcome.total_rows);
    if !dry_run {
        println!("  sink: {}", row_sink.name());
        println!("  batches submitted: {}", outcome.batches_submitted);
        println!("  inserted: {}", outcome.inserted);
    }

    if outcome.is_success() {
        println!("{}", outcome.status);
        Ok(())
    } else {
        anyhow::bail!("{}", outcome.status)
    }
}
