//! Import orchestration.
//!
//! One call to [`Importer::import`] runs the whole flow:
//!
//! ```text
//! ZIP bytes → export.xml → XML tree → RawRecord* → HealthRow* → batches → sink
//! ```
//!
//! Archive reading, parsing, and filtering are CPU-bound and run on the
//! blocking pool. Batches are submitted from the calling task. Every
//! failure is turned into a terminal [`PipelineStatus`]; `import` itself
//! never returns an error.
//!
//! Calls on the same [`Importer`] are serialized: a second import waits
//! until the first has reached a terminal status, so status updates from
//! two runs never interleave.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::archive::read_export_document;
use crate::config::Config;
use crate::document::parse_document;
use crate::error::PipelineError;
use crate::loader::{batch_count, load_rows};
use crate::models::HealthRow;
use crate::normalize::{normalize_records, AllowList};
use crate::progress::{PipelineStatus, Stage, StatusReporter};
use crate::records::extract_records;
use crate::sink::RowSink;

/// Fixed per-importer settings.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub table: String,
    pub batch_size: usize,
    pub allow: AllowList,
    /// Debug-only cap on admitted records.
    pub record_limit: Option<usize>,
}

impl ImportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            table: config.pipeline.table.clone(),
            batch_size: config.pipeline.batch_size,
            allow: config.pipeline.allow_list(),
            record_limit: config.debug.limit(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Stop after filtering; no rows are submitted.
    pub dry_run: bool,
    /// Overrides [`ImportSettings::record_limit`] when set.
    pub limit: Option<usize>,
}

/// What a finished import looked like.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub status: PipelineStatus,
    /// Archive path of the export document, once located.
    pub document_path: Option<String>,
    /// All `<Record>` elements seen, before filtering.
    pub records_seen: usize,
    /// Rows that survived filtering and truncation.
    pub total_rows: usize,
    pub inserted: usize,
    pub batches_submitted: usize,
}

impl ImportOutcome {
    fn failed(failure: PrepareFailure) -> Self {
        Self {
            status: PipelineStatus::Failed(failure.error),
            document_path: failure.document_path,
            records_seen: failure.records_seen,
            total_rows: 0,
            inserted: 0,
            batches_submitted: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.status.is_failure()
    }
}

struct Prepared {
    document_path: String,
    records_seen: usize,
    rows: Vec<HealthRow>,
}

/// A failed preparation, with whatever was learned before it stopped.
struct PrepareFailure {
    error: PipelineError,
    document_path: Option<String>,
    records_seen: usize,
}

impl From<PipelineError> for PrepareFailure {
    fn from(error: PipelineError) -> Self {
        Self {
            error,
            document_path: None,
            records_seen: 0,
        }
    }
}

impl PrepareFailure {
    fn at(error: PipelineError, document_path: &str, records_seen: usize) -> Self {
        Self {
            error,
            document_path: Some(document_path.to_string()),
            records_seen,
        }
    }
}

fn prepare(
    bytes: &[u8],
    settings: &ImportSettings,
    owner_id: &str,
    limit: Option<usize>,
    reporter: &dyn StatusReporter,
) -> Result<Prepared, PrepareFailure> {
    reporter.report(&PipelineStatus::Processing(Stage::ReadingArchive));
    let export = read_export_document(bytes)?;

    reporter.report(&PipelineStatus::Processing(Stage::Parsing));
    let records = {
        let doc = parse_document(&export.text).map_err(|e| PrepareFailure::at(e, &export.path, 0))?;
        extract_records(&doc)
    };
    drop(export.text);
    let records_seen = records.len();

    reporter.report(&PipelineStatus::Processing(Stage::Filtering));
    let rows = normalize_records(records, &settings.allow, owner_id, limit)
        .map_err(|e| PrepareFailure::at(e, &export.path, records_seen))?;
    tracing::info!(
        path = %export.path,
        records_seen,
        rows = rows.len(),
        "export filtered"
    );

    Ok(Prepared {
        document_path: export.path,
        records_seen,
        rows,
    })
}

/// Runs imports against one sink, one at a time.
pub struct Importer {
    settings: Arc<ImportSettings>,
    sink: Arc<dyn RowSink>,
    reporter: Arc<dyn StatusReporter>,
    gate: Mutex<()>,
}

impl Importer {
    pub fn new(
        settings: ImportSettings,
        sink: Arc<dyn RowSink>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            sink,
            reporter,
            gate: Mutex::new(()),
        }
    }

    /// Imports one export bundle on behalf of `owner_id`.
    ///
    /// `owner_id` is captured once here and stamped on every row.
    pub async fn import(&self, bytes: Vec<u8>, owner_id: &str, options: &ImportOptions) -> ImportOutcome {
        let _running = self.gate.lock().await;

        let outcome = self.run(bytes, owner_id.to_string(), options).await;
        self.reporter.report(&outcome.status);
        match &outcome.status {
            PipelineStatus::Failed(e) => tracing::warn!(error = %e, "import failed"),
            status => tracing::info!(status = %status, "import finished"),
        }
        outcome
    }

    async fn run(&self, bytes: Vec<u8>, owner_id: String, options: &ImportOptions) -> ImportOutcome {
        let settings = Arc::clone(&self.settings);
        let reporter = Arc::clone(&self.reporter);
        let limit = options.limit.or(settings.record_limit);

        let prepared = tokio::task::spawn_blocking(move || {
            prepare(&bytes, &settings, &owner_id, limit, reporter.as_ref())
        })
        .await;

        let prepared = match prepared {
            Ok(Ok(p)) => p,
            Ok(Err(e)) => return ImportOutcome::failed(e),
            Err(join_err) => {
                tracing::error!(error = %join_err, "import worker did not complete");
                return ImportOutcome::failed(PipelineError::Unclassified(join_err.to_string()).into());
            }
        };

        let total_rows = prepared.rows.len();
        let batch_size = self.settings.batch_size.max(1);
        let batches = batch_count(total_rows, batch_size);
        let mut outcome = ImportOutcome {
            status: PipelineStatus::Planned {
                rows: total_rows,
                batches,
            },
            document_path: Some(prepared.document_path),
            records_seen: prepared.records_seen,
            total_rows,
            inserted: 0,
            batches_submitted: 0,
        };
        if options.dry_run {
            return outcome;
        }

        match load_rows(
            self.sink.as_ref(),
            &self.settings.table,
            &prepared.rows,
            batch_size,
            self.reporter.as_ref(),
        )
        .await
        {
            Ok(inserted) => {
                outcome.inserted = inserted;
                outcome.batches_submitted = batches;
                outcome.status = PipelineStatus::Done { inserted };
            }
            Err(e) => {
                if let PipelineError::BatchSubmission { batch, .. } = &e {
                    outcome.batches_submitted = batch - 1;
                    outcome.inserted = (batch - 1) * batch_size;
                }
                outcome.status = PipelineStatus::Failed(e);
            }
        }
        outcome
    }
}
