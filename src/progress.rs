//! Import status reporting.
//!
//! The pipeline emits a [`PipelineStatus`] at every state transition:
//!
//! ```text
//! Idle → Processing(reading) → Processing(parsing) → Processing(filtering)
//!      → Uploading(i/n)* → Done | Failed
//! ```
//!
//! Status is emitted on **stderr** so stdout remains parseable for scripts.
//! Hosts that want to drive their own display use [`ChannelStatus`].

use std::io::Write;

use tokio::sync::mpsc;

use crate::error::PipelineError;

/// Processing sub-stage before any rows are submitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    ReadingArchive,
    Parsing,
    Filtering,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::ReadingArchive => "reading archive",
            Stage::Parsing => "parsing",
            Stage::Filtering => "filtering",
        }
    }
}

/// Observable state of one import invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineStatus {
    Idle,
    Processing(Stage),
    /// Batch `batch` of `batches` was accepted; `inserted` rows so far.
    Uploading {
        batch: usize,
        batches: usize,
        inserted: usize,
        total: usize,
    },
    /// Dry run finished: this many rows would be sent in this many batches.
    Planned { rows: usize, batches: usize },
    Done { inserted: usize },
    Failed(PipelineError),
}

impl PipelineStatus {
    /// Done, Failed and Planned end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Done { .. } | PipelineStatus::Failed(_) | PipelineStatus::Planned { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineStatus::Failed(_))
    }

    fn phase(&self) -> &'static str {
        match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Processing(_) => "processing",
            PipelineStatus::Uploading { .. } => "uploading",
            PipelineStatus::Planned { .. } => "planned",
            PipelineStatus::Done { .. } => "done",
            PipelineStatus::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Idle => write!(f, "No file uploaded yet"),
            PipelineStatus::Processing(stage) => write!(f, "Processing file… {}", stage.as_str()),
            PipelineStatus::Uploading {
                inserted, total, ..
            } => write!(f, "Uploading… {} / {}", inserted, total),
            PipelineStatus::Planned { rows, batches } => write!(
                f,
                "Dry run: {} health records in {} batches",
                rows, batches
            ),
            PipelineStatus::Done { inserted } => {
                write!(f, "✅ Uploaded {} health records", inserted)
            }
            PipelineStatus::Failed(e) => write!(f, "❌ {}", e),
        }
    }
}

/// Receives status updates. Called synchronously from the pipeline.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: &PipelineStatus);
}

/// Human-friendly status on stderr: "import  Uploading… 5000 / 12000".
pub struct StderrStatus;

impl StatusReporter for StderrStatus {
    fn report(&self, status: &PipelineStatus) {
        let line = format!("import  {}\n", status);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable status: one JSON object per line on stderr.
pub struct JsonStatus;

impl StatusReporter for JsonStatus {
    fn report(&self, status: &PipelineStatus) {
        let mut obj = serde_json::json!({
            "event": "status",
            "phase": status.phase(),
            "message": status.to_string(),
        });
        match status {
            PipelineStatus::Processing(stage) => {
                obj["stage"] = stage.as_str().into();
            }
            PipelineStatus::Uploading {
                batch,
                batches,
                inserted,
                total,
            } => {
                obj["batch"] = (*batch).into();
                obj["batches"] = (*batches).into();
                obj["inserted"] = (*inserted).into();
                obj["total"] = (*total).into();
            }
            PipelineStatus::Planned { rows, batches } => {
                obj["rows"] = (*rows).into();
                obj["batches"] = (*batches).into();
            }
            PipelineStatus::Done { inserted } => {
                obj["inserted"] = (*inserted).into();
            }
            _ => {}
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when status output is disabled.
pub struct NoStatus;

impl StatusReporter for NoStatus {
    fn report(&self, _status: &PipelineStatus) {}
}

/// Forwards every status to an unbounded channel.
///
/// A closed receiver is ignored; the pipeline keeps running.
pub struct ChannelStatus {
    tx: mpsc::UnboundedSender<PipelineStatus>,
}

impl ChannelStatus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelStatus {
    fn report(&self, status: &PipelineStatus) {
        let _ = self.tx.send(status.clone());
    }
}

/// Status mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human status when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn StatusReporter> {
        match self {
            ProgressMode::Off => Box::new(NoStatus),
            ProgressMode::Human => Box::new(StderrStatus),
            ProgressMode::Json => Box::new(JsonStatus),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(PipelineStatus::Idle.to_string(), "No file uploaded yet");
        assert_eq!(
            PipelineStatus::Processing(Stage::Parsing).to_string(),
            "Processing file… parsing"
        );
        assert_eq!(
            PipelineStatus::Uploading {
                batch: 1,
                batches: 3,
                inserted: 5000,
                total: 12000
            }
            .to_string(),
            "Uploading… 5000 / 12000"
        );
        assert_eq!(
            PipelineStatus::Done { inserted: 12000 }.to_string(),
            "✅ Uploaded 12000 health records"
        );
        assert_eq!(
            PipelineStatus::Failed(PipelineError::MissingDocument).to_string(),
            "❌ export.xml not found in ZIP file."
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!PipelineStatus::Idle.is_terminal());
        assert!(!PipelineStatus::Processing(Stage::Filtering).is_terminal());
        assert!(PipelineStatus::Done { inserted: 0 }.is_terminal());
        assert!(PipelineStatus::Failed(PipelineError::NoMatchingRecords).is_terminal());
        assert!(PipelineStatus::Failed(PipelineError::NoMatchingRecords).is_failure());
    }

    #[tokio::test]
    async fn channel_reporter_forwards_in_order() {
        let (reporter, mut rx) = ChannelStatus::new();
        reporter.report(&PipelineStatus::Idle);
        reporter.report(&PipelineStatus::Done { inserted: 2 });
        assert_eq!(rx.recv().await, Some(PipelineStatus::Idle));
        assert_eq!(rx.recv().await, Some(PipelineStatus::Done { inserted: 2 }));
    }

    #[test]
    fn channel_reporter_ignores_closed_receiver() {
        let (reporter, rx) = ChannelStatus::new();
        drop(rx);
        reporter.report(&PipelineStatus::Idle);
    }
}
