//! Pipeline failure taxonomy.
//!
//! Every variant ends a run. None of them is retried; the caller sees
//! them only as a terminal [`PipelineStatus::Failed`](crate::progress::PipelineStatus).

/// A terminal pipeline failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The input bytes are not a readable ZIP archive.
    ArchiveFormat(String),
    /// No entry path ends with `export.xml`.
    MissingDocument,
    /// The export entry is not well-formed XML.
    MalformedDocument(String),
    /// Nothing survived the type filter.
    NoMatchingRecords,
    /// A batch was rejected by the row store. `batch` is 1-based.
    BatchSubmission { batch: usize, message: String },
    /// Anything else that went wrong while reading, parsing, or filtering.
    Unclassified(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::ArchiveFormat(e) => write!(f, "Could not open ZIP file: {}", e),
            PipelineError::MissingDocument => write!(f, "export.xml not found in ZIP file."),
            PipelineError::MalformedDocument(e) => {
                write!(f, "export.xml is not well-formed XML: {}", e)
            }
            PipelineError::NoMatchingRecords => {
                write!(f, "No matching health records found for the selected types.")
            }
            PipelineError::BatchSubmission { batch, message } => {
                write!(f, "Upload failed on batch {}: {}", batch, message)
            }
            PipelineError::Unclassified(e) => write!(f, "Error processing file: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}
