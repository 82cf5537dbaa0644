//! Locating and decoding `export.xml` inside an export bundle.
//!
//! Apple Health exports nest the document (`apple_health_export/export.xml`),
//! so the entry is found by a case-insensitive suffix match rather than by
//! an exact name.

use std::io::Read;

use crate::error::PipelineError;

/// Entry suffix that identifies the export document.
pub const EXPORT_DOCUMENT_SUFFIX: &str = "export.xml";

/// Upper bound on the up-front buffer reservation taken from the entry header.
const MAX_PREALLOC_BYTES: u64 = 256 * 1024 * 1024;

/// The decoded export document and the archive path it came from.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub path: String,
    pub text: String,
}

/// Opens `bytes` as a ZIP archive and returns the first entry whose path,
/// lowercased, ends with `export.xml`.
pub fn read_export_document(bytes: &[u8]) -> Result<ExportDocument, PipelineError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::ArchiveFormat(e.to_string()))?;

    let mut found = None;
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| PipelineError::ArchiveFormat(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        if entry.name().to_lowercase().ends_with(EXPORT_DOCUMENT_SUFFIX) {
            found = Some(i);
            break;
        }
    }
    let Some(index) = found else {
        return Err(PipelineError::MissingDocument);
    };

    let mut entry = archive
        .by_index(index)
        .map_err(|e| PipelineError::ArchiveFormat(e.to_string()))?;
    let path = entry.name().to_string();
    let mut raw = Vec::with_capacity(entry.size().min(MAX_PREALLOC_BYTES) as usize);
    entry
        .read_to_end(&mut raw)
        .map_err(|e| PipelineError::Unclassified(format!("reading {}: {}", path, e)))?;

    let mut text = String::from_utf8(raw).map_err(|e| {
        PipelineError::MalformedDocument(format!("{} is not valid UTF-8: {}", path, e))
    })?;
    if text.starts_with('\u{feff}') {
        text.replace_range(..'\u{feff}'.len_utf8(), "");
    }

    tracing::debug!(path = %path, bytes = text.len(), "located export document");
    Ok(ExportDocument { path, text })
}
