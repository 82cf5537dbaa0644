//! Ordered, fail-fast batch submission.
//!
//! Rows go out in consecutive slices of at most `batch_size`, one
//! `insert` at a time. The task yields between batches so other work on
//! the runtime (a UI, a server) keeps making progress during long uploads.
//! The first rejected batch stops the run; batches already accepted stay
//! in the store.

use crate::error::PipelineError;
use crate::models::HealthRow;
use crate::progress::{PipelineStatus, StatusReporter};
use crate::sink::RowSink;

/// Number of batches `total` rows split into.
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

/// Submits `rows` to `sink` and returns the number inserted.
pub async fn load_rows(
    sink: &dyn RowSink,
    table: &str,
    rows: &[HealthRow],
    batch_size: usize,
    reporter: &dyn StatusReporter,
) -> Result<usize, PipelineError> {
    let batch_size = batch_size.max(1);
    let total = rows.len();
    let batches = batch_count(total, batch_size);
    let mut inserted = 0usize;

    for (i, chunk) in rows.chunks(batch_size).enumerate() {
        let batch = i + 1;
        if let Err(e) = sink.insert(table, chunk).await {
            tracing::error!(batch, batches, sink = sink.name(), error = %e, "batch rejected");
            return Err(PipelineError::BatchSubmission {
                batch,
                message: format!("{:#}", e),
            });
        }

        inserted += chunk.len();
        tracing::debug!(batch, batches, inserted, total, "batch accepted");
        reporter.report(&PipelineStatus::Uploading {
            batch,
            batches,
            inserted,
            total,
        });

        tokio::task::yield_now().await;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoStatus;
    use crate::sink::InMemorySink;

    fn rows(n: usize) -> Vec<HealthRow> {
        (0..n)
            .map(|i| HealthRow {
                owner_id: "o".to_string(),
                record_type: "A".to_string(),
                value: i as f64,
                unit: String::new(),
                start_time: None,
                end_time: None,
            })
            .collect()
    }

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(batch_count(0, 5), 0);
        assert_eq!(batch_count(5, 5), 1);
        assert_eq!(batch_count(6, 5), 2);
        assert_eq!(batch_count(12_000, 5000), 3);
    }

    #[tokio::test]
    async fn splits_into_ceil_batches() {
        let sink = InMemorySink::new();
        let data = rows(12_000);
        let n = load_rows(&sink, "t", &data, 5000, &NoStatus).await.unwrap();
        assert_eq!(n, 12_000);
        assert_eq!(sink.batch_sizes("t"), vec![5000, 5000, 2000]);
        assert_eq!(sink.rows("t"), data);
    }

    #[tokio::test]
    async fn exact_multiple_has_full_last_batch() {
        let sink = InMemorySink::new();
        load_rows(&sink, "t", &rows(10), 5, &NoStatus).await.unwrap();
        assert_eq!(sink.batch_sizes("t"), vec![5, 5]);
    }

    #[tokio::test]
    async fn stops_on_first_failure() {
        let sink = InMemorySink::failing_on(2, "payload too large");
        let err = load_rows(&sink, "t", &rows(25), 10, &NoStatus).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::BatchSubmission {
                batch: 2,
                message: "payload too large".to_string()
            }
        );
        assert_eq!(sink.calls(), 2);
        assert_eq!(sink.batch_sizes("t"), vec![10]);
    }
}
