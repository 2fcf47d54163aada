//! CSV transaction import: streaming parse, validation, batch persistence
//!
//! The staged file is read on a blocking thread with the csv crate and rows
//! flow through a bounded channel into the async consumer, which classifies
//! each row, flushes fixed-size batches to the store and emits progress
//! events. Memory stays bounded by the channel capacity plus one batch per
//! partition regardless of file size.
//!
//! Row format (semicolon-separated, header always skipped):
//! `amount;currency;description`. Line numbers are 1-based and count the
//! header, so the first data row is line 2.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::queries;
use crate::services::cancellation::CancellationRegistry;
use crate::services::notifier::Notifier;
use crate::types::{ImportEvent, ImportSummary, NewImportError, NewTransaction};

/// A progress event is emitted after every this many accepted rows
const PROGRESS_INTERVAL: u64 = 50;

/// Rows per bulk insert; bounds both memory and store round trips
const FLUSH_SIZE: usize = 500;

/// Capacity of the reader → consumer channel (back-pressure on the reader)
const ROW_CHANNEL_CAPACITY: usize = 256;

/// One raw data row as read from the file
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based, counting the header line
    pub line_number: u64,
    pub fields: Vec<String>,
}

/// Outcome of validating a single row
enum RowOutcome {
    Accepted(NewTransaction),
    Rejected(NewImportError),
}

/// Stream the staged file, classify every data row and persist both
/// partitions in chunks. Returns the final counts.
///
/// Cancellation is observed between rows; a cancelled job aborts with an
/// error so the runner records it as failed.
pub async fn process_file(
    pool: &PgPool,
    notifier: &Notifier,
    cancellations: &CancellationRegistry,
    path: PathBuf,
    job_id: Uuid,
    project_id: Uuid,
    owner: Option<Uuid>,
) -> Result<ImportSummary> {
    let (tx, mut rx) = mpsc::channel::<RawRow>(ROW_CHANNEL_CAPACITY);
    let mut reader = tokio::task::spawn_blocking(move || read_rows(path, tx));

    let mut accepted_batch: Vec<NewTransaction> = Vec::with_capacity(FLUSH_SIZE);
    let mut rejected_batch: Vec<NewImportError> = Vec::with_capacity(FLUSH_SIZE);
    let mut summary = ImportSummary::default();

    while let Some(row) = rx.recv().await {
        if cancellations.is_cancelled(&job_id) {
            // Closing the receiver stops the reader thread at its next send
            rx.close();
            let _ = (&mut reader).await;
            anyhow::bail!("import cancelled");
        }

        match validate_row(&row) {
            RowOutcome::Accepted(transaction) => {
                summary.accepted += 1;
                accepted_batch.push(transaction);

                if summary.accepted % PROGRESS_INTERVAL == 0 {
                    notifier.notify(
                        owner,
                        ImportEvent::Progress {
                            job_id,
                            accepted: summary.accepted,
                            rejected: summary.rejected,
                            line_number: row.line_number,
                        },
                    );
                }
            }
            RowOutcome::Rejected(error) => {
                summary.rejected += 1;
                notifier.notify(
                    owner,
                    ImportEvent::Error {
                        job_id,
                        line_number: error.line_number,
                        message: error.error_message.clone(),
                        line_text: error.line_text.clone(),
                    },
                );
                rejected_batch.push(error);
            }
        }

        if accepted_batch.len() >= FLUSH_SIZE {
            queries::transaction::insert_many(pool, job_id, project_id, &accepted_batch)
                .await
                .context("Failed to flush accepted rows")?;
            accepted_batch.clear();
        }
        if rejected_batch.len() >= FLUSH_SIZE {
            queries::import_error::insert_many(pool, job_id, &rejected_batch)
                .await
                .context("Failed to flush rejected rows")?;
            rejected_batch.clear();
        }
    }

    // A reader error is fatal to the job, even after rows were consumed
    reader
        .await
        .context("CSV reader thread panicked")?
        .context("Failed to read staged file")?;

    queries::transaction::insert_many(pool, job_id, project_id, &accepted_batch)
        .await
        .context("Failed to flush accepted rows")?;
    queries::import_error::insert_many(pool, job_id, &rejected_batch)
        .await
        .context("Failed to flush rejected rows")?;

    Ok(summary)
}

/// Blocking reader: streams data rows into the channel one at a time.
/// Returns `Ok` when the consumer hangs up early; that is not a read error.
fn read_rows(path: PathBuf, tx: mpsc::Sender<RawRow>) -> Result<(), csv::Error> {
    let file = std::fs::File::open(&path).map_err(csv::Error::from)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut line_number: u64 = 1; // the header line
    for result in reader.records() {
        let record = result?;
        line_number += 1;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if tx.blocking_send(RawRow { line_number, fields }).is_err() {
            return Ok(());
        }
    }

    Ok(())
}

/// Validate one data row against the fixed `amount;currency;description`
/// layout. Missing trailing columns count as empty; all field errors for the
/// row are collected, not just the first.
fn validate_row(row: &RawRow) -> RowOutcome {
    let amount_raw = row.fields.first().map(String::as_str).unwrap_or("");
    let currency_raw = row.fields.get(1).map(String::as_str).unwrap_or("");
    let description = row.fields.get(2).map(String::as_str).unwrap_or("");

    let mut errors: Vec<&str> = Vec::new();

    let amount = match amount_raw.trim().parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push("Amount must be a valid number");
            None
        }
    };

    let currency = currency_raw.trim();
    if currency.is_empty() {
        errors.push("Currency is required");
    }

    if errors.is_empty() {
        RowOutcome::Accepted(NewTransaction {
            amount: amount.unwrap_or_default(),
            currency: currency.to_string(),
            description: description.to_string(),
        })
    } else {
        RowOutcome::Rejected(NewImportError {
            line_text: row.fields.join(";"),
            line_number: row.line_number as i32,
            error_message: errors.join("; "),
        })
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn row(line_number: u64, fields: &[&str]) -> RawRow {
        RawRow {
            line_number,
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn collect_rows(content: &str) -> (Vec<RawRow>, Result<(), csv::Error>) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let (tx, mut rx) = mpsc::channel(1024);
        let result = read_rows(file.path().to_path_buf(), tx);

        let mut rows = Vec::new();
        while let Ok(row) = rx.try_recv() {
            rows.push(row);
        }
        (rows, result)
    }

    // ── validation ─────────────────────────────────────────────────────────

    #[test]
    fn test_valid_row_is_accepted() {
        let outcome = validate_row(&row(2, &["12.50", "CZK", "groceries"]));
        match outcome {
            RowOutcome::Accepted(t) => {
                assert_eq!(t.amount, 12.5);
                assert_eq!(t.currency, "CZK");
                assert_eq!(t.description, "groceries");
            }
            RowOutcome::Rejected(_) => panic!("expected accepted row"),
        }
    }

    #[test]
    fn test_description_defaults_to_empty() {
        match validate_row(&row(2, &["-3.10", "EUR"])) {
            RowOutcome::Accepted(t) => assert_eq!(t.description, ""),
            RowOutcome::Rejected(_) => panic!("expected accepted row"),
        }
    }

    #[test]
    fn test_currency_is_trimmed() {
        match validate_row(&row(2, &["1", "  usd  ", ""])) {
            RowOutcome::Accepted(t) => assert_eq!(t.currency, "usd"),
            RowOutcome::Rejected(_) => panic!("expected accepted row"),
        }
    }

    #[test]
    fn test_bad_amount_is_rejected_with_line_number() {
        match validate_row(&row(4, &["abc", "CZK", "lunch"])) {
            RowOutcome::Rejected(e) => {
                assert_eq!(e.line_number, 4);
                assert_eq!(e.error_message, "Amount must be a valid number");
                assert_eq!(e.line_text, "abc;CZK;lunch");
            }
            RowOutcome::Accepted(_) => panic!("expected rejected row"),
        }
    }

    #[test]
    fn test_missing_currency_is_rejected() {
        match validate_row(&row(2, &["5.00", "   ", "coffee"])) {
            RowOutcome::Rejected(e) => {
                assert_eq!(e.error_message, "Currency is required");
            }
            RowOutcome::Accepted(_) => panic!("expected rejected row"),
        }
    }

    #[test]
    fn test_multiple_errors_are_concatenated() {
        match validate_row(&row(3, &["abc", ""])) {
            RowOutcome::Rejected(e) => {
                assert_eq!(
                    e.error_message,
                    "Amount must be a valid number; Currency is required"
                );
            }
            RowOutcome::Accepted(_) => panic!("expected rejected row"),
        }
    }

    #[test]
    fn test_empty_amount_is_rejected() {
        match validate_row(&row(2, &["", "CZK"])) {
            RowOutcome::Rejected(e) => {
                assert_eq!(e.error_message, "Amount must be a valid number");
            }
            RowOutcome::Accepted(_) => panic!("expected rejected row"),
        }
    }

    // ── reader ─────────────────────────────────────────────────────────────

    #[test]
    fn test_reader_skips_header_and_numbers_from_two() {
        let (rows, result) =
            collect_rows("amount;currency;description\n1;CZK;a\n2;CZK;b\n");
        result.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line_number, 2);
        assert_eq!(rows[1].line_number, 3);
        assert_eq!(rows[0].fields, vec!["1", "CZK", "a"]);
    }

    #[test]
    fn test_reader_tolerates_missing_trailing_columns() {
        let (rows, result) = collect_rows("amount;currency;description\n1;CZK\n");
        result.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields, vec!["1", "CZK"]);
    }

    #[test]
    fn test_reader_fails_on_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let result = read_rows(PathBuf::from("/nonexistent/import.csv"), tx);
        assert!(result.is_err());
    }

    // ── scenario: 4 data rows, lines 2 and 4 invalid ───────────────────────

    #[test]
    fn test_classification_partitions_every_row() {
        let content = "amount;currency;description\n\
                       abc;CZK;bad\n\
                       10;CZK;ok\n\
                       xyz;CZK;bad\n\
                       20;CZK;ok\n";
        let (rows, result) = collect_rows(content);
        result.unwrap();
        assert_eq!(rows.len(), 4);

        let mut accepted = 0u64;
        let mut rejected_lines = Vec::new();
        for row in &rows {
            match validate_row(row) {
                RowOutcome::Accepted(_) => accepted += 1,
                RowOutcome::Rejected(e) => rejected_lines.push(e.line_number),
            }
        }

        assert_eq!(accepted, 2);
        assert_eq!(rejected_lines, vec![2, 4]);
        // every row in exactly one partition
        assert_eq!(accepted as usize + rejected_lines.len(), rows.len());
    }
}
