//! Row classification types for CSV imports
//!
//! Every data row of an import file ends up as exactly one of these two:
//! a parsed transaction or a rejected row with its line number and the full
//! set of field errors.

use serde::{Deserialize, Serialize};

/// A validated, typed transaction row awaiting bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub amount: f64,
    pub currency: String,
    pub description: String,
}

/// A row that failed validation.
///
/// `line_text` is the raw row re-serialized with the `;` separator for
/// traceability. `line_number` is 1-based and counts the header line, so the
/// first data row is line 2. `error_message` aggregates all field errors for
/// the row, joined with "; ".
#[derive(Debug, Clone, PartialEq)]
pub struct NewImportError {
    pub line_text: String,
    pub line_number: i32,
    pub error_message: String,
}

/// Final counts for a finished import run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub accepted: u64,
    pub rejected: u64,
}

impl ImportSummary {
    /// Data rows observed (header excluded).
    pub fn total_rows(&self) -> u64 {
        self.accepted + self.rejected
    }
}
