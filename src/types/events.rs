//! Real-time import events
//!
//! Events are serialized as JSON objects tagged by `event` and published to
//! the owning user's subject. Ordering within one job is `started`, then any
//! number of `progress`/`error`, then exactly one of `completed`/`failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One lifecycle or progress event for a running import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ImportEvent {
    /// Emitted once, before parsing begins.
    #[serde(rename = "import:started")]
    #[serde(rename_all = "camelCase")]
    Started { job_id: Uuid, file_name: String },

    /// Emitted after every 50 accepted rows; counts are cumulative.
    #[serde(rename = "import:progress")]
    #[serde(rename_all = "camelCase")]
    Progress {
        job_id: Uuid,
        accepted: u64,
        rejected: u64,
        line_number: u64,
    },

    /// Emitted once per rejected row.
    #[serde(rename = "import:error")]
    #[serde(rename_all = "camelCase")]
    Error {
        job_id: Uuid,
        line_number: i32,
        message: String,
        line_text: String,
    },

    /// Terminal: the job finished and both row partitions are flushed.
    #[serde(rename = "import:completed")]
    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: Uuid,
        accepted: u64,
        rejected: u64,
    },

    /// Terminal: the job failed; no synchronous signal reaches the uploader.
    #[serde(rename = "import:failed")]
    #[serde(rename_all = "camelCase")]
    Failed { job_id: Uuid, error: String },
}

impl ImportEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            ImportEvent::Started { job_id, .. }
            | ImportEvent::Progress { job_id, .. }
            | ImportEvent::Error { job_id, .. }
            | ImportEvent::Completed { job_id, .. }
            | ImportEvent::Failed { job_id, .. } => *job_id,
        }
    }
}

/// Envelope published on the wire: the event plus an emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ImportEvent,
}

impl ImportEventEnvelope {
    pub fn new(event: ImportEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_event_name_and_job_id() {
        let event = ImportEvent::Started {
            job_id: Uuid::nil(),
            file_name: "t.csv".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"import:started\""));
        assert!(json.contains("\"jobId\""));
    }

    #[test]
    fn test_progress_event_carries_cumulative_counts() {
        let event = ImportEvent::Progress {
            job_id: Uuid::nil(),
            accepted: 100,
            rejected: 3,
            line_number: 104,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"import:progress\""));
        assert!(json.contains("\"accepted\":100"));
        assert!(json.contains("\"lineNumber\":104"));
    }

    #[test]
    fn test_error_event_carries_line_details() {
        let event = ImportEvent::Error {
            job_id: Uuid::nil(),
            line_number: 2,
            message: "Amount must be a valid number".to_string(),
            line_text: "abc;CZK;lunch".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"import:error\""));
        assert!(json.contains("\"lineNumber\":2"));
        assert!(json.contains("\"lineText\""));
    }

    #[test]
    fn test_envelope_flattens_event_tag() {
        let envelope = ImportEventEnvelope::new(ImportEvent::Completed {
            job_id: Uuid::nil(),
            accepted: 2,
            rejected: 2,
        });
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"event\":\"import:completed\""));
        assert!(json.contains("\"timestamp\""));
    }
}
