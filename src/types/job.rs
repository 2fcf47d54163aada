//! Import job types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of an import job.
///
/// Transitions are one-directional: `pending → processing → completed`, with
/// `failed` reachable from `pending` or `processing`. `completed` and `failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => anyhow::bail!("unknown job status: {}", other),
        }
    }
}

/// A bulk-import job record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_name: String,
    pub status: JobStatus,
    /// Data rows observed (accepted + rejected); written at completion.
    pub total_lines: i32,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the job reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = ImportJob {
            id: Uuid::nil(),
            project_id: Uuid::nil(),
            file_name: "transactions.csv".to_string(),
            status: JobStatus::Pending,
            total_lines: 0,
            created_at: Utc::now(),
            completed_at: None,
        };
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"fileName\""));
        assert!(json.contains("\"totalLines\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"completedAt\":null"));
    }
}
