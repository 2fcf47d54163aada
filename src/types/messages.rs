//! Shared wire message types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JobStatus;

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Response to a successful import upload; returned before any parsing runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Response to a cancel request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCancelResponse {
    pub job_id: Uuid,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_response_shape() {
        let response = JobSubmitResponse {
            job_id: Uuid::nil(),
            status: JobStatus::Pending,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"jobId\""));
        assert!(json.contains("\"status\":\"pending\""));
    }
}
