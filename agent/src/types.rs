use chrono::{DateTime, Utc};
use orchestrator::PruningMode;
use serde::{Deserialize, Serialize};

// === REQUEST STRUCTURES ===

#[derive(Debug, Deserialize)]
pub struct ResyncRequest {
    pub mode: PruningMode,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub max_hours: Option<i64>,
}

// === RESPONSE STRUCTURES ===

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
}

impl<T> ApiResponse<T> {
    pub fn success_with_data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            output: None,
            error: None,
            job_id: None,
            job_status: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            output: None,
            error: Some(message),
            job_id: None,
            job_status: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_with_output(output: String) -> Self {
        Self {
            success: true,
            data: None,
            output: Some(output),
            error: None,
            job_id: None,
            job_status: None,
        }
    }

    pub fn success_with_job(job_id: String, status: JobStatus) -> Self {
        Self {
            success: true,
            data: None,
            output: None,
            error: None,
            job_id: Some(job_id),
            job_status: Some(status),
        }
    }
}

// === JOB TRACKING ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub operation_type: String,
    pub target_name: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusyStatusResponse {
    pub node: String,
    pub active_operation: Option<String>,
    pub running_jobs: Vec<JobInfo>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub cleaned_jobs: u32,
    pub max_hours: i64,
    pub timestamp: DateTime<Utc>,
}
