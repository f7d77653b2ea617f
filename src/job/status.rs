//! Client-facing job status document.

use super::{iso8601, JobSnapshot, JobState, JOB_TYPE};
use crate::error::JobError;
use crate::output::StatementRecord;
use serde::{Deserialize, Serialize};

/// What a client polling a job sees.
///
/// Optional fields are omitted from JSON until they apply: `processedAt`
/// once an attempt has started, `completedAt` and `processingTime` once the
/// job is terminal, `result` only when completed, `error` only when failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    pub created_at: String,
    pub file_name: String,
    pub job_type: String,
    pub attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// `finishedOn − processedOn` in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StatementRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobStatus {
    pub fn from_snapshot(job: &JobSnapshot) -> Self {
        let processing_time = match (job.processed_on, job.finished_on) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };

        Self {
            job_id: job.id.clone(),
            status: job.state,
            progress: job.progress,
            created_at: iso8601(job.created_on),
            file_name: job.file_name.clone(),
            job_type: JOB_TYPE.to_string(),
            attempts_made: job.attempts_made,
            processed_at: job.processed_on.map(iso8601),
            completed_at: job.finished_on.map(iso8601),
            processing_time,
            result: match job.state {
                JobState::Completed => job.result.clone(),
                _ => None,
            },
            error: match job.state {
                JobState::Failed => job.failed_reason.clone(),
                _ => None,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
