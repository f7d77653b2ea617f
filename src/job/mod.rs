//! Asynchronous extraction jobs.
//!
//! A job tracks one uploaded statement through the pipeline:
//!
//! ```text
//! submit ──▶ waiting ──▶ active ──┬──▶ completed (result stored)
//!               ▲                 ├──▶ failed    (error stored)
//!               └──── delayed ◀───┘   (attempt failed, retry scheduled)
//! ```
//!
//! * [`processor`]: the lifecycle adapter, which wires a job's progress into the
//!   pipeline and adds the job-level checkpoints around it
//! * [`queue`]: in-process queue with workers, retries and backoff
//! * [`status`]: the client-facing status document

pub mod processor;
pub mod queue;
pub mod status;

use crate::error::JobError;
use crate::output::StatementRecord;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of `jobType` in every status document.
pub const JOB_TYPE: &str = "pdf-parsing";

/// Queue-side state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    /// Completed and failed jobs never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job overrides applied at submission.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Caller-chosen id. Generated with [`generate_job_id`] when absent.
    pub job_id: Option<String>,
    /// Overrides [`crate::config::QueueConfig::attempts`].
    pub attempts: Option<u32>,
    /// Overrides [`crate::config::QueueConfig::backoff_delay_ms`].
    pub backoff_delay_ms: Option<u64>,
}

impl JobOptions {
    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    pub fn with_attempts(mut self, n: u32) -> Self {
        self.attempts = Some(n);
        self
    }

    pub fn with_backoff_delay_ms(mut self, ms: u64) -> Self {
        self.backoff_delay_ms = Some(ms);
        self
    }
}

/// Queue bookkeeping for one job, as seen at a point in time.
///
/// Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: String,
    pub file_name: String,
    pub state: JobState,
    pub progress: u8,
    pub attempts_made: u32,
    pub created_on: i64,
    /// Start of the most recent attempt.
    pub processed_on: Option<i64>,
    /// Set once the job is terminal.
    pub finished_on: Option<i64>,
    pub result: Option<StatementRecord>,
    /// Error of the most recent failed attempt.
    pub failed_reason: Option<JobError>,
}

/// Acknowledgement returned when a job is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJob {
    pub message: String,
    pub job_id: String,
    pub file_name: String,
    pub status: String,
    pub queued_at: String,
}

/// `pdf-<unix-millis>-<9 random base36 chars>`.
pub fn generate_job_id() -> String {
    let millis = now_millis();
    let mut n = uuid::Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(9);
    for _ in 0..9 {
        let digit = (n % 36) as u32;
        suffix.push(char::from_digit(digit, 36).unwrap_or('0'));
        n /= 36;
    }
    format!("pdf-{millis}-{suffix}")
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO-8601 rendering of a Unix-millisecond timestamp.
pub(crate) fn iso8601(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
