//! Error types for the statement-parser library.
//!
//! Three layers reflect three distinct failure boundaries:
//!
//! * [`StageError`]: one pipeline stage failed (unreadable PDF, empty or
//!   malformed LLM reply, schema violation, provider failure).
//!
//! * [`PipelineError`]: the single wrapped error a pipeline run returns.
//!   Whatever stage failed, the job queue only ever sees this type, with the
//!   original [`StageError`] preserved as its `source`.
//!
//! * [`StatementError`]: synchronous failures outside any job: a missing
//!   upload, a bad configuration, an unknown job id. These are reported to
//!   the caller immediately instead of becoming failed jobs.
//!
//! [`JobError`] is the serialisable snapshot of a [`PipelineError`] that a
//! failed job keeps for the status endpoint.

use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// A failure inside one stage of the extraction pipeline.
#[derive(Debug, Error)]
pub enum StageError {
    /// The PDF could not be decoded, or it carries no text layer.
    #[error("{0}")]
    Extraction(String),

    /// The LLM returned an empty reply.
    #[error("Empty response from LLM")]
    EmptyResponse,

    /// The sanitised reply does not look like a JSON object.
    #[error("Invalid JSON format in LLM response. Expected JSON object, got: {snippet}...")]
    Format { snippet: String },

    /// The sanitised reply is not valid JSON.
    #[error("Failed to parse LLM response as JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The decoded JSON does not match the statement schema.
    ///
    /// Every violated constraint is listed, not just the first one.
    #[error("Invalid statement data structure: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    /// The LLM provider call failed (transport, auth, timeout).
    #[error("Failed to get response from {provider}: {detail}")]
    LlmCall { provider: String, detail: String },
}

/// The error a pipeline run reports to the job boundary.
#[derive(Debug, Error)]
#[error("Failed to parse bank statement: {source}")]
pub struct PipelineError {
    /// Stage that was running when the failure happened.
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: StageError) -> Self {
        Self { stage, source }
    }
}

/// Failures that happen outside a job run and are reported synchronously.
#[derive(Debug, Error)]
pub enum StatementError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload was read but contains no bytes.
    #[error("No file content provided for '{file_name}'")]
    EmptyUpload { file_name: String },

    /// The upload exceeds the configured size limit.
    #[error("File '{file_name}' is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge {
        file_name: String,
        size: usize,
        limit: usize,
    },

    /// The upload is not a PDF.
    #[error("File is not a valid PDF: '{file_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { file_name: String, magic: Vec<u8> },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Queue errors ──────────────────────────────────────────────────────
    /// No job with this id is known to the queue.
    #[error("PDF parsing job {job_id} not found")]
    JobNotFound { job_id: String },

    /// A job with this id was already submitted.
    #[error("PDF parsing job {job_id} already exists")]
    DuplicateJob { job_id: String },

    /// The queue no longer accepts work.
    #[error("Failed to queue PDF parsing job: queue is shut down")]
    QueueClosed,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure details stored on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl JobError {
    /// Capture an error and its `source()` chain, one cause per line.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current = err.source();
        while let Some(cause) = current {
            causes.push(format!("Caused by: {cause}"));
            current = cause.source();
        }

        let stack = if causes.is_empty() {
            None
        } else {
            Some(format!("{err}\n{}", causes.join("\n")))
        };

        Self {
            message: err.to_string(),
            stack,
        }
    }
}
