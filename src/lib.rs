//! # statement-parser
//!
//! Extract structured, reconciled data from PDF bank statements with an LLM,
//! tracked as asynchronous jobs.
//!
//! ## Why this crate?
//!
//! Bank statements come in as many layouts as there are banks. Instead of
//! one hand-written parser per layout, this crate pulls the PDF's text layer
//! and asks an LLM to fill a fixed schema. The reply is never trusted: it is
//! stripped of markdown fences, schema-checked field by field, and the
//! balance arithmetic is recomputed locally to set `isReconciled`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Input      local file / URL → in-memory PDF, size and magic checks
//!  ├─ 2. Queue      job accepted as `waiting`, picked up by a worker
//!  ├─ 3. Extract    PDF text layer (CPU-bound, spawn_blocking)
//!  ├─ 4. LLM        one completion call with the fixed prompt template
//!  ├─ 5. Sanitise   strip ```json fences, require a JSON object
//!  ├─ 6. Validate   collect every schema violation
//!  ├─ 7. Reconcile  start + Σ amounts ≈ end (±0.01)
//!  └─ 8. Status     completed with result, or retried / failed with error
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statement_parser::{
//!     load_upload, JobLifecycleAdapter, JobOptions, JobQueue, ParserConfig, QueueConfig,
//!     StatementParser,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ParserConfig::default();
//!     let parser = Arc::new(StatementParser::from_config(&config)?);
//!     let queue = JobQueue::start(JobLifecycleAdapter::new(parser), QueueConfig::default());
//!
//!     let upload = load_upload("statement.pdf", &config).await?;
//!     let job = queue.submit(upload, JobOptions::default()).await?;
//!     println!("queued {}", job.job_id);
//!
//!     let status = queue.status(&job.job_id).await?;
//!     println!("{}", serde_json::to_string_pretty(&status)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `statement-parse` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! statement-parser = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ParserConfig, ParserConfigBuilder, QueueConfig, QueueConfigBuilder};
pub use error::{JobError, PipelineError, StageError, StatementError};
pub use job::processor::{JobHandle, JobLifecycleAdapter};
pub use job::queue::JobQueue;
pub use job::status::JobStatus;
pub use job::{generate_job_id, JobOptions, JobSnapshot, JobState, SubmittedJob};
pub use output::{StatementRecord, TransactionRecord};
pub use parse::StatementParser;
pub use pipeline::extract::{PdfTextExtractor, TextExtractor};
pub use pipeline::input::{load_upload, Upload};
pub use pipeline::llm::{resolve_client, LlmClient, ProviderClient};
pub use progress::{NoopProgress, ProgressSink, Stage};
pub use stream::{watch_job, StatusStream};
