//! Progress reporting for a single extraction run.
//!
//! The pipeline reports a fixed sequence of [`Stage`] checkpoints through a
//! caller-supplied [`ProgressSink`]. The sink is a plain parameter threaded
//! through every stage call; nothing is stored in global state, so a
//! pipeline run can be tested without any queue.
//!
//! Every `report` is awaited before the pipeline moves on, so an observer
//! polling job status never sees progress go backward or skip a stage.
//!
//! # Example
//!
//! ```rust
//! use statement_parser::{ProgressSink, Stage};
//! use std::sync::Mutex;
//!
//! struct Recorder(Mutex<Vec<u8>>);
//!
//! #[async_trait::async_trait]
//! impl ProgressSink for Recorder {
//!     async fn report(&self, percent: u8, _message: &str) {
//!         self.0.lock().unwrap().push(percent);
//!     }
//! }
//!
//! assert_eq!(Stage::CallingLlm.percent(), 55);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Receives `(percent, message)` checkpoints.
///
/// Implementations must be `Send + Sync`; a queue may run several jobs at
/// once on different worker tasks, each with its own sink.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8, message: &str);
}

/// A sink that drops every checkpoint.
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _percent: u8, _message: &str) {}
}

/// Stages of one extraction run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Init,
    Started,
    Extracting,
    Extracted,
    Prompting,
    CallingLlm,
    LlmResponded,
    Validating,
    Reconciling,
    Done,
}

impl Stage {
    /// Progress percentage reported when the stage is entered.
    pub const fn percent(self) -> u8 {
        match self {
            Stage::Init => 0,
            Stage::Started => 15,
            Stage::Extracting => 25,
            Stage::Extracted => 35,
            Stage::Prompting => 45,
            Stage::CallingLlm => 55,
            Stage::LlmResponded => 70,
            Stage::Validating => 75,
            Stage::Reconciling => 85,
            Stage::Done => 95,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Started => "started",
            Stage::Extracting => "extracting",
            Stage::Extracted => "extracted",
            Stage::Prompting => "prompting",
            Stage::CallingLlm => "calling-llm",
            Stage::LlmResponded => "llm-responded",
            Stage::Validating => "validating",
            Stage::Reconciling => "reconciling",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Report `stage` with its fixed percentage.
pub(crate) async fn checkpoint(progress: &dyn ProgressSink, stage: Stage, message: &str) {
    progress.report(stage.percent(), message).await;
}
