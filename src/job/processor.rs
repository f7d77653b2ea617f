//! Job lifecycle adapter.
//!
//! Bridges a queued job and the extraction pipeline: the pipeline's
//! checkpoints become job progress updates, and the adapter adds its own
//! checkpoints on either side of the run (5 and 10 before, 100 after).

use crate::error::PipelineError;
use crate::output::StatementRecord;
use crate::parse::StatementParser;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// The view of a queued job that the adapter needs.
#[async_trait]
pub trait JobHandle: Send + Sync {
    fn id(&self) -> &str;

    fn file_name(&self) -> &str;

    /// The uploaded PDF.
    fn buffer(&self) -> &[u8];

    /// Record the job's progress percentage.
    async fn update_progress(&self, percent: u8);
}

/// Forwards pipeline checkpoints to a job and logs them.
struct JobProgress<'a> {
    job: &'a dyn JobHandle,
}

#[async_trait]
impl<'a> ProgressSink for JobProgress<'a> {
    async fn report(&self, percent: u8, message: &str) {
        self.job.update_progress(percent).await;
        info!("Job {}: {}", self.job.id(), message);
    }
}

/// Runs one attempt of a job through the pipeline.
pub struct JobLifecycleAdapter {
    parser: Arc<StatementParser>,
}

impl JobLifecycleAdapter {
    pub fn new(parser: Arc<StatementParser>) -> Self {
        Self { parser }
    }

    /// Process `job` once. A failure is logged and returned unchanged so the
    /// queue can apply its retry policy.
    pub async fn process(&self, job: &dyn JobHandle) -> Result<StatementRecord, PipelineError> {
        info!("Processing PDF job {} for file: {}", job.id(), job.file_name());
        let progress = JobProgress { job };

        progress
            .report(5, &format!("Initializing processing for {}", job.file_name()))
            .await;
        progress
            .report(10, &format!("Validating file buffer ({} bytes)", job.buffer().len()))
            .await;

        match self.parser.run(job.buffer(), &progress).await {
            Ok(record) => {
                progress
                    .report(
                        100,
                        &format!(
                            "Successfully processed {}: {} transactions extracted, reconciled: {}",
                            job.file_name(),
                            record.transaction_count(),
                            record.is_reconciled
                        ),
                    )
                    .await;
                Ok(record)
            }
            Err(err) => {
                error!("Failed to process PDF job {}: {}", job.id(), err);
                Err(err)
            }
        }
    }
}
