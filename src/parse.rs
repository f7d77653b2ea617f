//! The extraction pipeline: PDF bytes in, a validated statement out.
//!
//! [`StatementParser::run`] is a single attempt. It knows nothing about
//! jobs or retries; the queue decides whether a failed run is retried, and
//! each retry is a fresh, independent run.
//!
//! Stages run strictly in sequence:
//!
//! ```text
//! started(15) → extracting(25) → extracted(35) → prompting(45)
//!   → calling-llm(55) → llm-responded(70) → validating(75)
//!   → reconciling(85) → done(95)
//! ```
//!
//! Any stage failure is logged and returned as one [`PipelineError`]
//! carrying the stage and the original error. No partial record is ever
//! returned.

use crate::config::ParserConfig;
use crate::error::{PipelineError, StageError, StatementError};
use crate::output::StatementRecord;
use crate::pipeline::extract::{extract_text, PdfTextExtractor, TextExtractor};
use crate::pipeline::llm::{resolve_client, LlmClient};
use crate::pipeline::{sanitize, validate};
use crate::progress::{checkpoint, ProgressSink, Stage};
use crate::prompts::{bank_statement_prompt, BANK_STATEMENT_SYSTEM_INSTRUCTION};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Runs the extraction pipeline with a fixed extractor and LLM client.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every worker.
pub struct StatementParser {
    extractor: Arc<dyn TextExtractor>,
    client: Arc<dyn LlmClient>,
    api_timeout: Duration,
}

impl StatementParser {
    /// Build a parser from config, resolving the LLM client once.
    pub fn from_config(config: &ParserConfig) -> Result<Self, StatementError> {
        let client = resolve_client(config)?;
        Ok(Self::with_parts(Arc::new(PdfTextExtractor), client, config))
    }

    /// Build a parser from explicit parts.
    pub fn with_parts(
        extractor: Arc<dyn TextExtractor>,
        client: Arc<dyn LlmClient>,
        config: &ParserConfig,
    ) -> Self {
        Self {
            extractor,
            client,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Name of the LLM client in use.
    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Run every stage on `pdf`, reporting checkpoints to `progress`.
    pub async fn run(
        &self,
        pdf: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<StatementRecord, PipelineError> {
        let mut stage = Stage::Init;
        match self.run_stages(pdf, progress, &mut stage).await {
            Ok(record) => Ok(record),
            Err(source) => {
                error!("Error parsing bank statement at stage {}: {}", stage, source);
                Err(PipelineError::new(stage, source))
            }
        }
    }

    async fn run_stages(
        &self,
        pdf: &[u8],
        progress: &dyn ProgressSink,
        stage: &mut Stage,
    ) -> Result<StatementRecord, StageError> {
        *stage = Stage::Started;
        checkpoint(progress, Stage::Started, "Starting bank statement parsing").await;

        // ── Step 1: Extract text ─────────────────────────────────────────
        *stage = Stage::Extracting;
        let text = extract_text(&self.extractor, pdf, progress).await?;
        *stage = Stage::Extracted;
        debug!("PDF text extracted successfully");

        // ── Step 2: Build prompt ─────────────────────────────────────────
        *stage = Stage::Prompting;
        checkpoint(progress, Stage::Prompting, "Preparing LLM analysis prompt").await;
        let prompt = bank_statement_prompt(&text);

        // ── Step 3: Call the LLM ─────────────────────────────────────────
        *stage = Stage::CallingLlm;
        checkpoint(progress, Stage::CallingLlm, "Sending data to LLM for analysis").await;
        let reply = self.call_llm(&prompt).await?;
        debug!("Raw LLM response: {}", reply);

        // ── Step 4: Sanitise and decode ──────────────────────────────────
        *stage = Stage::LlmResponded;
        checkpoint(progress, Stage::LlmResponded, "Processing LLM response").await;
        let json_text = sanitize::sanitize(&reply)?;
        let raw: serde_json::Value = serde_json::from_str(&json_text)?;

        // ── Step 5: Validate ─────────────────────────────────────────────
        *stage = Stage::Validating;
        checkpoint(progress, Stage::Validating, "Validating extracted data structure").await;
        let record = validate::validate(&raw)?;

        // ── Step 6: Reconcile ────────────────────────────────────────────
        *stage = Stage::Reconciling;
        checkpoint(progress, Stage::Reconciling, "Performing reconciliation calculations").await;
        let record = validate::reconcile(record);

        *stage = Stage::Done;
        checkpoint(
            progress,
            Stage::Done,
            &format!(
                "Processing complete: {} transactions extracted",
                record.transaction_count()
            ),
        )
        .await;

        Ok(record)
    }

    /// The one suspension point that may block for a long time.
    async fn call_llm(&self, prompt: &str) -> Result<String, StageError> {
        let call = self
            .client
            .create_response(BANK_STATEMENT_SYSTEM_INSTRUCTION, prompt);
        match tokio::time::timeout(self.api_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StageError::LlmCall {
                provider: self.client.name().to_string(),
                detail: format!("timed out after {}s", self.api_timeout.as_secs()),
            }),
        }
    }
}
