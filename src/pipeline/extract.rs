//! Text extraction: raw PDF bytes → plain text.
//!
//! ## Why spawn_blocking?
//!
//! Decoding content streams is CPU-bound and can take a noticeable time on
//! long statements. `tokio::task::spawn_blocking` keeps that work off the
//! async worker threads. It also contains a decoder panic: a malformed PDF
//! that makes `pdf-extract` panic surfaces as an extraction error instead
//! of taking the worker down.

use crate::error::StageError;
use crate::progress::{checkpoint, ProgressSink, Stage};
use std::sync::Arc;
use tracing::debug;

/// Decodes the text layer of a PDF held in memory.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8]) -> Result<String, StageError>;
}

/// Default extractor built on the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, pdf: &[u8]) -> Result<String, StageError> {
        pdf_extract::extract_text_from_mem(pdf)
            .map_err(|e| StageError::Extraction(format!("Failed to read PDF: {e}")))
    }
}

/// Extract text, reporting the start and end checkpoints.
///
/// Empty or whitespace-only text is a failure: prompting an LLM with
/// nothing cannot produce a statement.
pub async fn extract_text(
    extractor: &Arc<dyn TextExtractor>,
    pdf: &[u8],
    progress: &dyn ProgressSink,
) -> Result<String, StageError> {
    checkpoint(progress, Stage::Extracting, "Extracting text from PDF").await;

    let extractor = Arc::clone(extractor);
    let bytes = pdf.to_vec();
    let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
        .await
        .map_err(|e| StageError::Extraction(format!("PDF decoder aborted: {e}")))??;

    if text.trim().is_empty() {
        return Err(StageError::Extraction(
            "No text content found in PDF".to_string(),
        ));
    }

    let chars = text.chars().count();
    debug!("Extracted {} characters of statement text", chars);
    checkpoint(
        progress,
        Stage::Extracted,
        &format!("PDF text extraction completed ({chars} characters)"),
    )
    .await;

    Ok(text)
}
