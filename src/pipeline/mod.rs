//! Pipeline stages for bank statement extraction.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and a backend (PDF decoder, LLM vendor) can be swapped without
//! touching the others. [`crate::parse::StatementParser`] drives them in
//! order.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ sanitize ──▶ decode ──▶ validate ──▶ reconcile
//! (upload)  (pdf text)  (JSON text) (strip fences)  (serde_json)  (schema)   (balances)
//! ```
//!
//! 1. [`input`]: load a local file or URL and reject non-PDF uploads
//! 2. [`extract`]: decode the PDF text layer on a blocking thread
//! 3. [`llm`]: one completion call through the [`llm::LlmClient`] seam;
//!    the only stage with network I/O
//! 4. [`sanitize`]: strip markdown fences from the reply
//! 5. [`validate`]: schema check collecting every violation, then
//!    recompute the reconciliation flag

pub mod extract;
pub mod input;
pub mod llm;
pub mod sanitize;
pub mod validate;
