//! Configuration types for statement extraction and the job queue.
//!
//! [`ParserConfig`] controls how one document is read and sent to the LLM;
//! [`QueueConfig`] controls how jobs are scheduled and retried. Both are
//! built through a builder so callers set only what they care about and
//! rely on documented defaults for the rest.

use crate::error::StatementError;
use crate::pipeline::llm::LlmClient;
use std::fmt;
use std::sync::Arc;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default upload size limit (5 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for a statement extraction run.
///
/// # Example
/// ```rust
/// use statement_parser::ParserConfig;
///
/// let config = ParserConfig::builder()
///     .provider_name("openai")
///     .model("gpt-4o-mini")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.temperature, 0.0);
/// ```
#[derive(Clone)]
pub struct ParserConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed client. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LlmClient>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction should be deterministic; the same statement must give the
    /// same transactions on a retry.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 4096.
    ///
    /// A long statement can list a few hundred transactions; too low a limit
    /// truncates the JSON and the run fails at the decode stage.
    pub max_tokens: usize,

    /// Upper bound on a single LLM call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Largest accepted upload in bytes. Default: 5 MiB.
    pub max_file_bytes: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 120,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ParserConfig {
    /// Create a new builder for `ParserConfig`.
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ParserConfig`].
#[derive(Debug)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmClient>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_file_bytes(mut self, bytes: usize) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParserConfig, StatementError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(StatementError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(StatementError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_file_bytes == 0 {
            return Err(StatementError::InvalidConfig(
                "max_file_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Scheduling and retry policy for the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Jobs processed in parallel. Each worker runs one job at a time. Default: 1.
    pub workers: usize,

    /// Total attempts per job, including the first. Default: 3.
    pub attempts: u32,

    /// Delay before the first retry in milliseconds. Default: 2000.
    ///
    /// Doubles after each failed attempt: 2 s → 4 s → 8 s.
    pub backoff_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            attempts: 3,
            backoff_delay_ms: 2000,
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder {
            config: Self::default(),
        }
    }

    /// Delay before attempt `attempts_made + 1`, given `attempts_made ≥ 1` failures.
    pub fn backoff_for(&self, attempts_made: u32) -> u64 {
        let exp = attempts_made.saturating_sub(1).min(20);
        self.backoff_delay_ms.saturating_mul(2u64.pow(exp))
    }
}

/// Builder for [`QueueConfig`].
#[derive(Debug)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn attempts(mut self, n: u32) -> Self {
        self.config.attempts = n;
        self
    }

    pub fn backoff_delay_ms(mut self, ms: u64) -> Self {
        self.config.backoff_delay_ms = ms;
        self
    }

    pub fn build(self) -> Result<QueueConfig, StatementError> {
        if self.config.workers == 0 {
            return Err(StatementError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if self.config.attempts == 0 {
            return Err(StatementError::InvalidConfig("attempts must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_defaults() {
        let c = ParserConfig::default();
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.max_file_bytes, 5 * 1024 * 1024);
        assert_eq!(c.model_or_default(), "gpt-4o");
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ParserConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ParserConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, StatementError::InvalidConfig(_)));
    }

    #[test]
    fn queue_defaults_match_broker_policy() {
        let q = QueueConfig::default();
        assert_eq!(q.attempts, 3);
        assert_eq!(q.backoff_delay_ms, 2000);
        assert_eq!(q.workers, 1);
    }

    #[test]
    fn backoff_is_exponential() {
        let q = QueueConfig::default();
        assert_eq!(q.backoff_for(1), 2000);
        assert_eq!(q.backoff_for(2), 4000);
        assert_eq!(q.backoff_for(3), 8000);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(QueueConfig::builder().attempts(0).build().is_err());
        assert!(QueueConfig::builder().workers(0).build().is_err());
    }
}
