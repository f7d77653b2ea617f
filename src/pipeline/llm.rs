//! LLM interaction: one system instruction plus one user message in, text out.
//!
//! The pipeline only depends on the [`LlmClient`] trait, so it never knows
//! which vendor answers. The client is chosen once at start-up by
//! [`resolve_client`]; [`ProviderClient`] adapts any `edgequake-llm`
//! provider to the trait.

use crate::config::ParserConfig;
use crate::error::{StageError, StatementError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// "Send system instruction + user content, get back text."
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    /// Run a single completion. No retries happen here.
    async fn create_response(
        &self,
        system_instruction: &str,
        user_input: &str,
    ) -> Result<String, StageError>;
}

/// [`LlmClient`] backed by an `edgequake-llm` provider.
pub struct ProviderClient {
    label: String,
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderClient {
    pub fn new(
        label: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
        config: &ParserConfig,
    ) -> Self {
        Self {
            label: label.into(),
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl LlmClient for ProviderClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn create_response(
        &self,
        system_instruction: &str,
        user_input: &str,
    ) -> Result<String, StageError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(system_instruction),
            ChatMessage::user(user_input),
        ];

        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    self.label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                error!("Error calling {} API: {}", self.label, e);
                Err(StageError::LlmCall {
                    provider: self.label.clone(),
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Build `CompletionOptions` from the parser config.
fn build_options(config: &ParserConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the API key is
///    read from the provider's usual environment variable.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI key present** (`OPENAI_API_KEY`).
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_client(config: &ParserConfig) -> Result<Arc<dyn LlmClient>, StatementError> {
    if let Some(ref client) = config.provider {
        return Ok(Arc::clone(client));
    }

    if let Some(ref name) = config.provider_name {
        return create_client(name, config.model_or_default(), config);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_client(&prov, &model, config);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_client("openai", config.model_or_default(), config);
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StatementError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(ProviderClient::new("auto", provider, config)))
}

fn create_client(
    provider_name: &str,
    model: &str,
    config: &ParserConfig,
) -> Result<Arc<dyn LlmClient>, StatementError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StatementError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderClient::new(provider_name, provider, config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl LlmClient for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn create_response(&self, _system: &str, user: &str) -> Result<String, StageError> {
            Ok(user.to_string())
        }
    }

    #[test]
    fn build_options_defaults() {
        let config = ParserConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn prebuilt_client_takes_priority() {
        let config = ParserConfig::builder()
            .provider(Arc::new(Echo))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let client = resolve_client(&config).expect("pre-built client");
        assert_eq!(client.name(), "echo");
    }

    #[tokio::test]
    async fn trait_object_round_trip() {
        let client: Arc<dyn LlmClient> = Arc::new(Echo);
        let reply = client.create_response("sys", "hello").await.unwrap();
        assert_eq!(reply, "hello");
    }
}
