//! Configuration for one LLM model invocation target.

use crate::config::llm_provider::LlmProvider;

/// Connection + sampling parameters for a provider/model pair.
#[derive(Debug, Clone)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string (e.g. `"gpt-4o-mini"`, `"kimi-k2"`).
    pub model: String,

    /// Chat-completions base URL (without the `/chat/completions` suffix).
    pub endpoint: String,

    /// API key for providers that require authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// End-to-end HTTP read timeout in seconds (`LLM_HTTP_TIMEOUT`).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Config with provider defaults; the API key is taken from the
    /// provider's environment variable when present.
    pub fn for_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        let api_key = provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        Self {
            provider,
            model: model.into(),
            endpoint: provider.default_endpoint().to_string(),
            api_key,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: None,
        }
    }
}
