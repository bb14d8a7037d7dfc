//! Adapter factory: preference strings → configured adapters.
//!
//! `auto` picks the first provider with credentials in the environment;
//! when none is configured the factory degrades to the deterministic mock
//! and records a fallback so the session summary surfaces it.

use std::path::Path;

use serde_json::json;
use tracing::{info, warn};

use ai_llm_service::{
    LlmAdapter, LlmModelConfig, LlmProvider, MockLlmClient, ModelPreference, ModelsConfig,
    OpenAiCompatClient,
};
use services::record_fallback;

use crate::errors::{KernelError, KernelResult};

/// Providers probed by `auto`, in order.
const AUTO_PROVIDER_ORDER: &[LlmProvider] = &[
    LlmProvider::OpenAi,
    LlmProvider::Moonshot,
    LlmProvider::MiniMax,
    LlmProvider::OpenRouter,
];

fn has_credentials(provider: LlmProvider) -> bool {
    provider
        .api_key_env()
        .and_then(|var| std::env::var(var).ok())
        .is_some_and(|key| !key.trim().is_empty())
}

/// Build an adapter for the given preference string.
///
/// Returns the adapter plus the resolved provider key for logging/events.
pub fn build_adapter(preference: &str, kernel_dir: &Path) -> KernelResult<(LlmAdapter, String)> {
    let catalogue = ModelsConfig::load(kernel_dir);
    let preference = ModelPreference::parse(preference)
        .map_err(|err| KernelError::InvalidRequest(err.to_string()))?;

    let resolved = match preference {
        ModelPreference::Auto => AUTO_PROVIDER_ORDER
            .iter()
            .copied()
            .find(|provider| has_credentials(*provider))
            .and_then(|provider| {
                catalogue
                    .default_model(provider)
                    .map(|model| (provider, model))
            }),
        ModelPreference::Provider(provider) => catalogue
            .default_model(provider)
            .map(|model| (provider, model)),
        ModelPreference::ProviderModel(provider, model) => Some((provider, model)),
    };

    let Some((provider, model)) = resolved else {
        record_fallback(
            "llm_client_unavailable",
            "no LLM provider configured, using mock client",
            None,
        );
        warn!("no usable LLM provider; degrading to mock");
        return Ok((LlmAdapter::Mock(MockLlmClient::canned()), "mock".to_string()));
    };

    if provider == LlmProvider::Mock {
        return Ok((LlmAdapter::Mock(MockLlmClient::canned()), "mock".to_string()));
    }

    let cfg = LlmModelConfig::for_provider(provider, model);
    match OpenAiCompatClient::new(cfg) {
        Ok(client) => {
            info!(provider = provider.as_str(), "llm adapter ready");
            Ok((
                LlmAdapter::OpenAiCompat(client),
                provider.as_str().to_string(),
            ))
        }
        Err(err) => {
            record_fallback(
                "llm_client_unavailable",
                "provider client construction failed, using mock client",
                Some(json!({ "provider": provider.as_str(), "error": err.to_string() })),
            );
            warn!(%err, provider = provider.as_str(), "client init failed; degrading to mock");
            Ok((LlmAdapter::Mock(MockLlmClient::canned()), "mock".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_mock_preference_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, provider) = build_adapter("mock", dir.path()).unwrap();
        assert_eq!(provider, "mock");
        assert_eq!(adapter.provider_name(), "mock");
    }

    #[test]
    fn bad_preference_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            build_adapter("warpdrive:x1", dir.path()),
            Err(KernelError::InvalidRequest(_))
        ));
    }

    #[test]
    fn provider_without_credentials_degrades_to_mock() {
        let dir = tempfile::tempdir().unwrap();
        // `openai:gpt-4o` without OPENAI_API_KEY in the environment falls
        // back to the mock rather than failing the session.
        if std::env::var("OPENAI_API_KEY").is_err() {
            let (adapter, provider) = build_adapter("openai:gpt-4o", dir.path()).unwrap();
            assert_eq!(provider, "mock");
            assert_eq!(adapter.provider_name(), "mock");
        }
    }
}
