//! LLM adapter: one call surface over real and mock clients.
//!
//! Enum dispatch (no async-trait, no heap trait objects). The adapter owns
//! the provider-capability decisions: `response_format` is forwarded only
//! to providers known to honour it.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::client::{OpenAiCompatClient, RequestOptions};
use crate::error_handler::AiResult;
use crate::mock::MockLlmClient;
use crate::stream::{DeltaEvent, NormalizedMessage, StreamGuards, StreamProcessor};

/// Options of one `complete` call.
#[derive(Debug, Default)]
pub struct CompleteOptions {
    pub tools: Option<Vec<Value>>,
    pub response_format: Option<Value>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub guards: StreamGuards,
    pub observer: Option<UnboundedSender<DeltaEvent>>,
}

/// Thin enum adapter for dispatch.
pub enum LlmAdapter {
    OpenAiCompat(OpenAiCompatClient),
    Mock(MockLlmClient),
}

impl LlmAdapter {
    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmAdapter::OpenAiCompat(client) => client.provider().as_str(),
            LlmAdapter::Mock(_) => "mock",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmAdapter::OpenAiCompat(client) => client.model(),
            LlmAdapter::Mock(client) => client.model(),
        }
    }

    /// Heuristic used to size the first-token guard: reasoning models sit
    /// silent much longer before the first byte.
    pub fn is_thinking_model(&self) -> bool {
        self.model().to_lowercase().contains("thinking")
    }

    /// Streamed completion normalized into one assistant message.
    pub async fn complete(
        &self,
        messages: &[Value],
        mut opts: CompleteOptions,
    ) -> AiResult<NormalizedMessage> {
        match self {
            LlmAdapter::OpenAiCompat(client) => {
                if opts.response_format.is_some() && !client.provider().supports_json_schema() {
                    debug!(
                        provider = client.provider().as_str(),
                        "dropping response_format: provider does not honour it"
                    );
                    opts.response_format = None;
                }
                let request = RequestOptions {
                    tools: opts.tools,
                    response_format: opts.response_format,
                    temperature: opts.temperature,
                    top_p: opts.top_p,
                };
                let body = client.stream_chat(messages, &request).await?;
                StreamProcessor::new(client.provider().as_str())
                    .collect(body, opts.guards, opts.observer.as_ref())
                    .await
            }
            LlmAdapter::Mock(client) => Ok(client.complete(opts.observer.as_ref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_adapter_completes_without_network() {
        let adapter = LlmAdapter::Mock(MockLlmClient::canned());
        let msg = adapter
            .complete(&[], CompleteOptions::default())
            .await
            .unwrap();
        assert_eq!(msg.finish_reason.as_deref(), Some("stop"));
        assert!(msg.content.unwrap().contains("Offline review"));
    }

    #[test]
    fn thinking_models_are_detected_by_name() {
        let adapter = LlmAdapter::Mock(MockLlmClient::canned());
        assert!(!adapter.is_thinking_model());
    }
}
