//! OpenAI-compatible streaming chat client.
//!
//! Thin wrapper over `reqwest`: builds the `chat.completions` request,
//! checks the status, and hands the SSE body to the stream processor.
//! Connect timeout is capped at 10 s so dead endpoints fail fast; the read
//! timeout is the total call budget (`LLM_HTTP_TIMEOUT`, default 120 s).

use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{
    AiLlmError, AiResult, HttpError, ProviderError, ProviderErrorKind, make_snippet,
};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Per-request knobs; everything not set falls back to the model config.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub tools: Option<Vec<Value>>,
    pub response_format: Option<Value>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// Streaming client for one provider/model pair.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    cfg: LlmModelConfig,
    http: reqwest::Client,
    url_chat: String,
}

impl OpenAiCompatClient {
    /// Validate the config and build the HTTP client.
    pub fn new(cfg: LlmModelConfig) -> AiResult<Self> {
        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProviderError::new(
                cfg.provider.as_str(),
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }
        if cfg.provider != LlmProvider::Mock && cfg.api_key.is_none() {
            return Err(
                ProviderError::new(cfg.provider.as_str(), ProviderErrorKind::MissingApiKey).into(),
            );
        }

        let timeout_secs = cfg
            .timeout_secs
            .or_else(|| {
                std::env::var("LLM_HTTP_TIMEOUT")
                    .ok()
                    .and_then(|raw| raw.parse().ok())
            })
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        let mut headers = header::HeaderMap::new();
        if let Some(key) = &cfg.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                ProviderError::new(
                    cfg.provider.as_str(),
                    ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
                )
            })?;
            headers.insert(header::AUTHORIZATION, value);
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()?;

        let url_chat = format!("{}/chat/completions", endpoint.trim_end_matches('/'));
        info!(
            provider = cfg.provider.as_str(),
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs,
            "llm client initialized"
        );
        Ok(Self { cfg, http, url_chat })
    }

    pub fn provider(&self) -> LlmProvider {
        self.cfg.provider
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    /// POST a streaming chat request and return the SSE byte stream.
    ///
    /// # Errors
    /// - `ProviderErrorKind::HttpStatus` for non-2xx responses (with a
    ///   body snippet),
    /// - `AiLlmError::HttpTransport` for network failures.
    pub async fn stream_chat(
        &self,
        messages: &[Value],
        opts: &RequestOptions,
    ) -> AiResult<impl Stream<Item = AiResult<Vec<u8>>> + Unpin + use<>> {
        let mut body = serde_json::Map::new();
        body.insert("model".to_string(), json!(self.cfg.model));
        body.insert("messages".to_string(), json!(messages));
        body.insert("stream".to_string(), json!(true));
        if let Some(tools) = &opts.tools {
            if !tools.is_empty() {
                body.insert("tools".to_string(), json!(tools));
            }
        }
        if let Some(format) = &opts.response_format {
            body.insert("response_format".to_string(), format.clone());
        }
        if let Some(t) = opts.temperature.or(self.cfg.temperature) {
            body.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = opts.top_p.or(self.cfg.top_p) {
            body.insert("top_p".to_string(), json!(p));
        }
        if let Some(max) = self.cfg.max_tokens {
            body.insert("max_tokens".to_string(), json!(max));
        }
        let payload = Value::Object(body);

        debug!(
            url = %self.url_chat,
            model = %self.cfg.model,
            messages = messages.len(),
            has_tools = opts.tools.as_ref().is_some_and(|t| !t.is_empty()),
            "POST chat.completions (stream)"
        );

        let response = self.http.post(&self.url_chat).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let url = self.url_chat.clone();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                self.cfg.provider.as_str(),
                ProviderErrorKind::HttpStatus(HttpError {
                    status: status.as_u16(),
                    url,
                    snippet: make_snippet(&text),
                }),
            )
            .into());
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(AiLlmError::from)))
    }
}
