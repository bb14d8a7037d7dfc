//! Supported LLM providers (OpenAI-compatible `chat.completions` wire).

use serde::{Deserialize, Serialize};

/// Provider/backend used for LLM inference. All of them speak the
/// OpenAI-compatible streaming protocol; [`LlmProvider::Mock`] is the
/// offline fallback used when no credentials are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Moonshot,
    MiniMax,
    OpenRouter,
    Mock,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Moonshot => "moonshot",
            LlmProvider::MiniMax => "minimax",
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::Mock => "mock",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "moonshot" | "kimi" => Some(LlmProvider::Moonshot),
            "minimax" => Some(LlmProvider::MiniMax),
            "openrouter" => Some(LlmProvider::OpenRouter),
            "mock" => Some(LlmProvider::Mock),
            _ => None,
        }
    }

    /// Default chat-completions base URL.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Moonshot => "https://api.moonshot.cn/v1",
            LlmProvider::MiniMax => "https://api.minimax.chat/v1",
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LlmProvider::Mock => "mock://local",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::Moonshot => Some("MOONSHOT_API_KEY"),
            LlmProvider::MiniMax => Some("MINIMAX_API_KEY"),
            LlmProvider::OpenRouter => Some("OPENROUTER_API_KEY"),
            LlmProvider::Mock => None,
        }
    }

    /// Whether structured-output (`response_format` json_schema) is known
    /// to be honoured by the provider. Forwarding it elsewhere breaks
    /// streaming on several gateways.
    pub fn supports_json_schema(&self) -> bool {
        matches!(self, LlmProvider::OpenRouter | LlmProvider::MiniMax)
    }
}
