//! Error types for `ai-llm-service`.
//!
//! Goals:
//! - Single root `AiLlmError` for all public functions.
//! - Provider-aware error kinds (HTTP status + response snippet, decode
//!   failures, timeout kinds) so degraded paths can be reported precisely.
//! - No dynamic dispatch, ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type AiResult<T> = std::result::Result<T, AiLlmError>;

/// Root error type for the LLM service layer.
#[derive(Debug, Error)]
pub enum AiLlmError {
    /// Provider-level failure (bad status, decode, timeout, missing key).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Transport failure below the provider protocol (DNS/connect/reset).
    #[error("http transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),

    /// Configuration problems (bad endpoint, unknown provider string).
    #[error("llm config error: {0}")]
    Config(String),
}

impl AiLlmError {
    /// Timeout kind when this error is a streaming timeout.
    pub fn timeout_kind(&self) -> Option<TimeoutKind> {
        match self {
            AiLlmError::Provider(err) => match err.kind {
                ProviderErrorKind::Timeout { kind, .. } => Some(kind),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Which guard fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// No streaming bytes arrived at all.
    FirstToken,
    /// The stream went silent between increments.
    Idle,
    /// The whole call exceeded its end-to-end deadline.
    Call,
}

impl TimeoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutKind::FirstToken => "first_token",
            TimeoutKind::Idle => "idle",
            TimeoutKind::Call => "call",
        }
    }
}

/// Non-2xx response with enough context to diagnose it.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: u16,
    pub url: String,
    pub snippet: String,
}

/// Provider error with its origin attached.
#[derive(Debug, Error)]
#[error("{provider}: {kind}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: &str, kind: ProviderErrorKind) -> Self {
        Self {
            provider: provider.to_string(),
            kind,
        }
    }
}

/// What went wrong at the provider boundary.
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    #[error("missing API key")]
    MissingApiKey,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("http status {status} from {url}: {snippet}", status = .0.status, url = .0.url, snippet = .0.snippet)]
    HttpStatus(HttpError),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("empty stream (no choices received)")]
    EmptyStream,

    #[error("{} timeout after {seconds}s", kind.as_str())]
    Timeout { kind: TimeoutKind, seconds: f64 },
}

/// Short, single-line snippet of an error response body.
pub fn make_snippet(body: &str) -> String {
    let collapsed: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= 300 {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(300).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_collapses_and_truncates() {
        assert_eq!(make_snippet("a\n  b\tc"), "a b c");
        let long = "x".repeat(500);
        let snippet = make_snippet(&long);
        assert_eq!(snippet.chars().count(), 301);
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn timeout_kind_surfaces_through_root_error() {
        let err: AiLlmError = ProviderError::new(
            "openai",
            ProviderErrorKind::Timeout {
                kind: TimeoutKind::Idle,
                seconds: 120.0,
            },
        )
        .into();
        assert_eq!(err.timeout_kind(), Some(TimeoutKind::Idle));
        assert!(err.to_string().contains("idle timeout"));
    }
}
