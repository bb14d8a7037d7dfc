//! LLM provider surface for the review pipeline.
//!
//! OpenAI-compatible `chat.completions` streaming only:
//! - [`client::OpenAiCompatClient`] — reqwest wrapper with connect/read
//!   timeouts and status handling,
//! - [`stream::StreamProcessor`] — provider chunks → one normalized
//!   assistant message, with first-token/idle guards,
//! - [`adapter::LlmAdapter`] — enum dispatch over real and mock clients,
//! - [`mock::MockLlmClient`] — deterministic offline fallback,
//! - [`config`] — provider catalogue, model preferences,
//!   `models_config.json` persistence,
//! - [`telemetry::ApiLogger`] — sampled JSONL wire logs + human summary.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error_handler;
pub mod mock;
pub mod stream;
pub mod telemetry;

pub use adapter::{CompleteOptions, LlmAdapter};
pub use client::OpenAiCompatClient;
pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use config::models_config::{ModelPreference, ModelsConfig};
pub use error_handler::{AiLlmError, AiResult, TimeoutKind};
pub use mock::{MockLlmClient, MockTurn};
pub use stream::{
    DeltaEvent, NormalizedMessage, NormalizedToolCall, StreamGuards, StreamProcessor, Usage,
};
pub use telemetry::ApiLogger;
