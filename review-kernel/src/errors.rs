//! Crate-wide error hierarchy for the kernel.

use thiserror::Error;

pub type KernelResult<T> = Result<T, KernelError>;

/// Root error of the orchestration kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Diff collection failed (input error: surfaced, no retry).
    #[error(transparent)]
    Diff(#[from] diff_engine::Error),

    /// LLM layer failure that survived the retry policy.
    #[error(transparent)]
    Llm(#[from] ai_llm_service::AiLlmError),

    /// A review-loop LLM call exceeded its end-to-end deadline.
    #[error("LLM call timeout after {timeout_secs}s (call_index={call_index})")]
    LlmCallTimeout { call_index: u32, timeout_secs: u64 },

    /// Malformed request (empty prompt, bad preference string).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Log directory or config could not be prepared; do not start.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
