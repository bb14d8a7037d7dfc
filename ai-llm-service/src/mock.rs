//! Deterministic mock client.
//!
//! Substituted when no provider credentials are configured (a recorded
//! fallback, not an error) and used by the agent-loop tests. Each call
//! pops the next scripted turn; when the script runs dry a canned final
//! answer is returned so the loop always terminates.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::stream::{DeltaEvent, NormalizedMessage, NormalizedToolCall, Usage};

/// One scripted assistant turn.
#[derive(Debug, Clone)]
pub struct MockTurn {
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<NormalizedToolCall>,
    pub finish_reason: String,
    pub usage: Option<Usage>,
}

impl MockTurn {
    /// Final text answer with `finish_reason == "stop"`.
    pub fn stop(content: &str) -> Self {
        Self {
            content: content.to_string(),
            reasoning: None,
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Some(Usage {
                input_tokens: 100,
                output_tokens: 50,
                total_tokens: 150,
            }),
        }
    }

    /// A turn requesting the given tool calls.
    pub fn tool_calls(calls: Vec<NormalizedToolCall>) -> Self {
        Self {
            content: String::new(),
            reasoning: None,
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
            usage: Some(Usage {
                input_tokens: 80,
                output_tokens: 20,
                total_tokens: 100,
            }),
        }
    }
}

/// Scripted in-process stand-in for a streaming provider.
#[derive(Debug)]
pub struct MockLlmClient {
    model: String,
    script: Mutex<VecDeque<MockTurn>>,
}

const CANNED_REVIEW: &str = "\
# Review Notes

## Offline review (no LLM provider configured)

No model credentials were found, so this report only restates the collected
diff metadata. Configure a provider API key to get a real review.
";

impl MockLlmClient {
    pub fn new(script: Vec<MockTurn>) -> Self {
        Self {
            model: "mock-reviewer".to_string(),
            script: Mutex::new(script.into()),
        }
    }

    /// Mock used by the factory when no provider is configured.
    pub fn canned() -> Self {
        Self::new(vec![MockTurn::stop(CANNED_REVIEW)])
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Pop the next scripted turn, emitting observer deltas on the way.
    pub fn complete(&self, observer: Option<&UnboundedSender<DeltaEvent>>) -> NormalizedMessage {
        let turn = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| MockTurn::stop(CANNED_REVIEW));

        if let Some(observer) = observer {
            // Two content chunks so consumers exercise delta handling.
            let mid = turn
                .content
                .char_indices()
                .nth(turn.content.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (head, tail) = turn.content.split_at(mid);
            for piece in [head, tail] {
                if !piece.is_empty() {
                    let _ = observer.send(DeltaEvent {
                        content_delta: piece.to_string(),
                        ..DeltaEvent::default()
                    });
                }
            }
            if let Some(reasoning) = &turn.reasoning {
                let _ = observer.send(DeltaEvent {
                    reasoning_delta: reasoning.clone(),
                    ..DeltaEvent::default()
                });
            }
        }

        NormalizedMessage {
            role: "assistant".to_string(),
            content: if turn.content.is_empty() {
                None
            } else {
                Some(turn.content)
            },
            reasoning: turn.reasoning,
            tool_calls: turn.tool_calls,
            finish_reason: Some(turn.finish_reason),
            usage: turn.usage,
            provider: "mock".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn script_is_consumed_in_order_then_repeats_canned_stop() {
        let client = MockLlmClient::new(vec![
            MockTurn::tool_calls(vec![NormalizedToolCall {
                id: "c1".into(),
                name: "read_file_hunk".into(),
                index: 0,
                arguments: json!({"path": "a.py"}),
            }]),
            MockTurn::stop("done"),
        ]);

        let first = client.complete(None);
        assert_eq!(first.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(first.tool_calls.len(), 1);

        let second = client.complete(None);
        assert_eq!(second.content.as_deref(), Some("done"));

        // Script exhausted: keeps answering with a terminal turn.
        let third = client.complete(None);
        assert_eq!(third.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn observer_receives_content_deltas() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let client = MockLlmClient::new(vec![MockTurn::stop("hello world")]);
        let msg = client.complete(Some(&tx));
        assert_eq!(msg.content.as_deref(), Some("hello world"));

        let mut streamed = String::new();
        while let Ok(event) = rx.try_recv() {
            streamed.push_str(&event.content_delta);
        }
        assert_eq!(streamed, "hello world");
    }
}
