//! Stream processor: provider chunks → one normalized assistant message.
//!
//! Consumes an OpenAI-compatible SSE body (`data: {...}` lines terminated
//! by `data: [DONE]`) and accumulates:
//! - content deltas (string form or list-of-text-parts form),
//! - a parallel reasoning channel (`reasoning_content` / `analysis` /
//!   `thoughts` fields plus `<think>…</think>` tags inside content),
//! - tool calls reassembled by `index` with fragmented JSON argument
//!   strings concatenated (parse failures yield `{_raw, _error}` — never a
//!   crash),
//! - the last non-null `usage` payload.
//!
//! Two guards protect the read loop: a first-token timeout until any bytes
//! arrive and an idle timeout between increments.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;

use crate::error_handler::{AiResult, ProviderError, ProviderErrorKind, TimeoutKind};

/// Token usage of one call, field names unified across providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Read whichever of the alternative field names are present.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let read = |names: &[&str]| -> u64 {
            names
                .iter()
                .filter_map(|name| obj.get(*name).and_then(Value::as_u64))
                .next()
                .unwrap_or(0)
        };
        Some(Self {
            input_tokens: read(&["input_tokens", "prompt_tokens"]),
            output_tokens: read(&["output_tokens", "completion_tokens"]),
            total_tokens: read(&["total_tokens"]),
        })
    }

    /// Some providers stream all-zero usage; that is noise, not data.
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.total_tokens == 0
    }
}

/// One reassembled tool call.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedToolCall {
    pub id: String,
    pub name: String,
    pub index: u32,
    pub arguments: Value,
}

/// The normalized assistant message produced from one stream.
#[derive(Debug, Clone, Default)]
pub struct NormalizedMessage {
    pub role: String,
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<NormalizedToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub provider: String,
}

impl NormalizedMessage {
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Per-delta observer event forwarded while streaming.
#[derive(Debug, Clone, Default)]
pub struct DeltaEvent {
    pub content_delta: String,
    pub reasoning_delta: String,
    pub tool_call_deltas: Vec<Value>,
    pub usage: Option<Usage>,
}

/// First-token / idle timeouts around the chunk reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamGuards {
    pub first_token: Option<Duration>,
    pub idle: Option<Duration>,
}

#[derive(Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    argument_chunks: Vec<String>,
}

/// Aggregates streaming increments into a normalized assistant message.
pub struct StreamProcessor {
    provider: String,
}

impl StreamProcessor {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
        }
    }

    /// Consume an SSE byte stream until `[DONE]` or EOF.
    pub async fn collect<S>(
        &self,
        mut body: S,
        guards: StreamGuards,
        observer: Option<&UnboundedSender<DeltaEvent>>,
    ) -> AiResult<NormalizedMessage>
    where
        S: Stream<Item = AiResult<Vec<u8>>> + Unpin,
    {
        let mut line_buf: Vec<u8> = Vec::new();
        let mut pending_lines: Vec<String> = Vec::new();
        let mut first_bytes_seen = false;

        let mut content_parts: Vec<String> = Vec::new();
        let mut reasoning_parts: Vec<String> = Vec::new();
        let mut role = "assistant".to_string();
        let mut finish_reason: Option<String> = None;
        let mut tool_buffers: BTreeMap<u32, ToolCallBuffer> = BTreeMap::new();
        let mut last_usage: Option<Usage> = None;

        'read: loop {
            while pending_lines.is_empty() {
                let guard = if first_bytes_seen {
                    guards.idle
                } else {
                    guards.first_token
                };
                let next = match guard {
                    Some(limit) => match tokio::time::timeout(limit, body.next()).await {
                        Ok(item) => item,
                        Err(_) => {
                            let kind = if first_bytes_seen {
                                TimeoutKind::Idle
                            } else {
                                TimeoutKind::FirstToken
                            };
                            return Err(ProviderError::new(
                                &self.provider,
                                ProviderErrorKind::Timeout {
                                    kind,
                                    seconds: limit.as_secs_f64(),
                                },
                            )
                            .into());
                        }
                    },
                    None => body.next().await,
                };
                match next {
                    Some(Ok(bytes)) => {
                        first_bytes_seen = true;
                        line_buf.extend_from_slice(&bytes);
                        drain_lines(&mut line_buf, &mut pending_lines);
                    }
                    Some(Err(err)) => return Err(err),
                    None => break 'read,
                }
            }

            let line = pending_lines.remove(0);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                break;
            }
            let Ok(chunk) = serde_json::from_str::<Value>(data) else {
                // Keep-alives and malformed fragments are skipped.
                continue;
            };

            if let Some(usage) = chunk.get("usage").and_then(Usage::from_value) {
                last_usage = Some(usage);
            }
            let choice = chunk
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|c| c.first())
                .cloned()
                .unwrap_or(Value::Null);
            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                finish_reason = Some(reason.to_string());
            }
            let delta = choice.get("delta").cloned().unwrap_or(Value::Null);
            if let Some(r) = delta.get("role").and_then(Value::as_str) {
                role = r.to_string();
            }

            let content_delta = extract_text(delta.get("content"));
            if !content_delta.is_empty() {
                content_parts.push(content_delta.clone());
            }
            let reasoning_delta = ["reasoning_content", "analysis", "thoughts"]
                .iter()
                .find_map(|key| {
                    let text = extract_text(delta.get(*key));
                    if text.is_empty() { None } else { Some(text) }
                })
                .unwrap_or_default();
            if !reasoning_delta.is_empty() {
                reasoning_parts.push(reasoning_delta.clone());
            }

            let tool_call_deltas: Vec<Value> = match delta.get("tool_calls") {
                Some(Value::Array(calls)) => calls.clone(),
                Some(Value::Object(call)) => vec![Value::Object(call.clone())],
                _ => Vec::new(),
            };
            for call in &tool_call_deltas {
                let Some(index) = call.get("index").and_then(Value::as_u64) else {
                    continue;
                };
                let buffer = tool_buffers.entry(index as u32).or_default();
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    buffer.id = Some(id.to_string());
                }
                if let Some(function) = call.get("function").and_then(Value::as_object) {
                    if let Some(name) = function.get("name").and_then(Value::as_str) {
                        buffer.name = Some(name.to_string());
                    }
                    if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                        buffer.argument_chunks.push(args.to_string());
                    }
                }
            }

            if let Some(observer) = observer {
                let _ = observer.send(DeltaEvent {
                    content_delta,
                    reasoning_delta,
                    tool_call_deltas,
                    usage: chunk.get("usage").and_then(Usage::from_value),
                });
            }
        }

        let tool_calls = tool_buffers
            .into_iter()
            .map(|(index, buffer)| {
                let args_text: String = buffer.argument_chunks.concat();
                let arguments = if args_text.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&args_text)
                        .unwrap_or_else(|_| json!({ "_raw": args_text, "_error": "invalid_json" }))
                };
                NormalizedToolCall {
                    id: buffer.id.unwrap_or_else(|| format!("call_{index}")),
                    name: buffer.name.unwrap_or_else(|| "unknown_tool".to_string()),
                    index,
                    arguments,
                }
            })
            .collect();

        let raw_content = content_parts.concat();
        let (content, think_reasoning) = strip_think_tags(&raw_content);
        let mut reasoning = reasoning_parts.concat();
        if !think_reasoning.is_empty() {
            if !reasoning.is_empty() {
                reasoning.push_str("\n\n");
            }
            reasoning.push_str(&think_reasoning);
        }

        Ok(NormalizedMessage {
            role,
            content: non_empty(content.trim().to_string()),
            reasoning: non_empty(reasoning.trim().to_string()),
            tool_calls,
            finish_reason,
            usage: last_usage,
            provider: self.provider.clone(),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Split complete lines off the byte buffer.
fn drain_lines(buf: &mut Vec<u8>, out: &mut Vec<String>) {
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line);
        out.push(text.trim_end_matches(['\n', '\r']).to_string());
    }
}

/// Normalized text extraction: handles plain strings and lists of
/// `{type: "text", text}` parts.
fn extract_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| {
                let obj = p.as_object()?;
                if obj.get("type").and_then(Value::as_str) == Some("text") {
                    obj.get("text").and_then(Value::as_str).map(str::to_string)
                } else {
                    None
                }
            })
            .collect(),
        _ => String::new(),
    }
}

/// Pull `<think>…</think>` spans out of content into the reasoning channel.
/// An unterminated opening tag swallows the rest of the content.
fn strip_think_tags(content: &str) -> (String, String) {
    let mut cleaned = String::with_capacity(content.len());
    let mut reasoning = String::new();
    let mut rest = content;
    loop {
        match rest.find("<think>") {
            Some(open) => {
                cleaned.push_str(&rest[..open]);
                let after_open = &rest[open + "<think>".len()..];
                match after_open.find("</think>") {
                    Some(close) => {
                        reasoning.push_str(after_open[..close].trim());
                        reasoning.push('\n');
                        rest = &after_open[close + "</think>".len()..];
                    }
                    None => {
                        reasoning.push_str(after_open.trim());
                        rest = "";
                        break;
                    }
                }
            }
            None => {
                cleaned.push_str(rest);
                break;
            }
        }
    }
    (cleaned, reasoning.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn sse(lines: &[&str]) -> impl Stream<Item = AiResult<Vec<u8>>> + Unpin {
        let chunks: Vec<AiResult<Vec<u8>>> = lines
            .iter()
            .map(|l| Ok(format!("{l}\n").into_bytes()))
            .collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn accumulates_content_deltas() {
        let body = sse(&[
            r#"data: {"choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
            "data: [DONE]",
        ]);
        let msg = StreamProcessor::new("openai")
            .collect(body, StreamGuards::default(), None)
            .await
            .unwrap();
        assert_eq!(msg.content.as_deref(), Some("Hello"));
        assert_eq!(msg.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn reassembles_fragmented_tool_call_arguments() {
        let body = sse(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"read_file_hunk","arguments":"{\"pa"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"th\": \"a.py\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ]);
        let msg = StreamProcessor::new("openai")
            .collect(body, StreamGuards::default(), None)
            .await
            .unwrap();
        assert_eq!(msg.tool_calls.len(), 1);
        let call = &msg.tool_calls[0];
        assert_eq!(call.name, "read_file_hunk");
        assert_eq!(call.arguments["path"], "a.py");
    }

    #[tokio::test]
    async fn invalid_argument_json_is_carried_not_thrown() {
        let body = sse(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"t","arguments":"{broken"}}]}}]}"#,
            "data: [DONE]",
        ]);
        let msg = StreamProcessor::new("openai")
            .collect(body, StreamGuards::default(), None)
            .await
            .unwrap();
        assert_eq!(msg.tool_calls[0].arguments["_error"], "invalid_json");
        assert_eq!(msg.tool_calls[0].arguments["_raw"], "{broken");
    }

    #[tokio::test]
    async fn reasoning_channel_collects_fields_and_think_tags() {
        let body = sse(&[
            r#"data: {"choices":[{"delta":{"reasoning_content":"step one. "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"<think>hidden</think>answer"}}]}"#,
            "data: [DONE]",
        ]);
        let msg = StreamProcessor::new("openai")
            .collect(body, StreamGuards::default(), None)
            .await
            .unwrap();
        assert_eq!(msg.content.as_deref(), Some("answer"));
        let reasoning = msg.reasoning.unwrap();
        assert!(reasoning.contains("step one."));
        assert!(reasoning.contains("hidden"));
    }

    #[tokio::test]
    async fn last_usage_wins_and_observer_sees_deltas() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let body = sse(&[
            r#"data: {"choices":[{"delta":{"content":"x"}}],"usage":{"prompt_tokens":0,"completion_tokens":0,"total_tokens":0}}"#,
            r#"data: {"choices":[{"delta":{"content":"y"}}],"usage":{"prompt_tokens":10,"completion_tokens":2,"total_tokens":12}}"#,
            "data: [DONE]",
        ]);
        let msg = StreamProcessor::new("openai")
            .collect(body, StreamGuards::default(), Some(&tx))
            .await
            .unwrap();
        let usage = msg.usage.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.total_tokens, 12);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.content_delta, "x");
    }

    #[tokio::test]
    async fn first_token_timeout_fires_on_silence() {
        let body = stream::pending::<AiResult<Vec<u8>>>();
        let guards = StreamGuards {
            first_token: Some(Duration::from_millis(20)),
            idle: None,
        };
        let err = StreamProcessor::new("openai")
            .collect(Box::pin(body), guards, None)
            .await
            .unwrap_err();
        assert_eq!(err.timeout_kind(), Some(TimeoutKind::FirstToken));
    }

    #[tokio::test]
    async fn list_of_text_parts_is_flattened() {
        let body = sse(&[
            r#"data: {"choices":[{"delta":{"content":[{"type":"text","text":"a"},{"type":"image","text":"no"},{"type":"text","text":"b"}]}}]}"#,
            "data: [DONE]",
        ]);
        let msg = StreamProcessor::new("minimax")
            .collect(body, StreamGuards::default(), None)
            .await
            .unwrap();
        assert_eq!(msg.content.as_deref(), Some("ab"));
    }
}
