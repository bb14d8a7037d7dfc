//! Conversation state: messages in OpenAI wire shape.

use serde_json::{Value, json};

use ai_llm_service::NormalizedToolCall;

use crate::tools::ToolResultMsg;

/// Message list exchanged with the LLM; tool calls are preserved verbatim
/// so the model sees a consistent call chain.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Value>,
    max_messages: Option<usize>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn add_system_message(&mut self, content: &str) {
        self.messages.push(json!({ "role": "system", "content": content }));
    }

    pub fn add_user_message(&mut self, content: &str) {
        self.messages.push(json!({ "role": "user", "content": content }));
    }

    /// Append an assistant message, normalizing tool calls back into the
    /// provider wire shape (arguments as JSON strings).
    pub fn add_assistant_message(&mut self, content: &str, tool_calls: &[NormalizedToolCall]) {
        let mut message = json!({ "role": "assistant", "content": content });
        if !tool_calls.is_empty() {
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        },
                    })
                })
                .collect();
            message["tool_calls"] = json!(calls);
        }
        self.messages.push(message);
    }

    /// Append a tool result aligned with its `tool_call_id`. Denied calls
    /// carry a non-empty `error` so the model sees the refusal.
    pub fn add_tool_result(&mut self, result: &ToolResultMsg) {
        self.messages.push(json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "name": result.name,
            "content": result.content,
            "error": result.error,
        }));
    }

    /// Preload prior turns (message history from the request).
    pub fn load_history(&mut self, history: &[Value]) {
        for message in history {
            let role = message.get("role").and_then(Value::as_str).unwrap_or("");
            let content = message.get("content").and_then(Value::as_str).unwrap_or("");
            match role {
                "system" => self.add_system_message(content),
                "user" => self.add_user_message(content),
                "assistant" => self.messages.push(message.clone()),
                _ => {}
            }
        }
    }

    pub fn set_history_limit(&mut self, max_messages: Option<usize>) {
        self.max_messages = max_messages;
    }

    /// Drop the oldest non-system messages once over the limit.
    pub fn prune_history(&mut self) {
        let Some(max) = self.max_messages else {
            return;
        };
        if self.messages.len() <= max {
            return;
        }
        let system: Vec<Value> = self
            .messages
            .iter()
            .filter(|m| m.get("role").and_then(Value::as_str) == Some("system"))
            .cloned()
            .collect();
        let others: Vec<Value> = self
            .messages
            .iter()
            .filter(|m| m.get("role").and_then(Value::as_str) != Some("system"))
            .cloned()
            .collect();
        let keep = max.saturating_sub(system.len());
        let tail = others[others.len().saturating_sub(keep)..].to_vec();
        self.messages = system.into_iter().chain(tail).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_tool_calls_keep_wire_shape() {
        let mut state = ConversationState::new();
        state.add_assistant_message(
            "",
            &[NormalizedToolCall {
                id: "c1".into(),
                name: "read_file_hunk".into(),
                index: 0,
                arguments: json!({"path": "a.py"}),
            }],
        );
        let message = &state.messages()[0];
        assert_eq!(message["tool_calls"][0]["function"]["name"], "read_file_hunk");
        // Arguments must be a JSON *string* on the wire.
        assert!(message["tool_calls"][0]["function"]["arguments"].is_string());
    }

    #[test]
    fn pruning_keeps_system_messages_and_the_tail() {
        let mut state = ConversationState::new();
        state.add_system_message("sys");
        for i in 0..10 {
            state.add_user_message(&format!("msg {i}"));
        }
        state.set_history_limit(Some(4));
        state.prune_history();
        let messages = state.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[3]["content"], "msg 9");
    }
}
