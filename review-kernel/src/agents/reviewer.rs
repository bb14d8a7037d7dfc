//! Review agent loop: streaming LLM calls with tool-call arbitration.
//!
//! Each turn the adapter is called with the full conversation and the tool
//! schemas, wrapped in a hard per-call deadline (`LLM_CALL_TIMEOUT`).
//! Requested tools are partitioned into auto-approved and pending; the
//! pending ones go through the caller-supplied approver and the rest are
//! denied with a synthetic error result so the model sees the refusal and
//! cannot loop forever. Approved tools run concurrently; results are
//! appended in the input order of the tool calls so the model's view stays
//! deterministic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ai_llm_service::{ApiLogger, CompleteOptions, LlmAdapter, NormalizedToolCall};

use crate::conversation::ConversationState;
use crate::errors::{KernelError, KernelResult};
use crate::events::{EventSender, PipelineEvent};
use crate::prompts::SYSTEM_PROMPT_REVIEWER;
use crate::tools::policy::ResolvedTools;
use crate::tools::{ToolResultMsg, ToolRuntime};
use crate::usage::UsageAggregator;

const DEFAULT_LLM_CALL_TIMEOUT_SECS: u64 = 120;

const DENIED_MESSAGE: &str = "Tool call denied: automatic execution is off and no approver is \
configured (auto_approve_tools/tool_approver).";

/// Caller-supplied approval hook: receives the pending calls, returns the
/// approved subset.
pub type ToolApprover = Arc<dyn Fn(&[NormalizedToolCall]) -> Vec<NormalizedToolCall> + Send + Sync>;

fn call_timeout() -> Duration {
    let secs = std::env::var("LLM_CALL_TIMEOUT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_LLM_CALL_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// The reviewer: adapter + tool runtime + conversation state.
pub struct CodeReviewAgent<'a> {
    adapter: &'a LlmAdapter,
    runtime: &'a ToolRuntime,
    usage: &'a UsageAggregator,
    events: EventSender,
    state: ConversationState,
    trace_logger: Option<&'a ApiLogger>,
    trace_path: Option<PathBuf>,
    call_index: u32,
}

impl<'a> CodeReviewAgent<'a> {
    pub fn new(
        adapter: &'a LlmAdapter,
        runtime: &'a ToolRuntime,
        usage: &'a UsageAggregator,
        events: EventSender,
        state: ConversationState,
        trace_logger: Option<&'a ApiLogger>,
    ) -> Self {
        Self {
            adapter,
            runtime,
            usage,
            events,
            state,
            trace_logger,
            trace_path: None,
            call_index: 0,
        }
    }

    pub fn llm_calls_made(&self) -> u32 {
        self.call_index
    }

    /// Run the loop until `finish_reason == "stop"` and return the final
    /// report content.
    pub async fn run(
        &mut self,
        prompt: &str,
        files: &[String],
        tools: &ResolvedTools,
        approver: Option<&ToolApprover>,
    ) -> KernelResult<String> {
        if self.state.is_empty() {
            self.state.add_system_message(SYSTEM_PROMPT_REVIEWER);
        }
        self.state.add_user_message(prompt);

        if let (Some(logger), None) = (self.trace_logger, self.trace_path.as_ref()) {
            let tool_names: Vec<Value> = tools
                .schemas
                .iter()
                .filter_map(|schema| schema.pointer("/function/name").cloned())
                .collect();
            self.trace_path = Some(logger.start(
                "agent_session",
                &json!({
                    "provider": self.adapter.provider_name(),
                    "files": files,
                    "tools_exposed": tool_names,
                }),
            ));
        }

        let whitelist: Vec<&str> = tools.auto_approve.iter().map(String::as_str).collect();
        let timeout = call_timeout();

        loop {
            self.call_index += 1;
            let call_index = self.call_index;

            if let (Some(logger), Some(path)) = (self.trace_logger, self.trace_path.as_ref()) {
                logger.append(
                    path,
                    &format!("LLM_CALL_{call_index}_REQUEST"),
                    &json!({
                        "call_index": call_index,
                        "model": self.adapter.model(),
                        "messages": self.state.messages(),
                    }),
                );
            }

            // Per-call delta forwarder keeps streaming output flowing to
            // the consumer with the call index attached.
            let (delta_tx, mut delta_rx) = mpsc::unbounded_channel();
            let forwarder_events = self.events.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(delta) = delta_rx.recv().await {
                    let delta: ai_llm_service::DeltaEvent = delta;
                    if delta.content_delta.is_empty() && delta.reasoning_delta.is_empty() {
                        continue;
                    }
                    forwarder_events.send(PipelineEvent::Delta {
                        content_delta: non_empty(delta.content_delta),
                        reasoning_delta: non_empty(delta.reasoning_delta),
                        call_index,
                    });
                }
            });

            let options = CompleteOptions {
                tools: Some(tools.schemas.clone()),
                observer: Some(delta_tx),
                ..CompleteOptions::default()
            };
            let completion =
                tokio::time::timeout(timeout, self.adapter.complete(self.state.messages(), options))
                    .await;
            let _ = forwarder.await;

            let message = match completion {
                Ok(Ok(message)) => message,
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {
                    if let (Some(logger), Some(path)) = (self.trace_logger, self.trace_path.as_ref())
                    {
                        logger.append(
                            path,
                            &format!("LLM_CALL_{call_index}_TIMEOUT"),
                            &json!({ "timeout_secs": timeout.as_secs() }),
                        );
                    }
                    return Err(KernelError::LlmCallTimeout {
                        call_index,
                        timeout_secs: timeout.as_secs(),
                    });
                }
            };

            // At most one usage event per call, only for non-zero numbers.
            if let Some(usage) = message.usage.filter(|u| !u.is_zero()) {
                let (call_usage, session_usage) =
                    self.usage.update(&usage, "review", Some(call_index));
                self.events.send(PipelineEvent::UsageSummary {
                    usage_stage: "review".to_string(),
                    call_index: Some(call_index),
                    usage: serde_json::to_value(usage).unwrap_or_default(),
                    call_usage: serde_json::to_value(call_usage).unwrap_or_default(),
                    session_usage: serde_json::to_value(session_usage).unwrap_or_default(),
                });
            }

            if let (Some(logger), Some(path)) = (self.trace_logger, self.trace_path.as_ref()) {
                logger.append(
                    path,
                    &format!("LLM_CALL_{call_index}_RESPONSE"),
                    &json!({
                        "call_index": call_index,
                        "assistant_message": {
                            "content": message.content,
                            "finish_reason": message.finish_reason,
                            "tool_calls": message.tool_calls,
                        },
                    }),
                );
            }

            let content = message.content_str().to_string();
            if message.tool_calls.is_empty() {
                self.state.add_assistant_message(&content, &[]);
                self.state.prune_history();
                if message.finish_reason.as_deref() == Some("stop") {
                    if let (Some(logger), Some(path)) =
                        (self.trace_logger, self.trace_path.as_ref())
                    {
                        logger.append(
                            path,
                            "SESSION_END",
                            &json!({ "call_index": call_index, "final_content": content }),
                        );
                    }
                    return Ok(content);
                }
                continue;
            }

            // Arguments that failed to parse are surfaced unchanged to the
            // model, plus a warning for the consumer.
            for call in &message.tool_calls {
                if call.arguments.get("_error").is_some() {
                    self.events.warning(
                        Some("reviewer"),
                        &format!("tool call '{}' carried unparseable arguments", call.name),
                    );
                }
            }

            let (approved, pending): (Vec<_>, Vec<_>) = message
                .tool_calls
                .iter()
                .cloned()
                .partition(|call| whitelist.contains(&call.name.as_str()));
            let mut approved = approved;
            let denied: Vec<NormalizedToolCall> = if pending.is_empty() {
                Vec::new()
            } else if let Some(approver) = approver {
                let user_approved = approver(&pending);
                let approved_keys: Vec<(String, String)> = user_approved
                    .iter()
                    .map(|call| (call.id.clone(), call.name.clone()))
                    .collect();
                let denied = pending
                    .iter()
                    .filter(|call| {
                        !approved_keys.contains(&(call.id.clone(), call.name.clone()))
                    })
                    .cloned()
                    .collect();
                approved.extend(user_approved);
                denied
            } else {
                pending
            };

            // The original call chain (denied included) goes into state so
            // the model's history stays consistent.
            self.state.add_assistant_message(&content, &message.tool_calls);

            let executed = self.runtime.execute(&approved).await;
            let denied_results: Vec<ToolResultMsg> = denied
                .iter()
                .map(|call| ToolResultMsg::denied(call, DENIED_MESSAGE))
                .collect();
            debug!(
                call_index,
                approved = executed.len(),
                denied = denied_results.len(),
                "tool turn executed"
            );

            if let (Some(logger), Some(path)) = (self.trace_logger, self.trace_path.as_ref()) {
                logger.append(
                    path,
                    &format!("TOOLS_EXECUTION_{call_index}"),
                    &json!({
                        "call_index": call_index,
                        "approved": approved.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                        "denied": denied.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                        "results": executed
                            .iter()
                            .chain(denied_results.iter())
                            .map(|r| truncated_result(&r))
                            .collect::<Vec<_>>(),
                    }),
                );
            }

            for (call, result) in approved.iter().zip(executed.iter()) {
                self.emit_tool_result(call_index, call, result);
            }
            for (call, result) in denied.iter().zip(denied_results.iter()) {
                self.emit_tool_result(call_index, call, result);
            }

            // Append results in the input order of the tool calls.
            let mut all_results: Vec<&ToolResultMsg> = Vec::new();
            for call in &message.tool_calls {
                if let Some(result) = executed
                    .iter()
                    .chain(denied_results.iter())
                    .find(|r| r.tool_call_id == call.id)
                {
                    all_results.push(result);
                }
            }
            if all_results.len() != message.tool_calls.len() {
                warn!(call_index, "tool result count mismatch");
            }
            for result in all_results {
                self.state.add_tool_result(result);
            }
            self.state.prune_history();
        }
    }

    fn emit_tool_result(&self, call_index: u32, call: &NormalizedToolCall, result: &ToolResultMsg) {
        self.events.send(PipelineEvent::ToolResult {
            call_index,
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            content: if result.content.is_empty() {
                None
            } else {
                Some(result.content.clone())
            },
            error: result.error.clone(),
        });
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn truncated_result(result: &&ToolResultMsg) -> Value {
    let mut content = result.content.clone();
    if content.len() > 1000 {
        content.truncate(1000);
        content.push_str("...(truncated)");
    }
    json!({
        "tool_call_id": result.tool_call_id,
        "name": result.name,
        "content": content,
        "error": result.error,
        "duration_ms": result.duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_llm_service::{MockLlmClient, MockTurn};
    use serde_json::json;

    fn tool_call(id: &str, name: &str) -> NormalizedToolCall {
        NormalizedToolCall {
            id: id.into(),
            name: name.into(),
            index: 0,
            arguments: json!({"path": "f.txt", "start_line": 1, "end_line": 1}),
        }
    }

    fn resolved(auto: &[&str]) -> ResolvedTools {
        ResolvedTools {
            schemas: crate::tools::tool_schemas(&["read_file_hunk".to_string()]),
            auto_approve: auto.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn runtime_with_file() -> (tempfile::TempDir, ToolRuntime) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "hello\n").unwrap();
        let mut runtime = ToolRuntime::new(dir.path());
        runtime.register_builtins(&["read_file_hunk".to_string()]);
        (dir, runtime)
    }

    /// A mock that emits N tool-call turns then stops makes exactly N+1
    /// LLM calls.
    #[tokio::test]
    async fn loop_terminates_after_n_plus_one_calls() {
        let n = 3;
        let mut turns: Vec<MockTurn> = (0..n)
            .map(|i| MockTurn::tool_calls(vec![tool_call(&format!("c{i}"), "read_file_hunk")]))
            .collect();
        turns.push(MockTurn::stop("# Review\nAll fine."));
        let adapter = LlmAdapter::Mock(MockLlmClient::new(turns));

        let (_dir, runtime) = runtime_with_file();
        let usage = UsageAggregator::new();
        let mut agent = CodeReviewAgent::new(
            &adapter,
            &runtime,
            &usage,
            EventSender::disconnected(),
            ConversationState::new(),
            None,
        );
        let content = agent
            .run("review this", &[], &resolved(&["read_file_hunk"]), None)
            .await
            .unwrap();
        assert_eq!(content, "# Review\nAll fine.");
        assert_eq!(agent.llm_calls_made(), n as u32 + 1);
    }

    /// S6: with no approver, a non-whitelisted tool is denied and the
    /// conversation carries a tool result with a non-empty error.
    #[tokio::test]
    async fn denied_tools_surface_as_error_results() {
        let adapter = LlmAdapter::Mock(MockLlmClient::new(vec![
            MockTurn::tool_calls(vec![tool_call("c1", "run_shell")]),
            MockTurn::stop("done"),
        ]));
        let (_dir, runtime) = runtime_with_file();
        let usage = UsageAggregator::new();
        let (events, mut rx) = EventSender::new();
        let mut agent = CodeReviewAgent::new(
            &adapter,
            &runtime,
            &usage,
            events,
            ConversationState::new(),
            None,
        );
        let content = agent
            .run("review", &[], &resolved(&["read_file_hunk"]), None)
            .await
            .unwrap();
        assert_eq!(content, "done");

        let denied = agent
            .state
            .messages()
            .iter()
            .find(|m| m["role"] == "tool" && m["name"] == "run_shell")
            .expect("denied tool result in conversation");
        assert!(
            denied["error"]
                .as_str()
                .is_some_and(|e| e.contains("denied"))
        );

        let mut saw_tool_error_event = false;
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::ToolResult { tool_name, error, .. } = event {
                if tool_name == "run_shell" && error.is_some() {
                    saw_tool_error_event = true;
                }
            }
        }
        assert!(saw_tool_error_event);
    }

    /// An approver can approve a subset; the rest is denied.
    #[tokio::test]
    async fn approver_subset_is_honoured() {
        let adapter = LlmAdapter::Mock(MockLlmClient::new(vec![
            MockTurn::tool_calls(vec![
                tool_call("keep", "read_file_hunk"),
                tool_call("drop", "run_shell"),
            ]),
            MockTurn::stop("done"),
        ]));
        let (_dir, runtime) = runtime_with_file();
        let usage = UsageAggregator::new();
        let mut agent = CodeReviewAgent::new(
            &adapter,
            &runtime,
            &usage,
            EventSender::disconnected(),
            ConversationState::new(),
            None,
        );
        let approver: ToolApprover = Arc::new(|pending: &[NormalizedToolCall]| {
            pending
                .iter()
                .filter(|c| c.name == "read_file_hunk")
                .cloned()
                .collect()
        });
        // Nothing auto-approved: both calls go through the approver.
        agent
            .run("review", &[], &resolved(&[]), Some(&approver))
            .await
            .unwrap();

        let messages = agent.state.messages();
        let kept = messages
            .iter()
            .find(|m| m["role"] == "tool" && m["tool_call_id"] == "keep")
            .unwrap();
        assert!(kept["error"].is_null());
        let dropped = messages
            .iter()
            .find(|m| m["role"] == "tool" && m["tool_call_id"] == "drop")
            .unwrap();
        assert!(dropped["error"].as_str().is_some());
    }

    /// Usage events fire at most once per call and only when non-zero.
    #[tokio::test]
    async fn one_usage_summary_per_call() {
        let adapter = LlmAdapter::Mock(MockLlmClient::new(vec![MockTurn::stop("done")]));
        let (_dir, runtime) = runtime_with_file();
        let usage = UsageAggregator::new();
        let (events, mut rx) = EventSender::new();
        let mut agent = CodeReviewAgent::new(
            &adapter,
            &runtime,
            &usage,
            events,
            ConversationState::new(),
            None,
        );
        agent
            .run("review", &[], &resolved(&["read_file_hunk"]), None)
            .await
            .unwrap();

        let mut usage_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PipelineEvent::UsageSummary { .. }) {
                usage_events += 1;
            }
        }
        assert_eq!(usage_events, 1);
    }
}
