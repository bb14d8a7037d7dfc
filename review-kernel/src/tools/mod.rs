//! Tool runtime: registration and concurrent dispatch of named tools.
//!
//! Tools are a closed set of builtin variants sharing one capability
//! (`invoke`), registered into a name → variant map. `execute` launches
//! every approved call concurrently and returns results in input order;
//! an unregistered name yields an error result, never a crash.

pub mod builtin;
pub mod policy;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use ai_llm_service::NormalizedToolCall;

pub use builtin::BuiltinTool;

/// Result of one tool call, aligned with its `tool_call_id`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultMsg {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolResultMsg {
    /// Synthetic result for a denied call; the non-empty `error` is what
    /// stops the model from re-requesting forever.
    pub fn denied(call: &NormalizedToolCall, message: &str) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: String::new(),
            error: Some(message.to_string()),
            duration_ms: None,
        }
    }
}

/// Registry + dispatcher for one session.
pub struct ToolRuntime {
    registry: HashMap<String, BuiltinTool>,
    project_root: PathBuf,
}

impl ToolRuntime {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            registry: HashMap::new(),
            project_root: project_root.into(),
        }
    }

    pub fn register(&mut self, name: &str, tool: BuiltinTool) {
        self.registry.insert(name.to_string(), tool);
    }

    /// Register the requested builtins (unknown names are ignored).
    pub fn register_builtins(&mut self, names: &[String]) {
        for name in names {
            if let Some(tool) = BuiltinTool::by_name(name) {
                self.register(name, tool);
            }
        }
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute all calls concurrently; results come back in input order.
    pub async fn execute(&self, calls: &[NormalizedToolCall]) -> Vec<ToolResultMsg> {
        let futures = calls.iter().map(|call| self.run_single(call));
        join_all(futures).await
    }

    async fn run_single(&self, call: &NormalizedToolCall) -> ToolResultMsg {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResultMsg {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content: String::new(),
                error: Some(format!("Tool '{}' not registered.", call.name)),
                duration_ms: None,
            };
        };

        let started = Instant::now();
        let outcome = tool.invoke(&self.project_root, &call.arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(tool = %call.name, duration_ms, ok = outcome.is_ok(), "tool executed");

        match outcome {
            Ok(content) => ToolResultMsg {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                error: None,
                duration_ms: Some(duration_ms),
            },
            Err(error) => ToolResultMsg {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                content: String::new(),
                error: Some(error),
                duration_ms: Some(duration_ms),
            },
        }
    }
}

/// OpenAI-style function schemas for the selected tools.
pub fn tool_schemas(names: &[String]) -> Vec<Value> {
    names
        .iter()
        .filter_map(|name| BuiltinTool::by_name(name).map(|tool| (name, tool)))
        .map(|(name, tool)| {
            json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters(),
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, name: &str, arguments: Value) -> NormalizedToolCall {
        NormalizedToolCall {
            id: id.into(),
            name: name.into(),
            index: 0,
            arguments,
        }
    }

    #[tokio::test]
    async fn unregistered_tool_yields_error_result() {
        let runtime = ToolRuntime::new(".");
        let results = runtime
            .execute(&[call("c1", "launch_missiles", json!({}))])
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].error.as_ref().unwrap().contains("not registered"));
    }

    #[tokio::test]
    async fn results_preserve_input_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let mut runtime = ToolRuntime::new(dir.path());
        runtime.register("read_file_hunk", BuiltinTool::ReadFileHunk);
        runtime.register("read_file_info", BuiltinTool::ReadFileInfo);

        let results = runtime
            .execute(&[
                call("c1", "read_file_info", json!({"path": "a.txt"})),
                call("c2", "read_file_hunk", json!({"path": "a.txt", "start_line": 1, "end_line": 2})),
            ])
            .await;
        assert_eq!(results[0].tool_call_id, "c1");
        assert_eq!(results[1].tool_call_id, "c2");
        assert!(results[1].content.contains("one"));
        assert!(results.iter().all(|r| r.duration_ms.is_some()));
    }

    #[test]
    fn schemas_cover_requested_builtins() {
        let schemas = tool_schemas(&["read_file_hunk".to_string(), "nope".to_string()]);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["function"]["name"], "read_file_hunk");
    }
}
