//! The upstream review request record.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use diff_engine::DiffMode;

fn default_llm_preference() -> String {
    "auto".to_string()
}

fn default_diff_mode() -> DiffMode {
    DiffMode::Auto
}

fn default_tool_names() -> Vec<String> {
    crate::tools::builtin::BUILTIN_SAFE_TOOLS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_use_merge_base() -> bool {
    true
}

/// One review session request as received from the HTTP shell or a CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    /// The reviewer instruction (must be non-empty).
    pub prompt: String,

    /// `auto` | `<provider>` | `<provider>:<model>`.
    #[serde(default = "default_llm_preference")]
    pub llm_preference: String,
    /// Separate preference for the planner/intent model; defaults to the
    /// review preference.
    #[serde(default)]
    pub planner_llm_preference: Option<String>,

    #[serde(default = "default_tool_names")]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub auto_approve: bool,

    /// Repository to review; the process working directory when omitted.
    #[serde(default)]
    pub project_root: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default = "default_diff_mode")]
    pub diff_mode: DiffMode,
    #[serde(default)]
    pub commit_from: Option<String>,
    #[serde(default)]
    pub commit_to: Option<String>,
    #[serde(default = "default_use_merge_base")]
    pub use_merge_base: bool,

    /// Prior conversation turns to preload into the reviewer.
    #[serde(default)]
    pub message_history: Vec<Value>,

    /// Stages to run; all of intent/planner/reviewer when omitted.
    #[serde(default)]
    pub agents: Option<BTreeSet<String>>,

    #[serde(default)]
    pub enable_static_scan: bool,
}

impl ReviewRequest {
    pub fn planner_preference(&self) -> &str {
        self.planner_llm_preference
            .as_deref()
            .unwrap_or(&self.llm_preference)
    }

    pub fn agent_enabled(&self, name: &str) -> bool {
        match &self.agents {
            Some(agents) => agents.contains(name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_deserializes_with_defaults() {
        let request: ReviewRequest =
            serde_json::from_str(r#"{"prompt": "review the diff"}"#).unwrap();
        assert_eq!(request.llm_preference, "auto");
        assert_eq!(request.diff_mode, DiffMode::Auto);
        assert!(!request.auto_approve);
        assert!(request.agent_enabled("planner"));
        assert!(request.tool_names.contains(&"read_file_hunk".to_string()));
    }

    #[test]
    fn agent_selection_limits_stages() {
        let request: ReviewRequest = serde_json::from_str(
            r#"{"prompt": "p", "agents": ["intent", "planner"]}"#,
        )
        .unwrap();
        assert!(request.agent_enabled("planner"));
        assert!(!request.agent_enabled("reviewer"));
    }

    #[test]
    fn planner_preference_falls_back_to_review_preference() {
        let request: ReviewRequest = serde_json::from_str(
            r#"{"prompt": "p", "llm_preference": "moonshot", "planner_llm_preference": "openai:gpt-4o-mini"}"#,
        )
        .unwrap();
        assert_eq!(request.planner_preference(), "openai:gpt-4o-mini");

        let request: ReviewRequest =
            serde_json::from_str(r#"{"prompt": "p", "llm_preference": "moonshot"}"#).unwrap();
        assert_eq!(request.planner_preference(), "moonshot");
    }
}
