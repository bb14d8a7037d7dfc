//! Plan and bundle contracts shared by the planner, fusion and scheduler.

use serde::{Deserialize, Serialize};

use diff_engine::units::{HunkRange, LineNumbers};
use rule_engine::RuleContextLevel;

/// Final context depth vocabulary used from fusion onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalContextLevel {
    DiffOnly,
    Function,
    FileContext,
    FullFile,
}

impl FinalContextLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalContextLevel::DiffOnly => "diff_only",
            FinalContextLevel::Function => "function",
            FinalContextLevel::FileContext => "file_context",
            FinalContextLevel::FullFile => "full_file",
        }
    }

    /// Scope order: `diff_only < function < file_context < full_file`.
    pub fn rank(&self) -> u8 {
        match self {
            FinalContextLevel::DiffOnly => 0,
            FinalContextLevel::Function => 1,
            FinalContextLevel::FileContext => 2,
            FinalContextLevel::FullFile => 3,
        }
    }
}

impl From<RuleContextLevel> for FinalContextLevel {
    fn from(level: RuleContextLevel) -> Self {
        match level {
            RuleContextLevel::DiffOnly => FinalContextLevel::DiffOnly,
            RuleContextLevel::Function => FinalContextLevel::Function,
            RuleContextLevel::FileContext => FinalContextLevel::FileContext,
        }
    }
}

/// Extra-context request attached to a plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Symbol to search callers of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Free-text search needle.
    #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl ExtraRequest {
    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            details: None,
            symbol: None,
            keyword: None,
        }
    }
}

/// One planner proposal for a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanItem {
    pub unit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_context_level: Option<FinalContextLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_requests: Vec<ExtraRequest>,
    #[serde(default)]
    pub skip_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Validated planner output. `error` is set when the model output was
/// unusable (timeout, invalid JSON) and the plan is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextPlan {
    #[serde(default)]
    pub plan: Vec<PlanItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fused decision for one unit.
#[derive(Debug, Clone, Serialize)]
pub struct FusedPlanItem {
    pub unit_id: String,
    pub final_context_level: FinalContextLevel,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_requests: Vec<ExtraRequest>,
    pub skip_review: bool,
    pub reason: String,
}

/// Output of fusion: one decision per unit, stable unit order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FusedPlan {
    pub plan: Vec<FusedPlanItem>,
}

/// Caller/search hit enriched with a code snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerHit {
    pub file_path: String,
    pub snippet: String,
}

/// Unit metadata carried alongside the bundle payload.
#[derive(Debug, Clone, Serialize)]
pub struct BundleMeta {
    pub file_path: String,
    pub tags: Vec<String>,
    pub hunk_range: HunkRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_numbers: Option<LineNumbers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// The per-unit payload handed to the reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundleEntry {
    pub unit_id: String,
    pub meta: BundleMeta,
    pub final_context_level: FinalContextLevel,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_requests: Vec<ExtraRequest>,
    pub diff: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callers: Vec<CallerHit>,
}
