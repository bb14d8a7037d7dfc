//! Input/output contracts of the rule layer.
//!
//! The rule layer is a pure function over a minimal projection of a review
//! unit. It never performs I/O and never reads the clock, so the same unit
//! always yields a byte-identical suggestion.

use serde::{Deserialize, Serialize};

/// Context depth suggested by a rule.
///
/// There is deliberately no `Unknown` variant: the rule layer always commits
/// to a level, falling back to [`RuleContextLevel::Function`] when nothing
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleContextLevel {
    DiffOnly,
    Function,
    FileContext,
}

impl RuleContextLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleContextLevel::DiffOnly => "diff_only",
            RuleContextLevel::Function => "function",
            RuleContextLevel::FileContext => "file_context",
        }
    }
}

/// Kind of change carried by the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

/// Line-level metrics of the unit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RuleMetrics {
    pub added_lines: u32,
    pub removed_lines: u32,
    pub hunk_count: u32,
}

impl RuleMetrics {
    pub fn total_changed(&self) -> u32 {
        self.added_lines + self.removed_lines
    }
}

/// Optional symbol-level information attached by the diff collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSymbol {
    pub kind: String,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// Minimal unit projection consumed by the rules.
#[derive(Debug, Clone)]
pub struct RuleUnit {
    pub file_path: String,
    /// Lowercase language key (`python`, `go`, ...); aliases are resolved by
    /// the registry.
    pub language: String,
    pub change_type: ChangeKind,
    pub metrics: RuleMetrics,
    pub tags: Vec<String>,
    pub symbol: Option<RuleSymbol>,
    /// Raw diff text of the unit, scanned by code-pattern rules.
    pub diff_content: Option<String>,
}

impl RuleUnit {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Follow-up context request proposed by a rule (e.g. a config change asks
/// for a usage search).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRequestSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ExtraRequestSpec {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            details: None,
        }
    }
}

/// Output contract of the rule layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSuggestion {
    pub context_level: RuleContextLevel,
    pub confidence: f64,
    /// `<lang>:<rule-id>` for matched rules, `default_fallback` otherwise.
    pub notes: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_requests: Vec<ExtraRequestSpec>,
}

impl RuleSuggestion {
    pub fn new(context_level: RuleContextLevel, confidence: f64, notes: impl Into<String>) -> Self {
        Self {
            context_level,
            confidence,
            notes: notes.into(),
            extra_requests: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: ExtraRequestSpec) -> Self {
        self.extra_requests.push(extra);
        self
    }
}

/// Review focus dimension carried by the fallback decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusKind {
    Logic,
    Security,
    Performance,
    Style,
}

/// Priority attached to the fallback decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Deterministic decision derived from a suggestion; used when the planner
/// is disabled or fails and the scheduler still needs window hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub context_level: RuleContextLevel,
    pub before_lines: u32,
    pub after_lines: u32,
    pub focus: Vec<FocusKind>,
    pub priority: Priority,
    pub reason: String,
}
