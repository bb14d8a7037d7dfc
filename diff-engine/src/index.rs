//! Derived per-session projections of the review units.
//!
//! - [`build_review_index`] — full metadata document (`units[]` + `files[]`).
//! - [`build_planner_index`] — the lighter feed for the planner: no
//!   `files[]` rows, compact line numbers only, no diff bodies.
//! - [`build_markdown_context`] — human-readable overview embedded in the
//!   reviewer prompt, with changes scored and pruned.

use serde::Serialize;

use rule_engine::{AgentDecision, Priority, RuleContextLevel};

use crate::git::DiffMode;
use crate::language::Language;
use crate::units::{HunkRange, LineNumbers, ReviewUnit, SymbolInfo, UnitMetrics};

#[derive(Debug, Clone, Serialize)]
pub struct ReviewMetadata {
    pub mode: String,
    pub base_branch: Option<String>,
    pub total_files: usize,
    pub total_changes: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChangesByType {
    pub add: usize,
    pub modify: usize,
    pub delete: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TotalLines {
    pub added: u32,
    pub removed: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub changes_by_type: ChangesByType,
    pub total_lines: TotalLines,
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactLineNumbers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_compact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_compact: Option<String>,
}

impl CompactLineNumbers {
    fn from_full(numbers: &LineNumbers) -> Self {
        Self {
            new_compact: some_nonempty(&numbers.new_compact),
            old_compact: some_nonempty(&numbers.old_compact),
        }
    }
}

fn some_nonempty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Per-unit row of the full review index.
#[derive(Debug, Clone, Serialize)]
pub struct UnitIndexEntry {
    pub unit_id: String,
    pub file_path: String,
    pub language: Language,
    pub patch_type: String,
    pub tags: Vec<String>,
    pub metrics: UnitMetrics,
    pub rule_context_level: Option<RuleContextLevel>,
    pub rule_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_notes: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_extra_requests: Vec<rule_engine::ExtraRequestSpec>,
    pub line_numbers: LineNumbers,
}

/// Decision summary kept in file change rows.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionSummary {
    pub context_level: RuleContextLevel,
    pub priority: Priority,
}

impl DecisionSummary {
    fn from_decision(decision: &AgentDecision) -> Self {
        Self {
            context_level: decision.context_level,
            priority: decision.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeEntry {
    pub unit_id: String,
    pub rule_context_level: Option<RuleContextLevel>,
    pub rule_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_decision: Option<DecisionSummary>,
    pub hunk_range: HunkRange,
    pub line_numbers: LineNumbers,
    pub metrics: UnitMetrics,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_extra_requests: Vec<rule_engine::ExtraRequestSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileMetrics {
    pub added_lines: u32,
    pub removed_lines: u32,
    pub changes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub language: Language,
    pub change_type: String,
    pub metrics: FileMetrics,
    pub tags: Vec<String>,
    pub changes: Vec<ChangeEntry>,
}

/// Full review index: metadata, summary, per-unit and per-file rows.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewIndex {
    pub review_metadata: ReviewMetadata,
    pub summary: IndexSummary,
    pub units: Vec<UnitIndexEntry>,
    pub files: Vec<FileEntry>,
}

/// Planner-facing unit row: compact positions, no bodies.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerUnitEntry {
    pub unit_id: String,
    pub file_path: String,
    pub patch_type: String,
    pub tags: Vec<String>,
    pub metrics: UnitMetrics,
    pub rule_context_level: Option<RuleContextLevel>,
    pub rule_confidence: Option<f64>,
    pub line_numbers: CompactLineNumbers,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_extra_requests: Vec<rule_engine::ExtraRequestSpec>,
}

/// Lightweight projection consumed by the planner.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerIndex {
    pub review_metadata: ReviewMetadata,
    pub summary: IndexSummary,
    pub units: Vec<PlannerUnitEntry>,
}

fn build_metadata(units: &[ReviewUnit], mode: DiffMode, base: Option<&str>) -> ReviewMetadata {
    let mut files: Vec<&str> = units.iter().map(|u| u.file_path.as_str()).collect();
    files.sort_unstable();
    files.dedup();
    ReviewMetadata {
        mode: mode.as_str().to_string(),
        base_branch: base.map(str::to_string),
        total_files: files.len(),
        total_changes: units.len(),
        timestamp: chrono::Local::now().to_rfc3339(),
    }
}

fn build_summary(units: &[ReviewUnit]) -> IndexSummary {
    let mut files_changed: Vec<String> = units.iter().map(|u| u.file_path.clone()).collect();
    files_changed.sort_unstable();
    files_changed.dedup();

    let mut changes_by_type = ChangesByType::default();
    for path in &files_changed {
        let kind = units
            .iter()
            .find(|u| &u.file_path == path)
            .map(|u| u.change_type.as_str())
            .unwrap_or("modify");
        match kind {
            "add" => changes_by_type.add += 1,
            _ => changes_by_type.modify += 1,
        }
    }

    IndexSummary {
        changes_by_type,
        total_lines: TotalLines {
            added: units.iter().map(|u| u.metrics.added_lines).sum(),
            removed: units.iter().map(|u| u.metrics.removed_lines).sum(),
        },
        files_changed,
    }
}

/// Build the full review index over all units.
pub fn build_review_index(units: &[ReviewUnit], mode: DiffMode, base: Option<&str>) -> ReviewIndex {
    let mut files: Vec<FileEntry> = Vec::new();
    let mut paths: Vec<&str> = units.iter().map(|u| u.file_path.as_str()).collect();
    paths.sort_unstable();
    paths.dedup();

    for path in paths {
        let file_units: Vec<&ReviewUnit> =
            units.iter().filter(|u| u.file_path == path).collect();
        let mut file_tags: Vec<String> = file_units
            .iter()
            .flat_map(|u| u.tags.iter().cloned())
            .collect();
        file_tags.sort_unstable();
        file_tags.dedup();

        let changes: Vec<ChangeEntry> = file_units
            .iter()
            .map(|u| ChangeEntry {
                unit_id: u.unit_id.clone(),
                rule_context_level: u.rule_context_level,
                rule_confidence: u.rule_confidence,
                agent_decision: u.agent_decision.as_ref().map(DecisionSummary::from_decision),
                hunk_range: u.hunk_range,
                line_numbers: u.line_numbers.clone(),
                metrics: u.metrics,
                tags: u.tags.clone(),
                context_mode: u.context_mode.clone(),
                symbol: u.symbol.clone(),
                rule_extra_requests: u.rule_extra_requests.clone(),
            })
            .collect();

        files.push(FileEntry {
            path: path.to_string(),
            language: file_units[0].language,
            change_type: file_units[0].change_type.as_str().to_string(),
            metrics: FileMetrics {
                added_lines: file_units.iter().map(|u| u.metrics.added_lines).sum(),
                removed_lines: file_units.iter().map(|u| u.metrics.removed_lines).sum(),
                changes: changes.len(),
            },
            tags: file_tags,
            changes,
        });
    }

    let unit_rows = units
        .iter()
        .map(|u| UnitIndexEntry {
            unit_id: u.unit_id.clone(),
            file_path: u.file_path.clone(),
            language: u.language,
            patch_type: u.change_type.as_str().to_string(),
            tags: u.tags.clone(),
            metrics: u.metrics,
            rule_context_level: u.rule_context_level,
            rule_confidence: u.rule_confidence,
            rule_notes: u.rule_notes.clone(),
            rule_extra_requests: u.rule_extra_requests.clone(),
            line_numbers: u.line_numbers.clone(),
        })
        .collect();

    ReviewIndex {
        review_metadata: build_metadata(units, mode, base),
        summary: build_summary(units),
        units: unit_rows,
        files,
    }
}

/// Build the planner-facing index (no `files[]` detail, compact positions).
pub fn build_planner_index(
    units: &[ReviewUnit],
    mode: DiffMode,
    base: Option<&str>,
) -> PlannerIndex {
    PlannerIndex {
        review_metadata: build_metadata(units, mode, base),
        summary: build_summary(units),
        units: units
            .iter()
            .map(|u| PlannerUnitEntry {
                unit_id: u.unit_id.clone(),
                file_path: u.file_path.clone(),
                patch_type: u.change_type.as_str().to_string(),
                tags: u.tags.clone(),
                metrics: u.metrics,
                rule_context_level: u.rule_context_level,
                rule_confidence: u.rule_confidence,
                line_numbers: CompactLineNumbers::from_full(&u.line_numbers),
                rule_extra_requests: u.rule_extra_requests.clone(),
            })
            .collect(),
    }
}

const MARKDOWN_MAX_FILES: usize = 5;
const MARKDOWN_MAX_CHANGES_PER_FILE: usize = 3;

/// Score one unit for the markdown overview ordering.
fn score_unit(unit: &ReviewUnit) -> f64 {
    let size = (unit.metrics.added_lines + unit.metrics.removed_lines) as f64;
    let mut score = size;
    if unit.has_tag("security_sensitive") {
        score += 40.0;
    }
    if unit.has_tag("config_file") || unit.has_tag("routing_file") {
        score += 25.0;
    }
    if unit.tags.iter().any(|t| t.starts_with("complete_")) {
        score += 20.0;
    }
    if unit.has_tag("merged_block") {
        score += 10.0;
    }
    match unit.agent_decision.as_ref().map(|d| d.priority) {
        Some(Priority::High) => score += 15.0,
        Some(Priority::Medium) => score += 5.0,
        _ => {}
    }
    if unit.has_tag("only_imports") {
        score *= 0.2;
    }
    if unit.has_tag("only_comments") {
        score *= 0.1;
    }
    if unit.has_tag("only_logging") {
        score *= 0.3;
    }
    score
}

fn unit_location(unit: &ReviewUnit) -> String {
    if !unit.line_numbers.new_compact.is_empty() {
        unit.line_numbers.new_compact.clone()
    } else if !unit.line_numbers.old_compact.is_empty() {
        format!("(removed) {}", unit.line_numbers.old_compact)
    } else {
        format!(
            "L{} (+{})",
            unit.hunk_range.new_start, unit.hunk_range.new_lines
        )
    }
}

/// Human-readable review-index overview for the reviewer prompt.
///
/// Lists only metadata (locations, sizes, tags, rule decisions); the model
/// fetches code through tools when it needs more.
pub fn build_markdown_context(index: &ReviewIndex, units: &[ReviewUnit]) -> String {
    let meta = &index.review_metadata;
    let summary = &index.summary;

    // Order files by their best-scoring unit, units by score within a file.
    let mut by_file: Vec<(String, Vec<&ReviewUnit>)> = Vec::new();
    for unit in units {
        match by_file.iter_mut().find(|(p, _)| *p == unit.file_path) {
            Some((_, bucket)) => bucket.push(unit),
            None => by_file.push((unit.file_path.clone(), vec![unit])),
        }
    }
    for (_, bucket) in by_file.iter_mut() {
        bucket.sort_by(|a, b| {
            score_unit(b)
                .partial_cmp(&score_unit(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    by_file.sort_by(|a, b| {
        let a_top = a.1.first().map(|u| score_unit(u)).unwrap_or(0.0);
        let b_top = b.1.first().map(|u| score_unit(u)).unwrap_or(0.0);
        b_top.partial_cmp(&a_top).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut lines: Vec<String> = Vec::new();
    lines.push("# Review index (lightweight)".to_string());
    lines.push(String::new());
    lines.push("## Change summary".to_string());
    lines.push(String::new());
    lines.push(format!("- Diff mode: `{}`", meta.mode));
    lines.push(format!(
        "- Base branch: `{}`",
        meta.base_branch.as_deref().unwrap_or("(none)")
    ));
    lines.push(format!("- Files changed: {}", meta.total_files));
    lines.push(format!("- Review units: {}", meta.total_changes));
    lines.push(format!(
        "- Lines: `+{} / -{}`",
        summary.total_lines.added, summary.total_lines.removed
    ));
    lines.push(
        "- This index carries positions/sizes/tags/rule decisions only; fetch code via tools."
            .to_string(),
    );
    lines.push(String::new());
    lines.push("### Files".to_string());
    lines.push(String::new());
    for path in summary.files_changed.iter().take(MARKDOWN_MAX_FILES) {
        lines.push(format!("- `{path}`"));
    }
    if summary.files_changed.len() > MARKDOWN_MAX_FILES {
        lines.push(format!(
            "- ... {} files total (first {} listed)",
            summary.files_changed.len(),
            MARKDOWN_MAX_FILES
        ));
    }
    lines.push(String::new());
    lines.push("## Key changes (ordered by rule score)".to_string());
    lines.push(String::new());

    for (path, bucket) in by_file.iter().take(MARKDOWN_MAX_FILES) {
        let language = bucket[0].language.as_str();
        lines.push(format!("### File: `{path}` ({language})"));
        lines.push(String::new());
        for (idx, unit) in bucket.iter().take(MARKDOWN_MAX_CHANGES_PER_FILE).enumerate() {
            let decision = unit.agent_decision.as_ref();
            let level = decision
                .map(|d| d.context_level.as_str())
                .unwrap_or("function");
            let priority = decision
                .map(|d| match d.priority {
                    Priority::Low => "low",
                    Priority::Medium => "medium",
                    Priority::High => "high",
                })
                .unwrap_or("medium");
            let tags = if unit.tags.is_empty() {
                "none".to_string()
            } else {
                unit.tags.join(", ")
            };
            lines.push(format!(
                "- Change {}: at {}, size `+{} / -{}`, tags: {}, rule: {}/{}",
                idx + 1,
                unit_location(unit),
                unit.metrics.added_lines,
                unit.metrics.removed_lines,
                tags,
                level,
                priority,
            ));
        }
        if bucket.len() > MARKDOWN_MAX_CHANGES_PER_FILE {
            lines.push(format!(
                "- ... {} more change(s) in this file omitted",
                bucket.len() - MARKDOWN_MAX_CHANGES_PER_FILE
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;
    use crate::units::build_review_units;
    use std::path::Path;

    fn units() -> Vec<ReviewUnit> {
        let diff = "diff --git a/config/auth/oauth.py b/config/auth/oauth.py\n\
--- a/config/auth/oauth.py\n+++ b/config/auth/oauth.py\n\
@@ -5,4 +5,4 @@\n ctx\n-client = old\n+client = new\n-secret = a\n+secret = b\n\
diff --git a/notes.md b/notes.md\n--- a/notes.md\n+++ b/notes.md\n@@ -1,1 +1,1 @@\n-x\n+y";
        let files = parse_unified_diff(diff);
        build_review_units(&files, Path::new("/nonexistent"), true, true)
    }

    #[test]
    fn planner_index_omits_bodies_and_files() {
        let units = units();
        let index = build_planner_index(&units, DiffMode::Working, None);
        assert_eq!(index.units.len(), 2);
        let json = serde_json::to_string(&index).unwrap();
        assert!(!json.contains("unified_diff"));
        assert!(!json.contains("\"files\":["));
    }

    #[test]
    fn review_index_groups_changes_by_file() {
        let units = units();
        let index = build_review_index(&units, DiffMode::Staged, Some("main"));
        assert_eq!(index.files.len(), 2);
        assert_eq!(index.review_metadata.total_files, 2);
        assert_eq!(index.review_metadata.base_branch.as_deref(), Some("main"));
        let config_entry = index
            .files
            .iter()
            .find(|f| f.path == "config/auth/oauth.py")
            .unwrap();
        assert_eq!(config_entry.metrics.changes, 1);
        assert!(config_entry.tags.contains(&"security_sensitive".to_string()));
    }

    #[test]
    fn markdown_ranks_security_change_first() {
        let units = units();
        let index = build_review_index(&units, DiffMode::Working, None);
        let markdown = build_markdown_context(&index, &units);
        let security_pos = markdown.find("config/auth/oauth.py").unwrap();
        let doc_pos = markdown.find("notes.md").unwrap();
        assert!(security_pos < doc_pos);
        assert!(markdown.contains("## Key changes"));
    }
}
