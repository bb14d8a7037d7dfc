//! ReviewUnit construction: one unit per hunk, merged when hunks cluster.

use std::path::Path;

use serde::Serialize;
use serde_json::json;

use rule_engine::{
    AgentDecision, ChangeKind, RuleContextLevel, RuleMetrics, RuleSuggestion, RuleSymbol, RuleUnit,
    build_decision_from_rules, build_rule_suggestion,
};
use services::{new_unit_id, read_file_lines, record_fallback};

use crate::analysis::{
    infer_file_level_tags, infer_simple_change_tags, infer_symbol_and_scope, smart_expand_context,
};
use crate::ast;
use crate::language::{Language, guess_language};
use crate::parser::PatchedFile;
use crate::snippets::{
    before_after, collect_line_numbers, compact_line_spans, extract_context, truncate_doc_block,
    unified_diff_view, unified_diff_view_with_lines,
};

/// Hunks closer than this (in lines) merge into one super-unit.
pub const MERGE_MAX_GAP: u32 = 20;

const DOC_DIFF_MAX_LINES: usize = 60;
const DOC_SNIPPET_MAX_LINES: usize = 40;
const DOC_CONTEXT_MAX_LINES: usize = 50;
const CONTEXT_PAD_LINES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HunkRange {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LineNumbers {
    pub new: Vec<u32>,
    pub old: Vec<u32>,
    pub new_compact: String,
    pub old_compact: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeSnippets {
    pub before: String,
    pub after: String,
    pub context: String,
    pub context_start: u32,
    pub context_end: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolInfo {
    pub kind: String,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UnitMetrics {
    pub added_lines: u32,
    pub removed_lines: u32,
    pub hunk_count: u32,
    pub in_single_function: bool,
}

/// The atom of review: one contiguous hunk plus derived metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewUnit {
    pub unit_id: String,
    pub file_path: String,
    pub language: Language,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_mode: Option<String>,
    pub unified_diff: String,
    pub unified_diff_with_lines: String,
    pub hunk_range: HunkRange,
    pub code_snippets: CodeSnippets,
    pub line_numbers: LineNumbers,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolInfo>,
    pub metrics: UnitMetrics,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_merged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_count: Option<u32>,
    // Rule-layer additions, populated by `apply_rules_to_units`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_context_level: Option<RuleContextLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_notes: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_extra_requests: Vec<rule_engine::ExtraRequestSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_decision: Option<AgentDecision>,
}

impl ReviewUnit {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Build review units for every file of a parsed diff.
///
/// Pure deletions are skipped entirely; binary files are skipped with a
/// fallback record; a malformed hunk produces no unit but never aborts the
/// file. Units come out sorted by `(file_path, new_start)`.
pub fn build_review_units(
    files: &[PatchedFile],
    cwd: &Path,
    use_smart_context: bool,
    apply_rules: bool,
) -> Vec<ReviewUnit> {
    let mut units = Vec::new();

    for file in files {
        if file.is_removed {
            continue;
        }
        if file.is_binary {
            record_fallback(
                "binary_file_skipped",
                "binary patch skipped",
                Some(json!({ "path": file.path() })),
            );
            continue;
        }
        let file_path = file.path().to_string();
        if file_path.is_empty() {
            continue;
        }

        let language = guess_language(&file_path);
        let change_type = if file.is_added {
            ChangeType::Add
        } else {
            ChangeType::Modify
        };
        let full_lines = read_file_lines(&cwd.join(&file_path));
        let source = full_lines.join("\n");
        let tree = if use_smart_context && !full_lines.is_empty() {
            ast::parse_source(language, &source)
        } else {
            None
        };
        let base_tags = infer_file_level_tags(&file_path);

        let mut file_units = Vec::new();
        for hunk in &file.hunks {
            if hunk.lines.is_empty() {
                continue;
            }
            // At least one side of the hunk must be non-empty.
            if hunk.new_lines == 0 && hunk.old_lines == 0 {
                continue;
            }

            let (mut before, mut after) = before_after(hunk);
            let mut unified = unified_diff_view(hunk);
            let unified_with_lines = unified_diff_view_with_lines(hunk);
            let (new_nums, old_nums) = collect_line_numbers(hunk);
            let line_numbers = LineNumbers {
                new_compact: compact_line_spans(&new_nums),
                old_compact: compact_line_spans(&old_nums),
                new: new_nums,
                old: old_nums,
            };

            let new_start = hunk.new_start.max(1);
            let new_end = if hunk.new_lines > 0 {
                new_start + hunk.new_lines - 1
            } else {
                new_start
            };

            let mut tags: Vec<String> = base_tags.clone();
            let (symbol, scope_tags) =
                infer_symbol_and_scope(language, tree.as_ref(), &source, new_start, new_end);
            tags.extend(scope_tags);

            let (mut context, ctx_start, ctx_end) = if tree.is_some() {
                let (start, end, smart_tags) = smart_expand_context(
                    &full_lines,
                    hunk,
                    new_start,
                    new_end,
                    tree.as_ref(),
                    &source,
                );
                tags.extend(smart_tags);
                let lo = (start.saturating_sub(1) as usize).min(full_lines.len());
                let hi = (end as usize).min(full_lines.len()).max(lo);
                (full_lines[lo..hi].join("\n"), start, end)
            } else {
                extract_context(&full_lines, new_start, new_end, CONTEXT_PAD_LINES, CONTEXT_PAD_LINES)
            };

            tags.extend(infer_simple_change_tags(hunk, language));

            let mut context_mode = None;
            if language.is_doc() {
                unified = truncate_doc_block(&unified, DOC_DIFF_MAX_LINES);
                before = truncate_doc_block(&before, DOC_SNIPPET_MAX_LINES);
                after = truncate_doc_block(&after, DOC_SNIPPET_MAX_LINES);
                context = truncate_doc_block(&context, DOC_CONTEXT_MAX_LINES);
                tags.push("doc_file".to_string());
                context_mode = Some("doc_light".to_string());
            }

            dedup_preserving_order(&mut tags);
            let in_single_function = tags.iter().any(|t| t == "in_single_function");

            file_units.push(ReviewUnit {
                unit_id: new_unit_id(),
                file_path: file_path.clone(),
                language,
                change_type,
                context_mode,
                unified_diff: unified,
                unified_diff_with_lines: unified_with_lines,
                hunk_range: HunkRange {
                    old_start: hunk.old_start,
                    old_lines: hunk.old_lines,
                    new_start: hunk.new_start,
                    new_lines: hunk.new_lines,
                },
                code_snippets: CodeSnippets {
                    before,
                    after,
                    context,
                    context_start: ctx_start,
                    context_end: ctx_end,
                },
                line_numbers,
                tags,
                symbol,
                metrics: UnitMetrics {
                    added_lines: hunk.added_count(),
                    removed_lines: hunk.removed_count(),
                    hunk_count: 1,
                    in_single_function,
                },
                is_merged: false,
                merged_count: None,
                rule_context_level: None,
                rule_confidence: None,
                rule_notes: None,
                rule_extra_requests: Vec::new(),
                agent_decision: None,
            });
        }

        units.extend(merge_nearby_hunks(file_units, &full_lines, MERGE_MAX_GAP));
    }

    units.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.hunk_range.new_start.cmp(&b.hunk_range.new_start))
    });

    if apply_rules {
        apply_rules_to_units(&mut units);
    }
    units
}

fn dedup_preserving_order(tags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| seen.insert(t.clone()));
}

/// Merge consecutive units of one file whose gap is at most `max_gap`.
pub fn merge_nearby_hunks(
    units: Vec<ReviewUnit>,
    file_lines: &[String],
    max_gap: u32,
) -> Vec<ReviewUnit> {
    if units.len() <= 1 {
        return units;
    }
    let mut sorted = units;
    sorted.sort_by_key(|u| u.hunk_range.new_start);

    let mut merged = Vec::new();
    let mut group: Vec<ReviewUnit> = Vec::new();
    for unit in sorted {
        if let Some(prev) = group.last() {
            let prev_end = prev.hunk_range.new_start + prev.hunk_range.new_lines;
            let gap_ok = unit.hunk_range.new_start.saturating_sub(prev_end) <= max_gap;
            if gap_ok {
                group.push(unit);
                continue;
            }
            merged.push(collapse_group(std::mem::take(&mut group), file_lines));
        }
        group.push(unit);
    }
    if !group.is_empty() {
        merged.push(collapse_group(group, file_lines));
    }
    merged
}

fn collapse_group(mut group: Vec<ReviewUnit>, file_lines: &[String]) -> ReviewUnit {
    if group.len() == 1 {
        return group.remove(0);
    }

    let merged_diff = group
        .iter()
        .map(|u| u.unified_diff.as_str())
        .collect::<Vec<_>>()
        .join("\n...\n");
    let merged_diff_with_lines = group
        .iter()
        .map(|u| u.unified_diff_with_lines.as_str())
        .collect::<Vec<_>>()
        .join("\n...\n");

    let range_end = |range: &HunkRange, new_side: bool| -> u32 {
        let (start, len) = if new_side {
            (range.new_start, range.new_lines)
        } else {
            (range.old_start, range.old_lines)
        };
        if start == 0 { 0 } else { start + len.saturating_sub(1) }
    };

    let new_start = group
        .iter()
        .map(|u| u.hunk_range.new_start)
        .filter(|&s| s > 0)
        .min()
        .unwrap_or(1);
    let new_end = group
        .iter()
        .map(|u| range_end(&u.hunk_range, true))
        .max()
        .unwrap_or(new_start);
    let old_start = group
        .iter()
        .map(|u| u.hunk_range.old_start)
        .filter(|&s| s > 0)
        .min()
        .unwrap_or(group[0].hunk_range.old_start);
    let old_end = group
        .iter()
        .map(|u| range_end(&u.hunk_range, false))
        .max()
        .unwrap_or(old_start);

    // Re-read the surrounding context so it covers the merged span.
    let (context, ctx_start, ctx_end) = if file_lines.is_empty() {
        let joined = group
            .iter()
            .map(|u| u.code_snippets.context.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n...\n");
        (
            joined,
            group[0].code_snippets.context_start,
            group.last().map(|u| u.code_snippets.context_end).unwrap_or(0),
        )
    } else {
        extract_context(file_lines, new_start, new_end, CONTEXT_PAD_LINES, CONTEXT_PAD_LINES)
    };

    let mut tags = Vec::new();
    for unit in &group {
        tags.extend(unit.tags.iter().cloned());
    }
    tags.push("merged_block".to_string());
    dedup_preserving_order(&mut tags);

    let mut new_nums = Vec::new();
    let mut old_nums = Vec::new();
    for unit in &group {
        new_nums.extend(unit.line_numbers.new.iter().copied());
        old_nums.extend(unit.line_numbers.old.iter().copied());
    }
    new_nums.sort_unstable();
    new_nums.dedup();
    old_nums.sort_unstable();
    old_nums.dedup();

    let before = join_snippets(&group, |u| &u.code_snippets.before);
    let after = join_snippets(&group, |u| &u.code_snippets.after);
    let added: u32 = group.iter().map(|u| u.metrics.added_lines).sum();
    let removed: u32 = group.iter().map(|u| u.metrics.removed_lines).sum();
    let in_single_function = tags.iter().any(|t| t == "in_single_function");

    let first = &group[0];
    ReviewUnit {
        unit_id: first.unit_id.clone(),
        file_path: first.file_path.clone(),
        language: first.language,
        change_type: first.change_type,
        context_mode: first.context_mode.clone(),
        unified_diff: merged_diff,
        unified_diff_with_lines: merged_diff_with_lines,
        hunk_range: HunkRange {
            old_start,
            old_lines: (old_end.saturating_sub(old_start) + 1).max(first.hunk_range.old_lines),
            new_start,
            new_lines: (new_end.saturating_sub(new_start) + 1).max(first.hunk_range.new_lines),
        },
        code_snippets: CodeSnippets {
            before,
            after,
            context,
            context_start: ctx_start,
            context_end: ctx_end,
        },
        line_numbers: LineNumbers {
            new_compact: compact_line_spans(&new_nums),
            old_compact: compact_line_spans(&old_nums),
            new: new_nums,
            old: old_nums,
        },
        tags,
        symbol: first.symbol.clone(),
        metrics: UnitMetrics {
            added_lines: added,
            removed_lines: removed,
            hunk_count: group.len() as u32,
            in_single_function,
        },
        is_merged: true,
        merged_count: Some(group.len() as u32),
        rule_context_level: None,
        rule_confidence: None,
        rule_notes: None,
        rule_extra_requests: Vec::new(),
        agent_decision: None,
    }
}

fn join_snippets<'a>(group: &'a [ReviewUnit], pick: impl Fn(&'a ReviewUnit) -> &'a String) -> String {
    group
        .iter()
        .map(|u| pick(u).as_str())
        .collect::<Vec<_>>()
        .join("\n...\n")
}

/// Attach rule suggestions and fallback decisions to every unit.
pub fn apply_rules_to_units(units: &mut [ReviewUnit]) {
    for unit in units.iter_mut() {
        let rule_unit = RuleUnit {
            file_path: unit.file_path.clone(),
            language: unit.language.as_str().to_string(),
            change_type: match unit.change_type {
                ChangeType::Add => ChangeKind::Add,
                ChangeType::Modify => ChangeKind::Modify,
            },
            metrics: RuleMetrics {
                added_lines: unit.metrics.added_lines,
                removed_lines: unit.metrics.removed_lines,
                hunk_count: unit.metrics.hunk_count,
            },
            tags: unit.tags.clone(),
            symbol: unit.symbol.as_ref().map(|s| RuleSymbol {
                kind: s.kind.clone(),
                name: s.name.clone(),
                start_line: s.start_line,
                end_line: s.end_line,
            }),
            diff_content: Some(unit.unified_diff.clone()),
        };

        let suggestion: RuleSuggestion = build_rule_suggestion(&rule_unit);
        unit.rule_context_level = Some(suggestion.context_level);
        unit.rule_confidence = Some((suggestion.confidence * 100.0).round() / 100.0);
        unit.rule_notes = Some(suggestion.notes.clone());
        unit.rule_extra_requests = suggestion.extra_requests.clone();
        unit.agent_decision = Some(build_decision_from_rules(&rule_unit, &suggestion));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;
    use crate::snippets::expand_line_spans;

    fn build(diff: &str) -> Vec<ReviewUnit> {
        let files = parse_unified_diff(diff);
        // Nonexistent cwd: context falls back to empty, which the builder
        // must tolerate.
        build_review_units(&files, Path::new("/nonexistent"), true, true)
    }

    const COMMENT_DIFF: &str = "diff --git a/foo.py b/foo.py\n--- a/foo.py\n+++ b/foo.py\n@@ -10,3 +10,3 @@\n ctx\n-# old\n+# new\n ctx";

    #[test]
    fn comment_change_produces_tagged_unit() {
        let units = build(COMMENT_DIFF);
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert!(unit.has_tag("only_comments"));
        assert_eq!(unit.rule_context_level, Some(RuleContextLevel::DiffOnly));
        assert!(unit.rule_confidence.unwrap() >= 0.88);
        assert_eq!(unit.line_numbers.new_compact, "L11");
    }

    #[test]
    fn line_numbers_close_over_numbered_diff() {
        let units = build(COMMENT_DIFF);
        let unit = &units[0];
        for n in &unit.line_numbers.new {
            assert!(unit.unified_diff_with_lines.contains(&format!("+{n}: ")));
        }
        for n in &unit.line_numbers.old {
            assert!(unit.unified_diff_with_lines.contains(&format!("-{n}: ")));
        }
        assert_eq!(expand_line_spans(&unit.line_numbers.new_compact), unit.line_numbers.new);
    }

    #[test]
    fn pure_deletions_are_skipped() {
        let diff = "diff --git a/gone.py b/gone.py\ndeleted file mode 100644\n--- a/gone.py\n+++ /dev/null\n@@ -1,2 +0,0 @@\n-a\n-b";
        assert!(build(diff).is_empty());
    }

    #[test]
    fn nearby_hunks_merge_into_super_unit() {
        let diff = "diff --git a/m.py b/m.py\n--- a/m.py\n+++ b/m.py\n\
@@ -1,2 +1,2 @@\n-a\n+A\n b\n\
@@ -10,2 +10,2 @@\n-c\n+C\n d\n\
@@ -100,2 +100,2 @@\n-e\n+E\n f";
        let units = build(diff);
        // First two hunks are 8 lines apart and merge; the third stays.
        assert_eq!(units.len(), 2);
        let merged = &units[0];
        assert!(merged.is_merged);
        assert!(merged.has_tag("merged_block"));
        assert_eq!(merged.metrics.hunk_count, 2);
        assert!(merged.unified_diff.contains("\n...\n"));
        assert_eq!(merged.merged_count, Some(2));
        assert!(!units[1].is_merged);
    }

    #[test]
    fn tags_are_stable_across_runs() {
        let first: Vec<Vec<String>> = build(COMMENT_DIFF).into_iter().map(|u| u.tags).collect();
        let second: Vec<Vec<String>> = build(COMMENT_DIFF).into_iter().map(|u| u.tags).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn units_sorted_by_path_then_start() {
        let diff = "diff --git a/z.py b/z.py\n--- a/z.py\n+++ b/z.py\n@@ -1,1 +1,1 @@\n-a\n+b\n\
diff --git a/a.py b/a.py\n--- a/a.py\n+++ b/a.py\n@@ -5,1 +5,1 @@\n-c\n+d";
        let units = build(diff);
        assert_eq!(units[0].file_path, "a.py");
        assert_eq!(units[1].file_path, "z.py");
    }

    #[test]
    fn every_unit_gets_a_rule_decision() {
        let units = build(COMMENT_DIFF);
        for unit in units {
            assert!(unit.rule_context_level.is_some());
            assert!(unit.agent_decision.is_some());
            let confidence = unit.rule_confidence.unwrap();
            assert!((0.0..=1.0).contains(&confidence));
        }
    }
}
