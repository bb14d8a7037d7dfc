//! Context scheduler: execute the fused plan against the working tree.
//!
//! For every non-skipped plan item the scheduler assembles a
//! [`ContextBundleEntry`]: the diff (always), AST- or window-sliced
//! function context, file/full-file slices, the previous version via
//! `git show`, and caller/search hits via ripgrep. Every text field is
//! bounded by `max_chars_per_field`; file reads are cached per session.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use serde_json::json;
use tracing::debug;

use diff_engine::{DiffContext, Language, ReviewUnit, ast, git};
use services::{read_file_lines, record_fallback};

use crate::config::ContextConfig;
use crate::types::{
    BundleMeta, CallerHit, ContextBundleEntry, ExtraRequest, FinalContextLevel, FusedPlan,
};

const TRUNCATION_MARKER: &str = "...TRUNCATED...";

/// Build the context bundle for the fused plan, preserving plan order.
pub async fn build_context_bundle(
    diff_ctx: &DiffContext,
    fused: &FusedPlan,
    config: &ContextConfig,
) -> Vec<ContextBundleEntry> {
    let unit_lookup: HashMap<&str, &ReviewUnit> = diff_ctx
        .units
        .iter()
        .map(|u| (u.unit_id.as_str(), u))
        .collect();

    let mut file_cache: HashMap<String, Vec<String>> = HashMap::new();
    let mut prev_cache: HashMap<(String, String), Vec<String>> = HashMap::new();
    let mut bundle = Vec::new();

    for item in &fused.plan {
        if item.skip_review {
            continue;
        }
        let Some(unit) = unit_lookup.get(item.unit_id.as_str()) else {
            continue;
        };

        let (new_start, new_end) = span(unit, true);
        let (mut old_start, mut old_end) = span(unit, false);
        if old_end < old_start {
            record_fallback(
                "missing_old_hunk_range",
                "old hunk range invalid, fallback to window",
                Some(json!({ "unit_id": unit.unit_id, "file_path": unit.file_path })),
            );
            old_start = new_start.saturating_sub(config.function_window).max(1);
            old_end = new_end + config.function_window;
        }

        let location = format_location(unit, new_start, new_end);
        let mut diff = if unit.unified_diff_with_lines.is_empty() {
            unit.unified_diff.clone()
        } else {
            unit.unified_diff_with_lines.clone()
        };
        if let Some(location) = &location {
            diff = format!("@@ {location} @@\n{diff}");
        }
        // Approximate line budget derived from the char budget.
        diff = truncate_lines(&diff, config.max_chars_per_field / 40);

        let lines = cached_lines(&mut file_cache, &diff_ctx.cwd, &unit.file_path);

        let mut function_context = None;
        let mut file_context = None;
        let mut full_file = None;
        match item.final_context_level {
            FinalContextLevel::DiffOnly => {}
            FinalContextLevel::Function => {
                function_context = extract_function_slice(
                    &lines,
                    new_start,
                    new_end,
                    unit.language,
                    config.function_window,
                );
            }
            FinalContextLevel::FileContext => {
                file_context = Some(slice_lines(
                    &lines,
                    new_start.saturating_sub(config.file_context_window),
                    new_end + config.file_context_window,
                ));
            }
            FinalContextLevel::FullFile => {
                if !lines.is_empty() {
                    full_file = Some(render_full_file(&lines, new_start, new_end, config));
                }
            }
        }

        let mut previous_version = None;
        let mut callers: Vec<CallerHit> = Vec::new();
        for request in &item.extra_requests {
            match request.kind.as_str() {
                "previous_version" => {
                    if let Some(base) = diff_ctx.base_branch.as_deref() {
                        let key = (base.to_string(), unit.file_path.clone());
                        if !prev_cache.contains_key(&key) {
                            let lines =
                                git::show_file(base, &unit.file_path, &diff_ctx.cwd).await;
                            prev_cache.insert(key.clone(), lines);
                        }
                        let prev_lines = &prev_cache[&key];
                        previous_version = Some(slice_lines(prev_lines, old_start, old_end));
                    }
                }
                "callers" => {
                    let needle = request
                        .symbol
                        .as_deref()
                        .or(request.details.as_deref())
                        .or_else(|| unit.symbol.as_ref().map(|s| s.name.as_str()));
                    if let Some(needle) = needle {
                        callers =
                            search_callers(needle, &diff_ctx.cwd, config.callers_max_hits).await;
                    }
                }
                "search" | "search_config_usage" => {
                    let needle = request
                        .keyword
                        .as_deref()
                        .or(request.details.as_deref());
                    if let Some(needle) = needle {
                        callers =
                            search_callers(needle, &diff_ctx.cwd, config.callers_max_hits).await;
                    }
                }
                _ => {}
            }
        }

        // Enrich hits with a small window of surrounding code.
        let callers = enrich_callers(
            callers,
            &mut file_cache,
            &diff_ctx.cwd,
            config.callers_snippet_window,
            config.max_chars_per_field,
        );

        bundle.push(ContextBundleEntry {
            unit_id: unit.unit_id.clone(),
            meta: BundleMeta {
                file_path: unit.file_path.clone(),
                tags: unit.tags.clone(),
                hunk_range: unit.hunk_range,
                line_numbers: Some(unit.line_numbers.clone()),
                location,
            },
            final_context_level: item.final_context_level,
            extra_requests: item.extra_requests.clone(),
            diff: truncate_chars(&diff, config.max_chars_per_field),
            function_context: bounded(function_context, config.max_chars_per_field),
            file_context: bounded(file_context, config.max_chars_per_field),
            full_file: bounded(full_file, config.max_chars_per_field),
            previous_version: bounded(previous_version, config.max_chars_per_field),
            callers,
        });
    }

    debug!(items = bundle.len(), "context bundle assembled");
    bundle
}

fn span(unit: &ReviewUnit, new_side: bool) -> (u32, u32) {
    let (start, len) = if new_side {
        (unit.hunk_range.new_start, unit.hunk_range.new_lines)
    } else {
        (unit.hunk_range.old_start, unit.hunk_range.old_lines)
    };
    let start = start.max(1);
    let len = len.max(1);
    (start, start + len - 1)
}

fn cached_lines(
    cache: &mut HashMap<String, Vec<String>>,
    cwd: &Path,
    file_path: &str,
) -> Vec<String> {
    if let Some(lines) = cache.get(file_path) {
        return lines.clone();
    }
    let lines = read_file_lines(&cwd.join(file_path));
    cache.insert(file_path.to_string(), lines.clone());
    lines
}

fn slice_lines(lines: &[String], start: u32, end: u32) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let s = start.max(1) as usize;
    let e = (end.max(start.max(1)) as usize).min(lines.len());
    if s > e {
        return String::new();
    }
    lines[s - 1..e].join("\n")
}

/// Function-level slice: smallest enclosing function/class via the AST,
/// falling back to a ±window slice for unsupported languages.
fn extract_function_slice(
    lines: &[String],
    start: u32,
    end: u32,
    language: Language,
    window: u32,
) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    let source = lines.join("\n");
    if let Some(tree) = ast::parse_source(language, &source) {
        if let Some((s, e)) = ast::enclosing_function_span(&tree, &source, start, end) {
            return Some(slice_lines(lines, s, e));
        }
    }
    let s = start.saturating_sub(window).max(1);
    let e = (end + window).min(lines.len() as u32);
    Some(slice_lines(lines, s, e))
}

/// Full-file rendering: whole file when small enough, otherwise head +
/// hunk window + tail, each section closed by a truncation marker.
fn render_full_file(lines: &[String], new_start: u32, new_end: u32, config: &ContextConfig) -> String {
    if lines.len() <= config.full_file_max_lines {
        return lines.join("\n");
    }
    let head = lines[..50.min(lines.len())].join("\n");
    let mid_start = new_start.saturating_sub(config.file_context_window).max(1);
    let mid_end = (new_end + config.file_context_window).min(lines.len() as u32);
    let mid = slice_lines(lines, mid_start, mid_end);
    let tail = lines[lines.len().saturating_sub(30)..].join("\n");
    [
        head,
        TRUNCATION_MARKER.to_string(),
        mid,
        TRUNCATION_MARKER.to_string(),
        tail,
        TRUNCATION_MARKER.to_string(),
    ]
    .join("\n")
}

/// Search the tree with ripgrep; a missing binary degrades quietly.
async fn search_callers(needle: &str, cwd: &Path, max_hits: usize) -> Vec<CallerHit> {
    let plain = needle.replace('_', "");
    if plain.is_empty() || !plain.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Vec::new();
    }

    let output = tokio::process::Command::new("rg")
        .arg("-n")
        .arg(needle)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(_) => {
            record_fallback(
                "ripgrep_unavailable",
                "ripgrep not found, caller search skipped",
                Some(json!({ "needle": needle })),
            );
            return Vec::new();
        }
    };
    // Exit code 1 means "no matches".
    if !matches!(output.status.code(), Some(0) | Some(1)) {
        return Vec::new();
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .take(max_hits)
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let file_path = parts.next()?.to_string();
            let line_no = parts.next()?;
            let text = parts.next()?;
            Some(CallerHit {
                file_path,
                snippet: format!("{line_no}: {text}"),
            })
        })
        .collect()
}

/// Replace each hit's single line with ± window of surrounding code and
/// deduplicate by `(file_path, snippet)`.
fn enrich_callers(
    hits: Vec<CallerHit>,
    cache: &mut HashMap<String, Vec<String>>,
    cwd: &Path,
    window: u32,
    max_chars: usize,
) -> Vec<CallerHit> {
    let mut seen = std::collections::HashSet::new();
    let mut enriched = Vec::new();
    for hit in hits {
        let line_no: Option<u32> = hit
            .snippet
            .split_once(':')
            .and_then(|(n, _)| n.trim().parse().ok());
        let snippet = match line_no {
            Some(n) => {
                let lines = cached_lines(cache, cwd, &hit.file_path);
                let sliced = slice_lines(&lines, n.saturating_sub(window), n + window);
                if sliced.is_empty() { hit.snippet } else { sliced }
            }
            None => hit.snippet,
        };
        let snippet = truncate_chars(&snippet, max_chars);
        if seen.insert((hit.file_path.clone(), snippet.clone())) {
            enriched.push(CallerHit {
                file_path: hit.file_path,
                snippet,
            });
        }
    }
    enriched
}

/// Empty strings become `None` so the bundle carries no placeholder noise.
fn bounded(text: Option<String>, max_chars: usize) -> Option<String> {
    match text {
        Some(text) if !text.is_empty() => Some(truncate_chars(&text, max_chars)),
        _ => None,
    }
}

/// Character-budget truncation; total output never exceeds `max_chars`.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker = format!("\n{TRUNCATION_MARKER}");
    let keep = max_chars.saturating_sub(marker.chars().count());
    let cut: String = text.chars().take(keep).collect();
    format!("{cut}{marker}")
}

/// Line-budget truncation preserving head and tail.
fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines || max_lines < 2 {
        return text.to_string();
    }
    let keep = max_lines / 2;
    let mut out: Vec<&str> = lines[..keep].to_vec();
    out.push(TRUNCATION_MARKER);
    out.extend(&lines[lines.len() - keep..]);
    out.join("\n")
}

fn format_location(unit: &ReviewUnit, new_start: u32, new_end: u32) -> Option<String> {
    let numbers = &unit.line_numbers;
    if !numbers.new_compact.is_empty() {
        return Some(format!("{}:{}", unit.file_path, numbers.new_compact));
    }
    if !numbers.old_compact.is_empty() {
        return Some(format!("{}:(removed) {}", unit.file_path, numbers.old_compact));
    }
    Some(format!("{}:{}-{}", unit.file_path, new_start, new_end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::fuse_plan;
    use crate::types::ContextPlan;
    use diff_engine::parser::parse_unified_diff;
    use diff_engine::units::build_review_units;
    use diff_engine::{DiffMode, index};
    use std::io::Write as _;

    fn diff_ctx_for(dir: &Path, diff: &str) -> DiffContext {
        let files = parse_unified_diff(diff);
        let units = build_review_units(&files, dir, true, true);
        let review_index = index::build_review_index(&units, DiffMode::Working, None);
        DiffContext {
            summary: String::new(),
            files: review_index.summary.files_changed.clone(),
            units,
            mode: DiffMode::Working,
            base_branch: None,
            review_index,
            cwd: dir.to_path_buf(),
        }
    }

    fn write_file(dir: &Path, name: &str, lines: usize) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        for i in 1..=lines {
            writeln!(f, "line {i}").unwrap();
        }
    }

    #[tokio::test]
    async fn diff_only_entries_carry_just_the_diff() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", 40);
        let diff = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -5,1 +5,1 @@\n-line 5\n+line five";
        let ctx = diff_ctx_for(dir.path(), diff);
        let fused = fuse_plan(&ctx.units, &ContextPlan::default());
        let bundle = build_context_bundle(&ctx, &fused, &ContextConfig::default()).await;
        assert_eq!(bundle.len(), 1);
        let entry = &bundle[0];
        assert!(entry.diff.starts_with("@@ a.txt:"));
        assert!(entry.full_file.is_none());
        assert!(entry.previous_version.is_none());
    }

    #[tokio::test]
    async fn oversize_full_file_has_exactly_three_markers() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "big.txt", 400);
        let diff = "diff --git a/big.txt b/big.txt\n--- a/big.txt\n+++ b/big.txt\n@@ -200,1 +200,1 @@\n-line 200\n+line two hundred";
        let ctx = diff_ctx_for(dir.path(), diff);
        let mut fused = fuse_plan(&ctx.units, &ContextPlan::default());
        fused.plan[0].final_context_level = FinalContextLevel::FullFile;
        let bundle = build_context_bundle(&ctx, &fused, &ContextConfig::default()).await;
        let full = bundle[0].full_file.as_ref().unwrap();
        assert_eq!(full.matches(TRUNCATION_MARKER).count(), 3);
        assert!(full.contains("line 1"));
        assert!(full.contains("line 200"));
        assert!(full.contains("line 400"));
    }

    #[tokio::test]
    async fn small_full_file_is_inlined_whole() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "small.txt", 20);
        let diff = "diff --git a/small.txt b/small.txt\n--- a/small.txt\n+++ b/small.txt\n@@ -3,1 +3,1 @@\n-line 3\n+line three";
        let ctx = diff_ctx_for(dir.path(), diff);
        let mut fused = fuse_plan(&ctx.units, &ContextPlan::default());
        fused.plan[0].final_context_level = FinalContextLevel::FullFile;
        let bundle = build_context_bundle(&ctx, &fused, &ContextConfig::default()).await;
        let full = bundle[0].full_file.as_ref().unwrap();
        assert!(!full.contains(TRUNCATION_MARKER));
        assert_eq!(full.lines().count(), 20);
    }

    #[tokio::test]
    async fn every_text_field_respects_the_char_budget() {
        let dir = tempfile::tempdir().unwrap();
        // Long lines so char truncation has to kick in.
        let mut f = std::fs::File::create(dir.path().join("wide.py")).unwrap();
        for i in 1..=120 {
            writeln!(f, "value_{i} = {:?}", "x".repeat(200)).unwrap();
        }
        drop(f);
        let diff = "diff --git a/wide.py b/wide.py\n--- a/wide.py\n+++ b/wide.py\n@@ -60,1 +60,1 @@\n-old\n+new";
        let ctx = diff_ctx_for(dir.path(), diff);
        let mut fused = fuse_plan(&ctx.units, &ContextPlan::default());
        fused.plan[0].final_context_level = FinalContextLevel::FileContext;
        let config = ContextConfig {
            max_chars_per_field: 500,
            ..ContextConfig::default()
        };
        let bundle = build_context_bundle(&ctx, &fused, &config).await;
        let entry = &bundle[0];
        assert!(entry.diff.chars().count() <= 500);
        for field in [&entry.file_context, &entry.function_context, &entry.full_file] {
            if let Some(text) = field {
                assert!(text.chars().count() <= 500);
            }
        }
    }

    #[tokio::test]
    async fn skipped_items_stay_out_of_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", 10);
        let diff = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -2,1 +2,1 @@\n-line 2\n+line two";
        let ctx = diff_ctx_for(dir.path(), diff);
        let mut fused = fuse_plan(&ctx.units, &ContextPlan::default());
        fused.plan[0].skip_review = true;
        let bundle = build_context_bundle(&ctx, &fused, &ContextConfig::default()).await;
        assert!(bundle.is_empty());
    }

    #[tokio::test]
    async fn function_level_uses_ast_for_python() {
        let dir = tempfile::tempdir().unwrap();
        let source = "\
def alpha():
    return 1


def beta():
    a = 2
    b = 3
    return a + b


def gamma():
    return 4
";
        std::fs::write(dir.path().join("mod.py"), source).unwrap();
        let diff = "diff --git a/mod.py b/mod.py\n--- a/mod.py\n+++ b/mod.py\n@@ -6,1 +6,1 @@\n-    a = 2\n+    a = 20";
        let ctx = diff_ctx_for(dir.path(), diff);
        let fused = fuse_plan(&ctx.units, &ContextPlan::default());
        assert_eq!(fused.plan[0].final_context_level, FinalContextLevel::Function);
        let bundle = build_context_bundle(&ctx, &fused, &ContextConfig::default()).await;
        let function = bundle[0].function_context.as_ref().unwrap();
        assert!(function.contains("def beta"));
        assert!(!function.contains("def gamma"));
    }
}
