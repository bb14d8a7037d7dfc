//! Hunk views and line-number bookkeeping.
//!
//! Produces the unified-diff renderings (plain + line-numbered), the
//! before/after snippets, the changed-line number lists with their compact
//! run-length form, and the surrounding-context slice.

use crate::parser::{DiffHunk, DiffLine};

/// Plain unified view of a hunk, one prefix character per line.
pub fn unified_diff_view(hunk: &DiffHunk) -> String {
    let mut lines = Vec::with_capacity(hunk.lines.len());
    for line in &hunk.lines {
        match line {
            DiffLine::Added { content, .. } => lines.push(format!("+{content}")),
            DiffLine::Removed { content, .. } => lines.push(format!("-{content}")),
            DiffLine::Context { content, .. } => lines.push(format!(" {content}")),
        }
    }
    lines.join("\n")
}

/// Line-numbered view so the reviewer can cite exact positions.
pub fn unified_diff_view_with_lines(hunk: &DiffHunk) -> String {
    let mut lines = Vec::with_capacity(hunk.lines.len());
    for line in &hunk.lines {
        match line {
            DiffLine::Added { new_line, content } => lines.push(format!("+{new_line}: {content}")),
            DiffLine::Removed { old_line, content } => lines.push(format!("-{old_line}: {content}")),
            DiffLine::Context { new_line, content, .. } => {
                lines.push(format!(" {new_line}: {content}"))
            }
        }
    }
    lines.join("\n")
}

/// Pre-image and post-image snippets of the hunk.
pub fn before_after(hunk: &DiffHunk) -> (String, String) {
    let mut before = Vec::new();
    let mut after = Vec::new();
    for line in &hunk.lines {
        match line {
            DiffLine::Added { content, .. } => after.push(content.as_str()),
            DiffLine::Removed { content, .. } => before.push(content.as_str()),
            DiffLine::Context { content, .. } => {
                before.push(content.as_str());
                after.push(content.as_str());
            }
        }
    }
    (before.join("\n"), after.join("\n"))
}

/// Sorted, deduplicated changed-line numbers (new side, old side).
pub fn collect_line_numbers(hunk: &DiffHunk) -> (Vec<u32>, Vec<u32>) {
    let mut new_lines = Vec::new();
    let mut old_lines = Vec::new();
    for line in &hunk.lines {
        match line {
            DiffLine::Added { new_line, .. } => new_lines.push(*new_line),
            DiffLine::Removed { old_line, .. } => old_lines.push(*old_line),
            DiffLine::Context { .. } => {}
        }
    }
    new_lines.sort_unstable();
    new_lines.dedup();
    old_lines.sort_unstable();
    old_lines.dedup();
    (new_lines, old_lines)
}

/// Compact a sorted line list into `L10-12,L20` form.
pub fn compact_line_spans(lines: &[u32]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    let mut start = lines[0];
    let mut prev = lines[0];
    for &num in &lines[1..] {
        if num == prev + 1 {
            prev = num;
            continue;
        }
        parts.push(span_str(start, prev));
        start = num;
        prev = num;
    }
    parts.push(span_str(start, prev));
    parts.join(",")
}

fn span_str(a: u32, b: u32) -> String {
    if a == b {
        format!("L{a}")
    } else {
        format!("L{a}-{b}")
    }
}

/// Decode a compact span string back into line numbers (test support for
/// the round-trip invariant, also used by tooling).
pub fn expand_line_spans(compact: &str) -> Vec<u32> {
    let mut lines = Vec::new();
    for part in compact.split(',').filter(|p| !p.is_empty()) {
        let part = part.trim_start_matches('L');
        if let Some((a, b)) = part.split_once('-') {
            if let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) {
                lines.extend(a..=b);
            }
        } else if let Ok(n) = part.parse::<u32>() {
            lines.push(n);
        }
    }
    lines
}

/// Slice surrounding context from the post-image lines.
/// Returns `(snippet, context_start, context_end)` (1-based inclusive).
pub fn extract_context(
    full_lines: &[String],
    new_start: u32,
    new_end: u32,
    before: u32,
    after: u32,
) -> (String, u32, u32) {
    if full_lines.is_empty() {
        let ctx_start = new_start.max(0);
        return (String::new(), ctx_start, new_end.max(ctx_start));
    }
    let start_idx = new_start.max(1);
    let end_idx = new_end.max(start_idx);
    let ctx_start = start_idx.saturating_sub(before).max(1);
    let ctx_end = (end_idx + after).min(full_lines.len() as u32);
    let snippet = full_lines[(ctx_start - 1) as usize..ctx_end as usize].join("\n");
    (snippet, ctx_start, ctx_end)
}

/// Truncate documentation blocks, placing a clear marker at the end.
pub fn truncate_doc_block(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }
    let mut kept: Vec<&str> = lines[..max_lines.saturating_sub(1)].to_vec();
    kept.push("...(truncated)");
    kept.join("\n")
}
