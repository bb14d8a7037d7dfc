//! Extended unified-diff parser.
//!
//! Features:
//! - Parses full multi-file `git diff` output, file headers included.
//! - Works even if file headers (---/+++) are missing (hunks-only input).
//! - Ignores `\ No newline at end of file` marker lines.
//! - Binary patch heuristics (`GIT binary patch`, `Binary files ... differ`).

use serde::Serialize;

/// One line inside a hunk with its resolved line numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiffLine {
    Added { new_line: u32, content: String },
    Removed { old_line: u32, content: String },
    Context { old_line: u32, new_line: u32, content: String },
}

impl DiffLine {
    pub fn content(&self) -> &str {
        match self {
            DiffLine::Added { content, .. }
            | DiffLine::Removed { content, .. }
            | DiffLine::Context { content, .. } => content,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, DiffLine::Added { .. })
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, DiffLine::Removed { .. })
    }
}

/// One `@@` hunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    pub fn added_count(&self) -> u32 {
        self.lines.iter().filter(|l| l.is_added()).count() as u32
    }

    pub fn removed_count(&self) -> u32 {
        self.lines.iter().filter(|l| l.is_removed()).count() as u32
    }
}

/// One file entry of the diff.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchedFile {
    /// Path on the old side (`a/...` prefix stripped), if any.
    pub source_path: Option<String>,
    /// Path on the new side (`b/...` prefix stripped), if any.
    pub target_path: Option<String>,
    pub is_added: bool,
    pub is_removed: bool,
    pub is_binary: bool,
    pub hunks: Vec<DiffHunk>,
}

impl PatchedFile {
    /// Post-image path, falling back to the pre-image path for deletions.
    pub fn path(&self) -> &str {
        self.target_path
            .as_deref()
            .or(self.source_path.as_deref())
            .unwrap_or("")
    }
}

/// Parse a full unified diff into per-file hunks/lines.
/// Robust to missing file headers; only `@@` headers are required.
pub fn parse_unified_diff(diff: &str) -> Vec<PatchedFile> {
    let mut files: Vec<PatchedFile> = Vec::new();
    let mut current = PatchedFile::default();
    let mut has_current = false;
    let mut hunk = DiffHunk::default();
    let mut in_hunk = false;
    let mut old_line = 0u32;
    let mut new_line = 0u32;

    let mut flush_hunk = |current: &mut PatchedFile, hunk: &mut DiffHunk, in_hunk: &mut bool| {
        if *in_hunk && !hunk.lines.is_empty() {
            current.hunks.push(std::mem::take(hunk));
        }
        *in_hunk = false;
    };

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush_hunk(&mut current, &mut hunk, &mut in_hunk);
            if has_current {
                files.push(std::mem::take(&mut current));
            }
            has_current = true;
            // "a/foo b/foo"; quoted forms are handled by strip_path below.
            let mut parts = rest.splitn(2, ' ');
            current.source_path = parts.next().and_then(|p| strip_path(p, "a/"));
            current.target_path = parts.next().and_then(|p| strip_path(p, "b/"));
            continue;
        }
        if line.starts_with("new file mode") {
            current.is_added = true;
            continue;
        }
        if line.starts_with("deleted file mode") {
            current.is_removed = true;
            continue;
        }
        if looks_like_binary_patch(line) {
            current.is_binary = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix("--- ") {
            if rest.trim() == "/dev/null" {
                current.is_added = true;
                current.source_path = None;
            } else {
                current.source_path = strip_path(rest.trim(), "a/");
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("+++ ") {
            if rest.trim() == "/dev/null" {
                current.is_removed = true;
                current.target_path = None;
            } else {
                current.target_path = strip_path(rest.trim(), "b/");
            }
            continue;
        }

        if line.starts_with("@@") {
            flush_hunk(&mut current, &mut hunk, &mut in_hunk);
            has_current = true;
            if let Some((left, right)) = line
                .trim_start_matches('@')
                .trim_end_matches('@')
                .trim()
                .split_once('+')
            {
                let (o_start, o_len) = split_nums(left.trim().trim_start_matches('-'));
                let (n_start, n_len) = split_nums(right.trim());
                hunk.old_start = o_start;
                hunk.old_lines = o_len;
                hunk.new_start = n_start;
                hunk.new_lines = n_len;
                old_line = o_start;
                new_line = n_start;
                in_hunk = true;
            }
            continue;
        }

        // Marker lines are not diff content.
        if line.starts_with("\\ ") {
            continue;
        }
        if !in_hunk {
            // Skip prelude (index lines, mode changes) until the first '@@'.
            continue;
        }

        if let Some(rest) = line.strip_prefix('+') {
            hunk.lines.push(DiffLine::Added {
                new_line,
                content: rest.to_string(),
            });
            new_line += 1;
        } else if let Some(rest) = line.strip_prefix('-') {
            hunk.lines.push(DiffLine::Removed {
                old_line,
                content: rest.to_string(),
            });
            old_line += 1;
        } else {
            let content = line.strip_prefix(' ').unwrap_or(line);
            hunk.lines.push(DiffLine::Context {
                old_line,
                new_line,
                content: content.to_string(),
            });
            old_line += 1;
            new_line += 1;
        }
    }

    flush_hunk(&mut current, &mut hunk, &mut in_hunk);
    if has_current {
        files.push(current);
    }
    files
}

/// Splits "12,7" or "12" into (start, len). Length defaults to 1 for the
/// single-number form, per the unified-diff convention.
fn split_nums(s: &str) -> (u32, u32) {
    let s = s.trim();
    if let Some((a, b)) = s.split_once(',') {
        (a.parse().unwrap_or(0), b.parse().unwrap_or(0))
    } else {
        (s.parse().unwrap_or(0), 1)
    }
}

/// Strip `a/`/`b/` prefixes and surrounding quotes from header paths.
fn strip_path(raw: &str, prefix: &str) -> Option<String> {
    let raw = raw.trim().trim_matches('"');
    if raw == "/dev/null" || raw.is_empty() {
        return None;
    }
    Some(raw.strip_prefix(prefix).unwrap_or(raw).to_string())
}

/// Simple heuristic to detect binary patches in unified diff.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.contains("GIT binary patch")
        || s.starts_with("Binary files ")
        || (s.starts_with("Files ") && s.contains(" differ"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "diff --git a/foo.py b/foo.py\n\
index 111..222 100644\n\
--- a/foo.py\n\
+++ b/foo.py\n\
@@ -10,3 +10,3 @@\n ctx\n-# old\n+# new\n ctx";

    #[test]
    fn parses_single_hunk_with_line_numbers() {
        let files = parse_unified_diff(SIMPLE);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), "foo.py");
        let hunk = &files[0].hunks[0];
        assert_eq!((hunk.old_start, hunk.new_start), (10, 10));
        assert_eq!(hunk.added_count(), 1);
        assert_eq!(hunk.removed_count(), 1);
        assert!(hunk.lines.iter().any(|l| matches!(
            l,
            DiffLine::Added { new_line: 11, content } if content == "# new"
        )));
    }

    #[test]
    fn parses_hunks_only_input() {
        let files = parse_unified_diff("@@ -1,2 +1,2 @@\n-a\n+b\n c");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].hunks.len(), 1);
    }

    #[test]
    fn detects_added_and_removed_files() {
        let added = "diff --git a/new.rs b/new.rs\nnew file mode 100644\n--- /dev/null\n+++ b/new.rs\n@@ -0,0 +1,1 @@\n+fn main() {}";
        let files = parse_unified_diff(added);
        assert!(files[0].is_added);

        let removed = "diff --git a/old.rs b/old.rs\ndeleted file mode 100644\n--- a/old.rs\n+++ /dev/null\n@@ -1,1 +0,0 @@\n-fn main() {}";
        let files = parse_unified_diff(removed);
        assert!(files[0].is_removed);
    }

    #[test]
    fn binary_patches_are_flagged_without_hunks() {
        let diff = "diff --git a/logo.png b/logo.png\nBinary files a/logo.png and b/logo.png differ";
        let files = parse_unified_diff(diff);
        assert!(files[0].is_binary);
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn no_newline_marker_is_ignored() {
        let diff = "@@ -1,1 +1,1 @@\n-a\n+b\n\\ No newline at end of file";
        let files = parse_unified_diff(diff);
        assert_eq!(files[0].hunks[0].lines.len(), 2);
    }

    #[test]
    fn multiple_files_split_correctly() {
        let diff = format!("{SIMPLE}\ndiff --git a/bar.rs b/bar.rs\n--- a/bar.rs\n+++ b/bar.rs\n@@ -1,1 +1,2 @@\n a\n+b");
        let files = parse_unified_diff(&diff);
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].path(), "bar.rs");
    }
}
