//! Builtin tools exposed to the reviewer.
//!
//! All paths are resolved under the project root and rejected when they
//! escape it. Errors come back as strings so the runtime can hand them to
//! the model instead of crashing the session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::{Value, json};

use diff_engine::language::guess_language;
use services::read_file_lines;

const READ_HUNK_MAX_LINES: usize = 400;
const SEARCH_MAX_RESULTS: usize = 50;
const MANIFEST_MAX_LINES: usize = 100;

/// The closed set of builtin tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTool {
    ListProjectFiles,
    ReadFileHunk,
    ReadFileInfo,
    SearchInProject,
    GetDependencies,
}

/// Builtins that are harmless and enabled without explicit approval.
pub const BUILTIN_SAFE_TOOLS: &[&str] = &[
    "list_project_files",
    "read_file_hunk",
    "read_file_info",
    "search_in_project",
    "get_dependencies",
];

impl BuiltinTool {
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "list_project_files" => Some(BuiltinTool::ListProjectFiles),
            "read_file_hunk" => Some(BuiltinTool::ReadFileHunk),
            "read_file_info" => Some(BuiltinTool::ReadFileInfo),
            "search_in_project" => Some(BuiltinTool::SearchInProject),
            "get_dependencies" => Some(BuiltinTool::GetDependencies),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinTool::ListProjectFiles => {
                "List tracked project files grouped by directory (honours .gitignore)."
            }
            BuiltinTool::ReadFileHunk => {
                "Read a line range of a project file, optionally with line numbers."
            }
            BuiltinTool::ReadFileInfo => {
                "Basic file facts: existence, size, line count, detected language."
            }
            BuiltinTool::SearchInProject => {
                "Search tracked files for a string (git grep) and return matching lines."
            }
            BuiltinTool::GetDependencies => {
                "Return the project's dependency manifests (Cargo.toml, package.json, ...)."
            }
        }
    }

    pub fn parameters(&self) -> Value {
        match self {
            BuiltinTool::ListProjectFiles => json!({
                "type": "object",
                "properties": {
                    "dirs": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional directory prefixes to filter by."
                    }
                }
            }),
            BuiltinTool::ReadFileHunk => json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "start_line": { "type": "integer", "minimum": 1 },
                    "end_line": { "type": "integer", "minimum": 1 },
                    "numbered": { "type": "boolean", "description": "Prefix each line with its number." }
                },
                "required": ["path"]
            }),
            BuiltinTool::ReadFileInfo => json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
            BuiltinTool::SearchInProject => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "max_results": { "type": "integer", "minimum": 1 }
                },
                "required": ["query"]
            }),
            BuiltinTool::GetDependencies => json!({ "type": "object", "properties": {} }),
        }
    }

    pub async fn invoke(&self, root: &Path, args: &Value) -> Result<String, String> {
        match self {
            BuiltinTool::ListProjectFiles => list_project_files(root, args).await,
            BuiltinTool::ReadFileHunk => read_file_hunk(root, args),
            BuiltinTool::ReadFileInfo => read_file_info(root, args),
            BuiltinTool::SearchInProject => search_in_project(root, args).await,
            BuiltinTool::GetDependencies => get_dependencies(root),
        }
    }
}

fn resolve_path(root: &Path, raw: &str) -> Result<PathBuf, String> {
    if raw.is_empty() {
        return Err("path must not be empty".to_string());
    }
    if Path::new(raw).is_absolute() || raw.contains("..") {
        return Err(format!("path outside project root rejected: {raw}"));
    }
    Ok(root.join(raw))
}

async fn run_git(root: &Path, args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| format!("failed to launch git: {err}"))?;
    // git grep exits 1 on "no matches"; that is a result, not a failure.
    if !output.status.success() && output.status.code() != Some(1) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {} failed: {}", args.join(" "), stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn list_project_files(root: &Path, args: &Value) -> Result<String, String> {
    let dirs_filter: Vec<String> = args
        .get("dirs")
        .and_then(Value::as_array)
        .map(|dirs| {
            dirs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let tracked = run_git(root, &["ls-files"]).await?;
    let untracked = run_git(root, &["ls-files", "--others", "--exclude-standard"]).await?;
    let mut all: Vec<&str> = tracked
        .lines()
        .chain(untracked.lines())
        .filter(|l| !l.is_empty())
        .collect();
    all.sort_unstable();
    all.dedup();

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for rel in all {
        let path = Path::new(rel);
        let folder = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        if !dirs_filter.is_empty() && !dirs_filter.iter().any(|d| folder.starts_with(d.as_str())) {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        grouped.entry(folder).or_default().push(name);
    }

    serde_json::to_string_pretty(&json!({ "included_files": grouped }))
        .map_err(|err| err.to_string())
}

fn read_file_hunk(root: &Path, args: &Value) -> Result<String, String> {
    let path = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or("missing required argument: path")?;
    let full = resolve_path(root, path)?;
    let lines = read_file_lines(&full);
    if lines.is_empty() {
        return Err(format!("file not readable or empty: {path}"));
    }

    let start = args
        .get("start_line")
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .max(1) as usize;
    let end = args
        .get("end_line")
        .and_then(Value::as_u64)
        .map(|e| e as usize)
        .unwrap_or(lines.len())
        .min(lines.len());
    if start > end {
        return Err(format!("invalid range: {start}..{end}"));
    }
    let end = end.min(start + READ_HUNK_MAX_LINES - 1);

    let numbered = args
        .get("numbered")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let slice = &lines[start - 1..end];
    let body = if numbered {
        slice
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6} | {line}", start + i))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        slice.join("\n")
    };
    Ok(body)
}

fn read_file_info(root: &Path, args: &Value) -> Result<String, String> {
    let path = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or("missing required argument: path")?;
    let full = resolve_path(root, path)?;
    let exists = full.is_file();
    let size = full.metadata().map(|m| m.len()).unwrap_or(0);
    let lines = if exists { read_file_lines(&full).len() } else { 0 };
    serde_json::to_string_pretty(&json!({
        "path": path,
        "exists": exists,
        "size_bytes": size,
        "line_count": lines,
        "language": guess_language(path).as_str(),
    }))
    .map_err(|err| err.to_string())
}

async fn search_in_project(root: &Path, args: &Value) -> Result<String, String> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .ok_or("missing required argument: query")?;
    if query.trim().is_empty() {
        return Err("query must not be empty".to_string());
    }
    let max_results = args
        .get("max_results")
        .and_then(Value::as_u64)
        .map(|m| m as usize)
        .unwrap_or(SEARCH_MAX_RESULTS)
        .min(SEARCH_MAX_RESULTS);

    let output = run_git(root, &["grep", "-n", "--fixed-strings", query]).await?;
    let hits: Vec<&str> = output.lines().take(max_results).collect();
    if hits.is_empty() {
        return Ok(format!("no matches for {query:?}"));
    }
    Ok(hits.join("\n"))
}

fn get_dependencies(root: &Path) -> Result<String, String> {
    const MANIFESTS: &[&str] = &[
        "Cargo.toml",
        "package.json",
        "pyproject.toml",
        "requirements.txt",
        "go.mod",
        "Gemfile",
        "pom.xml",
    ];
    let mut sections = Vec::new();
    for manifest in MANIFESTS {
        let path = root.join(manifest);
        if !path.is_file() {
            continue;
        }
        let lines = read_file_lines(&path);
        let body: Vec<&String> = lines.iter().take(MANIFEST_MAX_LINES).collect();
        sections.push(format!(
            "## {manifest}\n{}",
            body.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n")
        ));
    }
    if sections.is_empty() {
        return Ok("no dependency manifests found".to_string());
    }
    Ok(sections.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_file_hunk_slices_and_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc\nd\n").unwrap();
        let body = BuiltinTool::ReadFileHunk
            .invoke(
                dir.path(),
                &json!({"path": "f.txt", "start_line": 2, "end_line": 3, "numbered": true}),
            )
            .await
            .unwrap();
        assert_eq!(body, "     2 | b\n     3 | c");
    }

    #[tokio::test]
    async fn path_escapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../etc/passwd", "/etc/passwd"] {
            let err = BuiltinTool::ReadFileHunk
                .invoke(dir.path(), &json!({"path": bad}))
                .await
                .unwrap_err();
            assert!(err.contains("rejected"));
        }
    }

    #[tokio::test]
    async fn file_info_reports_language_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.py"), "import os\nprint(1)\n").unwrap();
        let info = BuiltinTool::ReadFileInfo
            .invoke(dir.path(), &json!({"path": "m.py"}))
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&info).unwrap();
        assert_eq!(parsed["language"], "python");
        assert_eq!(parsed["line_count"], 2);
    }

    #[tokio::test]
    async fn get_dependencies_reads_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        let deps = BuiltinTool::GetDependencies
            .invoke(dir.path(), &json!({}))
            .await
            .unwrap();
        assert!(deps.contains("## Cargo.toml"));
        assert!(deps.contains("name = \"x\""));
    }
}
