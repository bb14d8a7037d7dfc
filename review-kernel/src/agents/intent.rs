//! Intent agent: cached one-paragraph project summary.
//!
//! Inputs are a shallow file-tree snapshot, the README head, the last ten
//! commits and the dependency manifests. The result is cached per project
//! (keyed by the root's basename) under `<data_dir>/Analysis/`; a cache
//! hit with non-empty content skips the LLM entirely.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use ai_llm_service::{AiResult, CompleteOptions, DeltaEvent, LlmAdapter, Usage};
use diff_engine::git;
use diff_engine::language::guess_language;

use crate::prompts::SYSTEM_PROMPT_INTENT;

const README_MAX_BYTES: usize = 10 * 1024;
const RECENT_COMMITS: usize = 10;
const FILE_TREE_MAX_DEPTH: usize = 2;
const FILE_TREE_MAX_FILES: usize = 150;
const CACHE_MAX_AGE_DAYS: i64 = 30;

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "go", "java", "rb", "rs", "c", "cpp", "h", "cs", "php",
    "swift", "kt", "scala", "sh", "sql", "md", "json", "yaml", "yml", "toml",
];

const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "Gemfile",
    "pom.xml",
];

/// Persisted cache record, one JSON file per project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCacheRecord {
    pub project_name: String,
    pub project_root: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    /// `agent` for generated summaries, `manual` for operator-edited ones.
    pub source: String,
}

/// Where intent analyses live: `<data_dir>/Analysis/<project>.json`.
pub fn analysis_dir() -> PathBuf {
    let data_dir = std::env::var("REVIEW_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    PathBuf::from(data_dir).join("Analysis")
}

pub fn project_name(project_root: &Path) -> String {
    project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn cache_path(project_root: &Path) -> PathBuf {
    analysis_dir().join(format!("{}.json", project_name(project_root)))
}

/// Cached record with non-empty content, if any.
pub fn read_cache(project_root: &Path) -> Option<IntentCacheRecord> {
    let path = cache_path(project_root);
    let raw = std::fs::read_to_string(&path).ok()?;
    let record: IntentCacheRecord = serde_json::from_str(&raw).ok()?;
    if record.content.trim().is_empty() {
        // An empty summary must not mask a needed regeneration.
        return None;
    }
    Some(record)
}

/// Write-then-rename so concurrent readers never see a partial file.
pub fn write_cache(project_root: &Path, record: &IntentCacheRecord) -> std::io::Result<()> {
    let path = cache_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(record).unwrap_or_default())?;
    std::fs::rename(&tmp, &path)
}

pub fn delete_cache(project_root: &Path) {
    let _ = std::fs::remove_file(cache_path(project_root));
}

/// Sweep Analysis files older than `CACHE_MAX_AGE_DAYS`.
pub fn cleanup_stale_cache() {
    let dir = analysis_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return;
    };
    let now = std::time::SystemTime::now();
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(modified) = meta.modified() else { continue };
        if let Ok(age) = now.duration_since(modified) {
            if age.as_secs() > (CACHE_MAX_AGE_DAYS as u64) * 24 * 3600 {
                debug!(path = %entry.path().display(), "removing stale intent cache");
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}

/// Collect the lightweight project overview fed to the agent.
pub async fn collect_intent_inputs(project_root: &Path) -> Value {
    json!({
        "file_tree": build_file_tree(project_root).await,
        "readme_content": read_readme(project_root),
        "git_history": recent_commits(project_root).await,
        "manifests": list_manifests(project_root),
    })
}

fn read_readme(root: &Path) -> Option<String> {
    for name in ["README.md", "readme.md", "README.rst", "README.txt"] {
        let path = root.join(name);
        if path.is_file() {
            if let Ok(content) = std::fs::read_to_string(&path) {
                let mut cut = content.into_bytes();
                cut.truncate(README_MAX_BYTES);
                return Some(String::from_utf8_lossy(&cut).into_owned());
            }
        }
    }
    None
}

async fn recent_commits(root: &Path) -> Vec<String> {
    match git::run_git(
        &["log", &format!("-n{RECENT_COMMITS}"), "--pretty=format:%h %s"],
        root,
    )
    .await
    {
        Ok(output) => output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn list_manifests(root: &Path) -> Vec<String> {
    MANIFEST_NAMES
        .iter()
        .filter(|name| root.join(name).is_file())
        .map(|name| name.to_string())
        .collect()
}

fn is_source_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Depth-limited tree of source files, `git ls-files` first (honours
/// .gitignore), `walkdir` as the fallback outside a repository.
async fn build_file_tree(root: &Path) -> Value {
    let mut files: Vec<String> = match git::run_git(&["ls-files"], root).await {
        Ok(output) => output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => walkdir::WalkDir::new(root)
            .max_depth(FILE_TREE_MAX_DEPTH + 1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .ok()
                    .map(|p| p.display().to_string())
            })
            .collect(),
    };

    files.retain(|path| {
        is_source_file(path) && Path::new(path).components().count() <= FILE_TREE_MAX_DEPTH + 1
    });
    files.sort();
    files.truncate(FILE_TREE_MAX_FILES);

    let mut tree = serde_json::Map::new();
    for file in &files {
        let mut parts = Path::new(file).components().peekable();
        let mut cursor = &mut tree;
        while let Some(part) = parts.next() {
            let key = part.as_os_str().to_string_lossy().into_owned();
            if parts.peek().is_none() {
                cursor.insert(key, json!(guess_language(file).as_str()));
            } else {
                let node = cursor.entry(key).or_insert_with(|| json!({}));
                match node.as_object_mut() {
                    Some(next) => cursor = next,
                    // A file and a directory share a name; keep the file.
                    None => break,
                }
            }
        }
    }
    Value::Object(tree)
}

/// Intent agent: one streamed call, temperature tuned for prose.
pub struct IntentAgent<'a> {
    adapter: &'a LlmAdapter,
    pub last_usage: Option<Usage>,
}

impl<'a> IntentAgent<'a> {
    pub fn new(adapter: &'a LlmAdapter) -> Self {
        Self {
            adapter,
            last_usage: None,
        }
    }

    pub async fn run(
        &mut self,
        intent_inputs: &Value,
        observer: Option<UnboundedSender<DeltaEvent>>,
    ) -> AiResult<String> {
        let user_content = format!(
            "Project overview below. Write the summary described in the system prompt.\n\nproject_overview:\n```json\n{}\n```",
            serde_json::to_string_pretty(intent_inputs).unwrap_or_default()
        );
        let messages = vec![
            json!({ "role": "system", "content": SYSTEM_PROMPT_INTENT }),
            json!({ "role": "user", "content": user_content }),
        ];
        let options = CompleteOptions {
            temperature: Some(0.7),
            top_p: Some(0.95),
            observer,
            ..CompleteOptions::default()
        };
        let message = self.adapter.complete(&messages, options).await?;
        self.last_usage = message.usage.filter(|usage| !usage.is_zero());
        info!(
            chars = message.content_str().len(),
            "intent summary generated"
        );
        Ok(message.content_str().to_string())
    }
}

/// Cache-or-generate wrapper used by the kernel. LLM failures leave the
/// cache untouched and yield `None`; the pipeline continues without an
/// intent summary.
pub async fn intent_summary(
    adapter: &LlmAdapter,
    project_root: &Path,
    observer: Option<UnboundedSender<DeltaEvent>>,
) -> (Option<String>, Option<Usage>) {
    if let Some(record) = read_cache(project_root) {
        debug!(project = %record.project_name, "intent cache hit");
        return (Some(record.content), None);
    }

    let inputs = collect_intent_inputs(project_root).await;
    let mut agent = IntentAgent::new(adapter);
    match agent.run(&inputs, observer).await {
        Ok(content) if !content.trim().is_empty() => {
            let now = chrono::Local::now().to_rfc3339();
            let record = IntentCacheRecord {
                project_name: project_name(project_root),
                project_root: project_root.display().to_string(),
                content: content.clone(),
                created_at: now.clone(),
                updated_at: now,
                source: "agent".to_string(),
            };
            if let Err(err) = write_cache(project_root, &record) {
                warn!(%err, "failed to persist intent cache");
            }
            (Some(content), agent.last_usage)
        }
        Ok(_) => (None, agent.last_usage),
        Err(err) => {
            warn!(%err, "intent agent failed; continuing without summary");
            (None, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{with_data_dir, with_data_dir_async};
    use ai_llm_service::{MockLlmClient, MockTurn};

    #[test]
    fn cache_round_trips_and_ignores_empty_content() {
        let data = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        with_data_dir(data.path(), || {
            assert!(read_cache(project.path()).is_none());
            let record = IntentCacheRecord {
                project_name: project_name(project.path()),
                project_root: project.path().display().to_string(),
                content: "A payments service.".into(),
                created_at: "2026-01-01T00:00:00Z".into(),
                updated_at: "2026-01-01T00:00:00Z".into(),
                source: "agent".into(),
            };
            write_cache(project.path(), &record).unwrap();
            assert_eq!(
                read_cache(project.path()).unwrap().content,
                "A payments service."
            );

            let empty = IntentCacheRecord {
                content: String::new(),
                ..record
            };
            write_cache(project.path(), &empty).unwrap();
            assert!(read_cache(project.path()).is_none());
        });
    }

    #[tokio::test]
    async fn file_tree_is_depth_limited_and_source_only() {
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project.path().join("src/deep/nested")).unwrap();
        std::fs::write(project.path().join("main.py"), "x = 1\n").unwrap();
        std::fs::write(project.path().join("src/app.py"), "y = 2\n").unwrap();
        std::fs::write(project.path().join("src/deep/nested/far.py"), "z = 3\n").unwrap();
        std::fs::write(project.path().join("binary.dat"), "\x00").unwrap();

        let tree = build_file_tree(project.path()).await;
        assert_eq!(tree["main.py"], "python");
        assert_eq!(tree["src"]["app.py"], "python");
        assert!(tree.get("binary.dat").is_none());
        assert!(tree["src"].get("deep").is_none());
    }

    #[tokio::test]
    async fn generation_populates_cache() {
        let data = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let adapter =
            ai_llm_service::LlmAdapter::Mock(MockLlmClient::new(vec![MockTurn::stop(
                "A small CLI that frobnicates widgets.",
            )]));

        let project_path = project.path().to_path_buf();
        with_data_dir_async(data.path(), async {
            let (summary, usage) = intent_summary(&adapter, &project_path, None).await;
            assert!(summary.unwrap().contains("frobnicates"));
            assert!(usage.is_some());
            assert!(read_cache(&project_path).is_some());

            // Second run hits the cache: the mock script is exhausted, so
            // any LLM call would return the canned offline answer instead.
            let (summary, usage) = intent_summary(&adapter, &project_path, None).await;
            assert!(summary.unwrap().contains("frobnicates"));
            assert!(usage.is_none());
        })
        .await;
    }
}
