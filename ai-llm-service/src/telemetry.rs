//! Session-scoped API logging.
//!
//! Writes one JSONL file per trace under `log/api_log/` with
//! REQUEST / RESPONSE_HEADERS / RESPONSE_CHUNK / RESPONSE_SUMMARY /
//! TOOLS_EXECUTION / SESSION_END records, plus an optional human-readable
//! Markdown summary under `log/human_log/`. Streaming chunks are sampled
//! (first, every N-th, last; hard cap) so a long stream cannot flood the
//! log. Bulky keys are redacted before anything reaches disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::warn;

const DEFAULT_MAX_CHARS: usize = 2000;
const DEFAULT_MAX_ITEMS: usize = 30;
const DEFAULT_CHUNK_SAMPLE_RATE: u64 = 20;
const DEFAULT_CHUNK_LIMIT: u64 = 200;

/// Keys whose values are dropped from logs (diff bodies, full contexts).
const REDACTED_KEYS: &[&str] = &[
    "unified_diff",
    "unified_diff_with_lines",
    "context",
    "code_snippets",
    "file_context",
    "full_file",
    "function_context",
];

/// RFC3339 UTC timestamp, second precision.
pub fn utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Bound a payload for logging: truncate long strings, cap arrays, drop
/// redacted keys.
pub fn safe_payload(value: &Value, max_chars: usize, max_items: usize) -> Value {
    let redacted: HashSet<&str> = REDACTED_KEYS.iter().copied().collect();
    bound_value(value, max_chars, max_items, &redacted)
}

fn bound_value(value: &Value, max_chars: usize, max_items: usize, redacted: &HashSet<&str>) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > max_chars {
                let cut: String = s.chars().take(max_chars).collect();
                Value::String(format!("{cut}…(truncated)"))
            } else {
                value.clone()
            }
        }
        Value::Array(items) => {
            let mut bounded: Vec<Value> = items
                .iter()
                .take(max_items)
                .map(|v| bound_value(v, max_chars, max_items, redacted))
                .collect();
            if items.len() > max_items {
                bounded.push(Value::String(format!(
                    "…({} items truncated)",
                    items.len() - max_items
                )));
            }
            Value::Array(bounded)
        }
        Value::Object(map) => {
            let mut bounded = serde_json::Map::new();
            for (key, v) in map {
                if redacted.contains(key.as_str()) {
                    bounded.insert(key.clone(), Value::String("(redacted)".to_string()));
                } else {
                    bounded.insert(key.clone(), bound_value(v, max_chars, max_items, redacted));
                }
            }
            Value::Object(bounded)
        }
        _ => value.clone(),
    }
}

struct ChunkStats {
    seen: u64,
    logged: u64,
}

/// Structured request/response logger, one JSONL file per trace.
pub struct ApiLogger {
    base_dir: PathBuf,
    human_dir: Option<PathBuf>,
    pub trace_id: String,
    enable_stream_chunks: bool,
    chunk_sample_rate: u64,
    chunk_limit: u64,
    session_path: Mutex<Option<PathBuf>>,
    human_path: Mutex<Option<PathBuf>>,
    chunk_stats: Mutex<HashMap<PathBuf, ChunkStats>>,
}

impl ApiLogger {
    pub fn new(trace_id: &str) -> Self {
        let base = std::env::var("REVIEW_LOG_DIR").unwrap_or_else(|_| "log".to_string());
        let human = format!("{base}/human_log");
        Self::with_dirs(trace_id, format!("{base}/api_log"), Some(human.as_str()))
    }

    pub fn with_dirs(trace_id: &str, base_dir: impl Into<PathBuf>, human_dir: Option<&str>) -> Self {
        Self {
            base_dir: base_dir.into(),
            human_dir: human_dir.map(PathBuf::from),
            trace_id: trace_id.to_string(),
            enable_stream_chunks: std::env::var("LLM_LOG_STREAM_CHUNKS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            chunk_sample_rate: DEFAULT_CHUNK_SAMPLE_RATE,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            session_path: Mutex::new(None),
            human_path: Mutex::new(None),
            chunk_stats: Mutex::new(HashMap::new()),
        }
    }

    /// Create (or reuse) the trace log file and record the request payload.
    pub fn start(&self, label: &str, payload: &Value) -> PathBuf {
        let path = {
            let mut guard = self.session_path.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(path) = guard.as_ref() {
                path.clone()
            } else {
                let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
                let path = self.base_dir.join(format!("{ts}_{}.jsonl", self.trace_id));
                *guard = Some(path.clone());
                path
            }
        };

        let mut enriched = payload.clone();
        if let Some(map) = enriched.as_object_mut() {
            map.entry("trace_id").or_insert(json!(self.trace_id));
            map.entry("label").or_insert(json!(label));
        }
        self.write_entry(&path, "REQUEST", &enriched, Some(label));
        self.chunk_stats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.clone(), ChunkStats { seen: 0, logged: 0 });

        if label == "agent_session" {
            self.init_human_session(&path, &enriched);
        }
        path
    }

    /// Append one record; RESPONSE_CHUNK records are sampled.
    pub fn append(&self, path: &Path, section: &str, payload: &Value) {
        let mut enriched = payload.clone();
        if let Some(map) = enriched.as_object_mut() {
            map.entry("trace_id").or_insert(json!(self.trace_id));
        }

        if section.starts_with("RESPONSE_CHUNK") {
            let mut stats = self.chunk_stats.lock().unwrap_or_else(|p| p.into_inner());
            let entry = stats
                .entry(path.to_path_buf())
                .or_insert(ChunkStats { seen: 0, logged: 0 });
            entry.seen += 1;
            let seen = entry.seen;

            if !self.enable_stream_chunks {
                return;
            }
            if seen > self.chunk_limit {
                if seen == self.chunk_limit + 1 {
                    let note = json!({
                        "reason": "stream_chunk_limit",
                        "limit": self.chunk_limit,
                        "trace_id": self.trace_id,
                    });
                    self.write_entry(path, "RESPONSE_CHUNK_SKIPPED", &note, None);
                }
                return;
            }
            let should_log =
                seen == 1 || seen % self.chunk_sample_rate == 0 || seen == self.chunk_limit;
            if !should_log {
                return;
            }
            entry.logged += 1;
            if let Some(map) = enriched.as_object_mut() {
                map.insert("chunk_index".to_string(), json!(seen));
            }
            self.write_entry(path, section, &enriched, None);
            return;
        }

        if section == "RESPONSE_SUMMARY" {
            let stats = self.chunk_stats.lock().unwrap_or_else(|p| p.into_inner());
            if let (Some(entry), Some(map)) = (stats.get(path), enriched.as_object_mut()) {
                map.entry("chunk_count").or_insert(json!(entry.seen));
                map.entry("chunks_logged").or_insert(json!(entry.logged));
            }
        }

        self.write_entry(path, section, &enriched, None);
        self.append_human(section, &enriched);
    }

    fn write_entry(&self, path: &Path, section: &str, payload: &Value, label: Option<&str>) {
        let record = json!({
            "section": section,
            "label": label,
            "payload": safe_payload(payload, DEFAULT_MAX_CHARS, DEFAULT_MAX_ITEMS),
            "trace_id": self.trace_id,
            "ts": utc_iso(),
        });
        if let Err(err) = append_line(path, &record) {
            warn!(%err, path = %path.display(), "api log write failed");
        }
    }

    // ------------------------------------------------------------------
    // Human-readable Markdown summary (agent sessions only)
    // ------------------------------------------------------------------

    fn init_human_session(&self, json_path: &Path, payload: &Value) {
        let Some(human_dir) = &self.human_dir else {
            return;
        };
        let name = json_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("session.jsonl")
            .replace(".jsonl", ".md");
        let path = human_dir.join(name);

        let provider = payload.get("provider").and_then(Value::as_str).unwrap_or("unknown");
        let files = payload
            .get("files")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        let tools = payload
            .get("tools_exposed")
            .and_then(Value::as_array)
            .map(|t| {
                t.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        let header = format!(
            "# Review session log\n\n- provider: `{provider}`\n- trace_id: `{}`\n- files under review: {files}\n- tools exposed: {}\n\n> Condensed view for humans; the full JSON lives in log/api_log.\n\n",
            self.trace_id,
            if tools.is_empty() { "(none)" } else { &tools },
        );
        if std::fs::create_dir_all(human_dir)
            .and_then(|_| std::fs::write(&path, header))
            .is_ok()
        {
            *self.human_path.lock().unwrap_or_else(|p| p.into_inner()) = Some(path);
        }
    }

    fn append_human(&self, section: &str, payload: &Value) {
        let guard = self.human_path.lock().unwrap_or_else(|p| p.into_inner());
        let Some(path) = guard.as_ref() else {
            return;
        };

        let mut block = String::new();
        if section.starts_with("LLM_CALL_") && section.ends_with("_RESPONSE") {
            let call_index = payload.get("call_index").and_then(Value::as_u64).unwrap_or(0);
            let assistant = payload.get("assistant_message").cloned().unwrap_or(Value::Null);
            let finish = assistant
                .get("finish_reason")
                .and_then(Value::as_str)
                .unwrap_or("-");
            let tools: Vec<&str> = assistant
                .get("tool_calls")
                .and_then(Value::as_array)
                .map(|calls| {
                    calls
                        .iter()
                        .filter_map(|c| c.get("name").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            let content = assistant
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            block.push_str(&format!(
                "## LLM call {call_index} (response)\n\n- finish_reason: `{finish}`\n- requested tools: {}\n\n",
                if tools.is_empty() {
                    "(none)".to_string()
                } else {
                    tools.join(", ")
                }
            ));
            if !content.is_empty() {
                block.push_str("**Content excerpt:**\n\n");
                block.push_str(&truncate_chars(content, 800));
                block.push_str("\n\n");
            }
        } else if section == "SESSION_END" {
            let preview = payload
                .get("final_content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            block.push_str("## Session end\n\n");
            if !preview.is_empty() {
                block.push_str(&truncate_chars(preview, 800));
                block.push('\n');
            }
        } else {
            return;
        }

        if let Ok(mut existing) = std::fs::read_to_string(path) {
            existing.push_str(&block);
            let _ = std::fs::write(path, existing);
        }
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let cut: String = s.chars().take(limit).collect();
        format!("{cut}\n…(truncated)")
    }
}

fn append_line(path: &Path, record: &Value) -> std::io::Result<()> {
    use std::io::Write as _;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{record}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_and_truncates_payloads() {
        let payload = json!({
            "unified_diff": "+secret stuff",
            "note": "y".repeat(5000),
            "list": (0..100).collect::<Vec<u64>>(),
        });
        let safe = safe_payload(&payload, 100, 10);
        assert_eq!(safe["unified_diff"], "(redacted)");
        assert!(safe["note"].as_str().unwrap().ends_with("…(truncated)"));
        assert_eq!(safe["list"].as_array().unwrap().len(), 11);
    }

    #[test]
    fn chunk_records_are_suppressed_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ApiLogger::with_dirs("trace01", dir.path().join("api"), None);
        let path = logger.start("stream_chat", &json!({"url": "http://x"}));
        for i in 0..50 {
            logger.append(&path, "RESPONSE_CHUNK", &json!({"raw": i}));
        }
        logger.append(&path, "RESPONSE_SUMMARY", &json!({"content": "done"}));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("RESPONSE_CHUNK\""));
        assert!(content.contains("\"chunk_count\":50"));
    }

    #[test]
    fn agent_session_creates_human_log() {
        let dir = tempfile::tempdir().unwrap();
        let human = dir.path().join("human");
        let logger = ApiLogger::with_dirs(
            "trace02",
            dir.path().join("api"),
            Some(human.to_str().unwrap()),
        );
        let path = logger.start(
            "agent_session",
            &json!({"provider": "mock", "files": ["a.py"], "tools_exposed": ["read_file_hunk"]}),
        );
        logger.append(
            &path,
            "SESSION_END",
            &json!({"final_content": "## Report\nAll good."}),
        );

        let entries: Vec<_> = std::fs::read_dir(&human).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let md = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert!(md.contains("Review session log"));
        assert!(md.contains("Session end"));
    }
}
