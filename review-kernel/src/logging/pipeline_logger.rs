//! JSONL pipeline logger: one file per session under `log/pipeline/`.
//!
//! Each record carries the trace id, a UTC timestamp and the uptime since
//! session start. Bulky payload keys are redacted via the shared
//! `safe_payload` bounds.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::warn;

use ai_llm_service::telemetry::{safe_payload, utc_iso};

const MAX_CHARS: usize = 4000;
const MAX_ITEMS: usize = 50;

/// Lightweight JSONL logger tracking planning → fusion → context → review.
pub struct PipelineLogger {
    root: PathBuf,
    pub trace_id: String,
    session_path: Mutex<Option<PathBuf>>,
    started_at: Mutex<Option<Instant>>,
}

impl PipelineLogger {
    pub fn new(trace_id: &str) -> Self {
        let base = std::env::var("REVIEW_LOG_DIR").unwrap_or_else(|_| "log".to_string());
        Self::with_root(trace_id, format!("{base}/pipeline"))
    }

    pub fn with_root(trace_id: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            trace_id: trace_id.to_string(),
            session_path: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// Open the session file and write the start record.
    pub fn start(&self, name: &str, meta: &Value) -> Option<PathBuf> {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self.root.join(format!("{ts}_{name}_{}.jsonl", self.trace_id));
        *self.started_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        *self.session_path.lock().unwrap_or_else(|p| p.into_inner()) = Some(path.clone());

        self.write(json!({
            "event": "session_start",
            "stage": name,
            "status": "start",
            "meta": safe_payload(meta, MAX_CHARS, MAX_ITEMS),
        }));
        Some(path)
    }

    /// Record one stage event with trace id, timestamp and uptime attached.
    pub fn log(&self, stage: &str, payload: &Value) {
        self.log_with_status(stage, payload, "info");
    }

    pub fn log_with_status(&self, stage: &str, payload: &Value, status: &str) {
        self.write(json!({
            "event": stage,
            "stage": stage,
            "status": status,
            "payload": safe_payload(payload, MAX_CHARS, MAX_ITEMS),
        }));
    }

    fn write(&self, mut record: Value) {
        let path = {
            let guard = self.session_path.lock().unwrap_or_else(|p| p.into_inner());
            match guard.as_ref() {
                Some(path) => path.clone(),
                None => return,
            }
        };
        if let Some(map) = record.as_object_mut() {
            map.insert("ts".to_string(), json!(utc_iso()));
            map.insert("trace_id".to_string(), json!(self.trace_id));
            let started = self.started_at.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(start) = started.as_ref() {
                map.insert("uptime_ms".to_string(), json!(start.elapsed().as_millis() as u64));
            }
        }
        if let Err(err) = append_line(&path, &record) {
            warn!(%err, path = %path.display(), "pipeline log write failed");
        }
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
    fn records_carry_trace_and_uptime() {
        let dir = tempfile::tempdir().unwrap();
        let logger = PipelineLogger::with_root("trace03", dir.path());
        let path = logger.start("review_session", &json!({"provider": "mock"})).unwrap();
        logger.log("planner_attempt", &json!({"attempt": 0}));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let record: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(record["trace_id"], "trace03");
        assert!(record["uptime_ms"].is_u64());
        assert_eq!(record["stage"], "planner_attempt");
    }
}
