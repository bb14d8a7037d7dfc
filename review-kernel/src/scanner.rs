//! Optional background static scan.
//!
//! When enabled, a detached task runs whichever third-party scanners are
//! installed over the changed files and pushes `scanner_progress` events
//! while the main pipeline keeps going. The kernel aborts this task first
//! on cancellation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use diff_engine::Language;
use services::record_fallback;

use crate::events::{EventSender, PipelineEvent};

/// Scanner commands tried per language; the first available one runs.
fn scanners_for(language: Language) -> &'static [&'static [&'static str]] {
    match language {
        Language::Python => &[&["flake8"], &["pylint", "--errors-only"]],
        Language::Go => &[&["gofmt", "-l"]],
        Language::JavaScript | Language::TypeScript => &[&["eslint", "--no-color"]],
        Language::Ruby => &[&["rubocop", "--format", "quiet"]],
        _ => &[],
    }
}

/// Spawn the scan task; the caller owns (and may abort) the handle.
pub fn spawn_static_scan(
    project_root: PathBuf,
    files: Vec<String>,
    events: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for file in files {
            let language = diff_engine::language::guess_language(&file);
            for command in scanners_for(language) {
                let scanner = command[0];
                events.send(PipelineEvent::ScannerProgress {
                    status: "start".to_string(),
                    scanner: scanner.to_string(),
                    file: Some(file.clone()),
                    duration_ms: None,
                    issue_count: None,
                });

                let started = Instant::now();
                let output = tokio::process::Command::new(scanner)
                    .args(&command[1..])
                    .arg(&file)
                    .current_dir(&project_root)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .output()
                    .await;

                match output {
                    Ok(output) => {
                        let issues = String::from_utf8_lossy(&output.stdout)
                            .lines()
                            .filter(|l| !l.trim().is_empty())
                            .count() as u64;
                        debug!(scanner, file = %file, issues, "scanner finished");
                        events.send(PipelineEvent::ScannerProgress {
                            status: "complete".to_string(),
                            scanner: scanner.to_string(),
                            file: Some(file.clone()),
                            duration_ms: Some(started.elapsed().as_millis() as u64),
                            issue_count: Some(issues),
                        });
                        // One scanner per file is enough.
                        break;
                    }
                    Err(_) => {
                        record_fallback(
                            "scanner_unavailable",
                            "static scanner not installed",
                            Some(json!({ "scanner": scanner })),
                        );
                        events.send(PipelineEvent::ScannerProgress {
                            status: "error".to_string(),
                            scanner: scanner.to_string(),
                            file: Some(file.clone()),
                            duration_ms: None,
                            issue_count: None,
                        });
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_scanners_emit_error_progress() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.py"), "print(1)\n").unwrap();
        let (events, mut rx) = EventSender::new();
        let handle = spawn_static_scan(
            dir.path().to_path_buf(),
            vec!["x.py".to_string()],
            events,
        );
        handle.await.unwrap();

        let mut saw_progress = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PipelineEvent::ScannerProgress { .. }) {
                saw_progress = true;
            }
        }
        assert!(saw_progress);
    }
}
