//! Pipeline event bus.
//!
//! Events are the output of a review session. The kernel writes them to an
//! unbounded channel; the consumer (SSE route, tests) drains the receiver
//! and renders them. Emission never blocks and a dropped receiver never
//! fails the pipeline. `pipeline_stage_start(stage)` always precedes every
//! sub-event of that stage and `pipeline_stage_end(stage)` follows them.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Everything a consumer can observe about a running session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStageStart {
        stage: String,
    },
    PipelineStageEnd {
        stage: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<Value>,
    },
    DiffUnitsSnapshot {
        diff_files: Vec<String>,
        diff_units: Value,
    },
    BundleItem {
        unit_id: String,
        final_context_level: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    IntentDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        content_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning_delta: Option<String>,
    },
    PlannerDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        content_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning_delta: Option<String>,
    },
    Delta {
        #[serde(skip_serializing_if = "Option::is_none")]
        content_delta: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning_delta: Option<String>,
        call_index: u32,
    },
    ToolResult {
        call_index: u32,
        tool_name: String,
        arguments: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    UsageSummary {
        usage_stage: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        call_index: Option<u32>,
        usage: Value,
        call_usage: Value,
        session_usage: Value,
    },
    SessionTitle {
        title: String,
        trace_id: String,
    },
    Warning {
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        message: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cancelled: Option<bool>,
    },
    ScannerProgress {
        status: String,
        scanner: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        issue_count: Option<u64>,
    },
}

/// Cheap clonable sender the kernel threads through every stage.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sender whose events go nowhere (agent-only runs, tests).
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn send(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn stage_start(&self, stage: &str) {
        self.send(PipelineEvent::PipelineStageStart {
            stage: stage.to_string(),
        });
    }

    pub fn stage_end(&self, stage: &str) {
        self.send(PipelineEvent::PipelineStageEnd {
            stage: stage.to_string(),
            summary: None,
        });
    }

    pub fn stage_end_with(&self, stage: &str, summary: Value) {
        self.send(PipelineEvent::PipelineStageEnd {
            stage: stage.to_string(),
            summary: Some(summary),
        });
    }

    pub fn warning(&self, stage: Option<&str>, message: &str) {
        self.send(PipelineEvent::Warning {
            stage: stage.map(str::to_string),
            message: message.to_string(),
        });
    }

    pub fn error(&self, stage: Option<&str>, message: &str) {
        self.send(PipelineEvent::Error {
            stage: stage.map(str::to_string),
            message: message.to_string(),
            cancelled: None,
        });
    }
}
