//! The orchestration kernel: Diff → Rules → Intent → Planner → Fusion →
//! ContextBundle → Reviewer, with events flowing sideways throughout.
//!
//! Stages run strictly in order on one task; parallelism is limited to the
//! tool fan-out inside a reviewer turn, the streaming readers and the
//! optional background scan. Every non-fatal failure becomes an event the
//! consumer can show.

use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ai_llm_service::{ApiLogger, LlmAdapter};
use context_engine::{ContextBundleEntry, ContextConfig, ContextPlan, build_context_bundle, fuse_plan};
use diff_engine::DiffContext;
use services::fallback_tracker;

use crate::agents::reviewer::ToolApprover;
use crate::agents::{CodeReviewAgent, PlanningAgent, intent};
use crate::conversation::ConversationState;
use crate::errors::KernelResult;
use crate::events::{EventSender, PipelineEvent};
use crate::logging::PipelineLogger;
use crate::prompts::build_review_prompt;
use crate::request::ReviewRequest;
use crate::scanner::spawn_static_scan;
use crate::tools::ToolRuntime;
use crate::tools::policy::resolve_tools;
use crate::usage::UsageAggregator;

const PLANNER_MAX_ATTEMPTS: u32 = 2;
const PLANNER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Aborts the background scan when the kernel unwinds or is cancelled.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Core review engine coordinating the agents and the context modules.
pub struct ReviewKernel {
    review_adapter: LlmAdapter,
    planner_adapter: LlmAdapter,
    review_provider: String,
    planner_provider: String,
    pub trace_id: String,
    usage: UsageAggregator,
    pipe_logger: PipelineLogger,
}

impl ReviewKernel {
    pub fn new(
        review_adapter: LlmAdapter,
        planner_adapter: LlmAdapter,
        review_provider: String,
        planner_provider: String,
        trace_id: String,
    ) -> Self {
        let pipe_logger = PipelineLogger::new(&trace_id);
        Self {
            review_adapter,
            planner_adapter,
            review_provider,
            planner_provider,
            trace_id,
            usage: UsageAggregator::new(),
            pipe_logger,
        }
    }

    /// Run the pipeline for one collected diff context.
    pub async fn run(
        &self,
        request: &ReviewRequest,
        diff_ctx: &DiffContext,
        events: &EventSender,
        approver: Option<&ToolApprover>,
    ) -> KernelResult<String> {
        fallback_tracker().reset();
        self.usage.reset();
        self.pipe_logger.start(
            "review_session",
            &json!({
                "review_provider": self.review_provider,
                "planner_provider": self.planner_provider,
                "trace_id": self.trace_id,
            }),
        );
        self.pipe_logger.log(
            "diff_summary",
            &json!({
                "mode": diff_ctx.mode.as_str(),
                "files": diff_ctx.files.len(),
                "units": diff_ctx.units.len(),
                "summary": diff_ctx.summary,
            }),
        );

        // Diff perception already ran; report the stages in order so the
        // consumer sees the expected sequence.
        let planner_index =
            serde_json::to_value(diff_engine::planner_index(diff_ctx)).unwrap_or_default();
        events.stage_end_with(
            "diff_parse",
            json!({ "files": diff_ctx.files.len(), "units": diff_ctx.units.len() }),
        );
        events.stage_end("review_units");
        events.stage_end("rule_layer");
        events.stage_end("review_index");
        events.send(PipelineEvent::DiffUnitsSnapshot {
            diff_files: diff_ctx.files.clone(),
            diff_units: planner_index
                .get("units")
                .cloned()
                .unwrap_or(Value::Array(Vec::new())),
        });

        let _scan_guard = request.enable_static_scan.then(|| {
            AbortOnDrop(spawn_static_scan(
                diff_ctx.cwd.clone(),
                diff_ctx.files.clone(),
                events.clone(),
            ))
        });

        // ------------------------------------------------------------------
        // Intent analysis (cached per project)
        // ------------------------------------------------------------------
        events.stage_start("intent_analysis");
        let intent_md = if request.agent_enabled("intent") {
            let (delta_tx, delta_rx) = mpsc::unbounded_channel();
            let forwarder = forward_deltas(delta_rx, events.clone(), DeltaKind::Intent);
            let (summary, usage) =
                intent::intent_summary(&self.planner_adapter, &diff_ctx.cwd, Some(delta_tx)).await;
            let _ = forwarder.await;

            if let Some(usage) = usage {
                let (call_usage, session_usage) = self.usage.update(&usage, "intent", None);
                events.send(PipelineEvent::UsageSummary {
                    usage_stage: "intent".to_string(),
                    call_index: None,
                    usage: serde_json::to_value(usage).unwrap_or_default(),
                    call_usage: serde_json::to_value(call_usage).unwrap_or_default(),
                    session_usage: serde_json::to_value(session_usage).unwrap_or_default(),
                });
                self.pipe_logger
                    .log("intent_usage", &json!({ "usage": serde_json::to_value(usage).unwrap_or_default() }));
            }
            events.stage_end_with(
                "intent_analysis",
                json!({ "has_output": summary.is_some() }),
            );
            summary
        } else {
            let cached = intent::read_cache(&diff_ctx.cwd).map(|record| record.content);
            events.stage_end_with(
                "intent_analysis",
                json!({ "skipped": true, "cache_hit": cached.is_some() }),
            );
            cached
        };

        // ------------------------------------------------------------------
        // Planning (bounded retries, idle/first-token guarded)
        // ------------------------------------------------------------------
        let plan = if request.agent_enabled("planner") {
            events.stage_start("planner");
            let plan = self
                .run_planner_with_retries(request, &planner_index, intent_md.as_deref(), events)
                .await;
            if let Some(error) = &plan.error {
                events.warning(Some("planner"), &format!("planner_warning: {error}"));
            }
            // Push the final plan to the consumer as one structured delta.
            events.send(PipelineEvent::PlannerDelta {
                content_delta: serde_json::to_string_pretty(&plan).ok(),
                reasoning_delta: None,
            });
            events.stage_end("planner");
            plan
        } else {
            events.stage_start("planner");
            events.stage_end_with("planner", json!({ "skipped": true }));
            ContextPlan::default()
        };

        // Agent-selection shortcut: no reviewer, return intermediates.
        if !request.agent_enabled("reviewer") {
            if request.agent_enabled("planner") {
                return Ok(serde_json::to_string_pretty(&plan).unwrap_or_default());
            }
            if request.agent_enabled("intent") {
                return Ok(intent_md.unwrap_or_default());
            }
            return Ok("No agents executed.".to_string());
        }

        // ------------------------------------------------------------------
        // Fusion + context bundle
        // ------------------------------------------------------------------
        events.stage_start("fusion");
        let fused = fuse_plan(&diff_ctx.units, &plan);
        self.pipe_logger.log("planning_output", &json!({ "plan": plan }));
        self.pipe_logger
            .log("fusion_output", &json!({ "fused": fused }));
        events.stage_end("fusion");

        events.stage_start("context_bundle");
        let bundle = build_context_bundle(diff_ctx, &fused, &ContextConfig::default()).await;
        let bundle_stats = summarize_bundle(&bundle);
        info!(
            provider = %self.review_provider,
            plan_units = plan.plan.len(),
            bundle_items = bundle.len(),
            "plan fused"
        );
        self.pipe_logger
            .log("context_bundle_summary", &bundle_stats);
        for entry in &bundle {
            events.send(PipelineEvent::BundleItem {
                unit_id: entry.unit_id.clone(),
                final_context_level: entry.final_context_level.as_str().to_string(),
                location: entry.meta.location.clone(),
            });
        }
        events.stage_end_with("context_bundle", bundle_stats);

        // ------------------------------------------------------------------
        // Review loop
        // ------------------------------------------------------------------
        let mut runtime = ToolRuntime::new(&diff_ctx.cwd);
        runtime.register_builtins(&request.tool_names);
        let tools = resolve_tools(&request.tool_names, request.auto_approve);

        let mut state = ConversationState::new();
        state.load_history(&request.message_history);

        let review_index_md = diff_engine::markdown_context(diff_ctx);
        let bundle_json = serde_json::to_string_pretty(&json!({ "context_bundle": bundle }))
            .unwrap_or_default();
        let augmented_prompt = build_review_prompt(
            &review_index_md,
            &bundle_json,
            &request.prompt,
            intent_md.as_deref(),
        );
        self.pipe_logger.log(
            "review_request",
            &json!({
                "mode": diff_ctx.mode.as_str(),
                "prompt_preview": augmented_prompt.chars().take(2000).collect::<String>(),
                "context_bundle_size": bundle.len(),
            }),
        );

        events.stage_start("reviewer");
        let trace_logger = ApiLogger::new(&self.trace_id);
        let mut agent = CodeReviewAgent::new(
            &self.review_adapter,
            &runtime,
            &self.usage,
            events.clone(),
            state,
            Some(&trace_logger),
        );
        let result = match agent
            .run(&augmented_prompt, &diff_ctx.files, &tools, approver)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                events.error(Some("reviewer"), &err.to_string());
                self.pipe_logger.log_with_status(
                    "pipeline_error",
                    &json!({ "stage": "reviewer", "error": err.to_string() }),
                    "error",
                );
                return Err(err);
            }
        };
        self.pipe_logger.log(
            "review_result",
            &json!({ "result_preview": result.chars().take(500).collect::<String>() }),
        );
        events.stage_end("reviewer");

        if let Some(title) = extract_session_title(&result) {
            events.send(PipelineEvent::SessionTitle {
                title,
                trace_id: self.trace_id.clone(),
            });
        }

        let fallback_summary = fallback_tracker().take_summary();
        if !fallback_summary.is_empty() {
            warn!(total = fallback_summary.total, "fallbacks triggered this session");
            self.pipe_logger.log_with_status(
                "fallback_summary",
                &serde_json::to_value(&fallback_summary).unwrap_or_default(),
                "warn",
            );
            events.warning(
                None,
                &format!(
                    "{} degraded path(s) hit: {:?}",
                    fallback_summary.total,
                    fallback_summary.by_key.keys().collect::<Vec<_>>()
                ),
            );
        }

        self.pipe_logger.log(
            "session_end",
            &json!({
                "session_usage": serde_json::to_value(self.usage.session_totals()).unwrap_or_default(),
            }),
        );
        events.stage_end_with(
            "final_output",
            json!({ "result_preview": result.chars().take(300).collect::<String>() }),
        );
        Ok(result)
    }

    async fn run_planner_with_retries(
        &self,
        request: &ReviewRequest,
        planner_index: &Value,
        intent_md: Option<&str>,
        events: &EventSender,
    ) -> ContextPlan {
        let mut plan = ContextPlan::default();
        for attempt in 0..PLANNER_MAX_ATTEMPTS {
            if attempt > 0 {
                events.warning(
                    Some("planner"),
                    &format!(
                        "planner response problem, retrying (attempt {}/{})",
                        attempt + 1,
                        PLANNER_MAX_ATTEMPTS
                    ),
                );
                tokio::time::sleep(PLANNER_RETRY_DELAY).await;
            }

            let started = Instant::now();
            self.pipe_logger.log(
                "planner_attempt",
                &json!({
                    "attempt": attempt,
                    "max_attempts": PLANNER_MAX_ATTEMPTS,
                    "provider": self.planner_provider,
                    "model": self.planner_adapter.model(),
                }),
            );

            let (delta_tx, delta_rx) = mpsc::unbounded_channel();
            let forwarder = forward_deltas(delta_rx, events.clone(), DeltaKind::Planner);
            let mut agent = PlanningAgent::new(&self.planner_adapter);
            plan = agent
                .run(
                    planner_index,
                    intent_md,
                    Some(&request.prompt),
                    Some(delta_tx),
                )
                .await;
            let _ = forwarder.await;

            let ok = plan.error.is_none();
            self.pipe_logger.log(
                "planner_attempt_result",
                &json!({
                    "attempt": attempt,
                    "ok": ok,
                    "duration_ms": started.elapsed().as_millis() as u64,
                    "error": plan.error,
                    "kept_items": plan.plan.len(),
                }),
            );

            if let Some(usage) = agent.last_usage {
                let (call_usage, session_usage) = self.usage.update(&usage, "planner", Some(0));
                events.send(PipelineEvent::UsageSummary {
                    usage_stage: "planner".to_string(),
                    call_index: Some(0),
                    usage: serde_json::to_value(usage).unwrap_or_default(),
                    call_usage: serde_json::to_value(call_usage).unwrap_or_default(),
                    session_usage: serde_json::to_value(session_usage).unwrap_or_default(),
                });
            }

            if ok {
                break;
            }
            services::record_fallback(
                "planner_retry",
                "planner attempt failed",
                Some(json!({ "attempt": attempt, "error": plan.error })),
            );
        }
        plan
    }
}

enum DeltaKind {
    Intent,
    Planner,
}

/// Forward streaming deltas from one LLM call into the event bus.
fn forward_deltas(
    mut rx: mpsc::UnboundedReceiver<ai_llm_service::DeltaEvent>,
    events: EventSender,
    kind: DeltaKind,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(delta) = rx.recv().await {
            if delta.content_delta.is_empty() && delta.reasoning_delta.is_empty() {
                continue;
            }
            let content_delta =
                (!delta.content_delta.is_empty()).then(|| delta.content_delta.clone());
            let reasoning_delta =
                (!delta.reasoning_delta.is_empty()).then(|| delta.reasoning_delta.clone());
            let event = match kind {
                DeltaKind::Intent => PipelineEvent::IntentDelta {
                    content_delta,
                    reasoning_delta,
                },
                DeltaKind::Planner => PipelineEvent::PlannerDelta {
                    content_delta,
                    reasoning_delta,
                },
            };
            events.send(event);
        }
    })
}

/// Size/truncation overview of an assembled bundle.
fn summarize_bundle(bundle: &[ContextBundleEntry]) -> Value {
    let mut total_chars = 0usize;
    let mut truncated_fields = 0usize;
    let mut by_level: std::collections::BTreeMap<&str, usize> = Default::default();
    for entry in bundle {
        *by_level.entry(entry.final_context_level.as_str()).or_default() += 1;
        for field in [
            Some(&entry.diff),
            entry.function_context.as_ref(),
            entry.file_context.as_ref(),
            entry.full_file.as_ref(),
            entry.previous_version.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            total_chars += field.len();
            if field.contains("TRUNCATED") {
                truncated_fields += 1;
            }
        }
        for caller in &entry.callers {
            total_chars += caller.snippet.len();
        }
    }
    json!({
        "items": bundle.len(),
        "total_chars": total_chars,
        "avg_chars": total_chars / bundle.len().max(1),
        "truncated_fields": truncated_fields,
        "by_level": by_level,
    })
}

/// Generic report headings that make poor session titles.
const GENERIC_TITLES: &[&str] = &[
    "code review report",
    "code review",
    "review report",
    "review summary",
    "review notes",
    "review results",
    "change review",
];

/// First meaningful Markdown heading of the final report, for the UX.
pub fn extract_session_title(report: &str) -> Option<String> {
    let mut first_any: Option<String> = None;
    for line in report.lines() {
        let trimmed = line.trim_start();
        let Some(stripped) = trimmed
            .strip_prefix("###")
            .or_else(|| trimmed.strip_prefix("##"))
            .or_else(|| trimmed.strip_prefix('#'))
        else {
            continue;
        };
        let cleaned: String = stripped
            .chars()
            .filter(|c| !matches!(c, '#' | '*' | '`' | '[' | ']' | ':'))
            .collect::<String>()
            .trim()
            .to_string();
        if cleaned.is_empty() {
            continue;
        }
        if first_any.is_none() {
            first_any = Some(cleaned.clone());
        }
        let lower = cleaned.to_lowercase();
        if GENERIC_TITLES.contains(&lower.as_str()) {
            continue;
        }
        if lower.starts_with("file") {
            continue;
        }
        return Some(truncate_title(&cleaned));
    }
    first_any.map(|title| truncate_title(&title))
}

fn truncate_title(title: &str) -> String {
    title.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_skips_generic_headings() {
        let report = "# Code Review Report\n\n## Race in cache invalidation\n\nDetails...";
        assert_eq!(
            extract_session_title(report).as_deref(),
            Some("Race in cache invalidation")
        );
    }

    #[test]
    fn title_skips_file_headings_and_falls_back() {
        let report = "# Code Review Report\n## File: src/a.py\n";
        // Nothing meaningful: falls back to the first heading.
        assert_eq!(
            extract_session_title(report).as_deref(),
            Some("Code Review Report")
        );
        assert!(extract_session_title("no headings at all").is_none());
    }

    #[test]
    fn bundle_summary_counts_levels_and_truncations() {
        let bundle: Vec<ContextBundleEntry> = Vec::new();
        let stats = summarize_bundle(&bundle);
        assert_eq!(stats["items"], 0);
        assert_eq!(stats["total_chars"], 0);
    }
}
