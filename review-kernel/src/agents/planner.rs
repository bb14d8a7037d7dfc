//! Planner agent: review index in, context plan JSON out.
//!
//! One streamed LLM call guarded by a first-token timeout (short for
//! ordinary models, long for "thinking" models) and an idle timeout on
//! inter-chunk silence. The output is tolerated aggressively: markdown
//! fences are stripped and the first balanced JSON object is extracted
//! with a depth counter that respects strings and escapes. Whatever
//! survives is whitelisted field by field.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use ai_llm_service::{CompleteOptions, DeltaEvent, LlmAdapter, StreamGuards, Usage};
use context_engine::{ContextPlan, ExtraRequest, FinalContextLevel, PlanItem};

use crate::prompts::{PLANNER_USER_INSTRUCTIONS, SYSTEM_PROMPT_PLANNER};

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FIRST_TOKEN_TIMEOUT_SECS: u64 = 20;
const DEFAULT_FIRST_TOKEN_TIMEOUT_THINKING_SECS: u64 = 120;

const ALLOWED_EXTRA_TYPES: &[&str] = &["callers", "previous_version", "search"];

fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

/// Lightweight planning agent (streaming, JSON only).
pub struct PlanningAgent<'a> {
    adapter: &'a LlmAdapter,
    pub last_usage: Option<Usage>,
}

impl<'a> PlanningAgent<'a> {
    pub fn new(adapter: &'a LlmAdapter) -> Self {
        Self {
            adapter,
            last_usage: None,
        }
    }

    /// One attempt: returns the validated plan, or a plan with `error` set
    /// when the model timed out or produced unusable output. Retries are
    /// the kernel's call.
    pub async fn run(
        &mut self,
        planner_index: &Value,
        intent_md: Option<&str>,
        user_prompt: Option<&str>,
        observer: Option<UnboundedSender<DeltaEvent>>,
    ) -> ContextPlan {
        let mut user_parts: Vec<String> = Vec::new();
        if let Some(intent) = intent_md {
            user_parts.push(format!("### Project intent\n{}\n\n---\n", intent.trim()));
        }
        if let Some(prompt) = user_prompt.filter(|p| !p.trim().is_empty()) {
            user_parts.push(format!(
                "### Reviewer instructions\n{}\nAdjust the context planning accordingly.\n\n---\n",
                prompt.trim()
            ));
        }
        user_parts.push(PLANNER_USER_INSTRUCTIONS.to_string());
        user_parts.push("review_index JSON:".to_string());
        user_parts.push(serde_json::to_string_pretty(planner_index).unwrap_or_default());

        let messages = vec![
            json!({ "role": "system", "content": SYSTEM_PROMPT_PLANNER }),
            json!({ "role": "user", "content": user_parts.join("\n") }),
        ];

        let first_token = if self.adapter.is_thinking_model() {
            env_secs(
                "PLANNER_FIRST_TOKEN_TIMEOUT_THINKING",
                DEFAULT_FIRST_TOKEN_TIMEOUT_THINKING_SECS,
            )
        } else {
            env_secs("PLANNER_FIRST_TOKEN_TIMEOUT", DEFAULT_FIRST_TOKEN_TIMEOUT_SECS)
        };
        let idle = env_secs("PLANNER_IDLE_TIMEOUT", DEFAULT_IDLE_TIMEOUT_SECS);

        let options = CompleteOptions {
            temperature: Some(0.5),
            top_p: Some(0.9),
            guards: StreamGuards {
                first_token: (first_token > 0).then(|| Duration::from_secs(first_token)),
                idle: (idle > 0).then(|| Duration::from_secs(idle)),
            },
            observer,
            ..CompleteOptions::default()
        };

        let message = match self.adapter.complete(&messages, options).await {
            Ok(message) => message,
            Err(err) => {
                let error = match err.timeout_kind() {
                    Some(kind) => {
                        let seconds = match kind {
                            ai_llm_service::TimeoutKind::FirstToken => first_token,
                            _ => idle,
                        };
                        warn!(kind = kind.as_str(), seconds, "planner timed out");
                        format!("timeout_after_{seconds}s")
                    }
                    None => {
                        warn!(%err, "planner call failed");
                        format!("exception:{err}")
                    }
                };
                return ContextPlan {
                    plan: Vec::new(),
                    error: Some(error),
                };
            }
        };

        self.last_usage = message.usage.filter(|usage| !usage.is_zero());
        parse_plan(message.content_str())
    }
}

/// Parse planner output into a validated plan.
pub fn parse_plan(content: &str) -> ContextPlan {
    let parsed = serde_json::from_str::<Value>(content)
        .ok()
        .or_else(|| {
            let cleaned = strip_code_fences(content);
            serde_json::from_str::<Value>(&cleaned).ok()
        })
        .or_else(|| {
            extract_json_object(content).and_then(|candidate| serde_json::from_str(&candidate).ok())
        });

    let Some(parsed) = parsed else {
        warn!("planner produced no parseable JSON");
        return ContextPlan {
            plan: Vec::new(),
            error: Some("invalid_json".to_string()),
        };
    };

    let raw_items = parsed
        .get("plan")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut seen_ids = std::collections::HashSet::new();
    let mut dropped = 0usize;
    let mut plan = Vec::new();
    for item in raw_items {
        let Some(unit_id) = item.get("unit_id").and_then(Value::as_str) else {
            dropped += 1;
            continue;
        };
        if !seen_ids.insert(unit_id.to_string()) {
            dropped += 1;
            continue;
        }

        let llm_context_level = item
            .get("llm_context_level")
            .and_then(Value::as_str)
            .and_then(parse_level);

        let extra_requests: Vec<ExtraRequest> = item
            .get("extra_requests")
            .and_then(Value::as_array)
            .map(|requests| {
                requests
                    .iter()
                    .filter_map(|request| {
                        let kind = request.get("type").and_then(Value::as_str)?;
                        if !ALLOWED_EXTRA_TYPES.contains(&kind) {
                            return None;
                        }
                        serde_json::from_value(request.clone()).ok()
                    })
                    .collect()
            })
            .unwrap_or_default();

        plan.push(PlanItem {
            unit_id: unit_id.to_string(),
            llm_context_level,
            extra_requests,
            skip_review: item
                .get("skip_review")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            reason: item
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    if dropped > 0 {
        debug!(dropped, kept = plan.len(), "planner items filtered");
    }

    ContextPlan { plan, error: None }
}

fn parse_level(raw: &str) -> Option<FinalContextLevel> {
    match raw {
        "diff_only" => Some(FinalContextLevel::DiffOnly),
        "function" => Some(FinalContextLevel::Function),
        "file_context" => Some(FinalContextLevel::FileContext),
        "full_file" => Some(FinalContextLevel::FullFile),
        _ => None,
    }
}

fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\n', '\r']);
    rest.trim_end_matches('`').trim().to_string()
}

/// First balanced `{...}` in the text, honouring strings and escapes.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
