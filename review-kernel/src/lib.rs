//! Public entry for the AI-assisted review pipeline.
//!
//! Single high-level function to run the whole pipeline for one request:
//!
//! 1) **Diff perception** — git diff → ReviewUnits + ReviewIndex
//!    (`diff-engine`), rule layer attached per unit (`rule-engine`).
//! 2) **Intent** — cached one-paragraph project summary.
//! 3) **Planning** — streamed, guarded LLM call returning a context plan.
//! 4) **Fusion + scheduling** — deterministic merge, then the context
//!    bundle is assembled from the tree (`context-engine`).
//! 5) **Review loop** — streaming LLM calls with tool-call arbitration,
//!    approval gating and usage aggregation.
//!
//! Events flow sideways to the consumer through [`events::EventSender`]
//! for the whole run. Cancellation is by task abort: the HTTP shell owns
//! the session task and aborts it on client disconnect; every stage
//! observes that at its next await point.

pub mod agents;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod factory;
pub mod kernel;
pub mod logging;
pub mod prompts;
pub mod request;
pub mod scanner;
pub mod tools;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support;

use std::path::PathBuf;

use tracing::info;

pub use agents::ToolApprover;
pub use errors::{KernelError, KernelResult};
pub use events::{EventSender, PipelineEvent};
pub use kernel::ReviewKernel;
pub use request::ReviewRequest;

use diff_engine::{DiffOptions, collect_diff_context};
use services::new_trace_id;

/// Run the full pipeline for one request, emitting events along the way.
///
/// This is the single public entry for the HTTP shell or a CLI. Returns
/// the final review report (or the plan/intent output when the reviewer
/// stage is deselected).
pub async fn run_review(
    request: ReviewRequest,
    events: EventSender,
    approver: Option<ToolApprover>,
) -> KernelResult<String> {
    if request.prompt.trim().is_empty() {
        return Err(KernelError::InvalidRequest("prompt must not be empty".into()));
    }

    let project_root = match &request.project_root {
        Some(root) => PathBuf::from(root),
        None => std::env::current_dir()?,
    };
    let trace_id = request
        .session_id
        .clone()
        .unwrap_or_else(new_trace_id);

    let diff_options = DiffOptions {
        mode: request.diff_mode,
        base_branch: None,
        commit_from: request.commit_from.clone(),
        commit_to: request.commit_to.clone(),
        use_merge_base: request.use_merge_base,
    };
    let diff_ctx = match collect_diff_context(&diff_options, &project_root).await {
        Ok(diff_ctx) => diff_ctx,
        Err(err) => {
            events.error(Some("diff_parse"), &err.to_string());
            return Err(err.into());
        }
    };

    let (review_adapter, review_provider) =
        factory::build_adapter(&request.llm_preference, &project_root)?;
    let (planner_adapter, planner_provider) =
        factory::build_adapter(request.planner_preference(), &project_root)?;

    info!(
        trace_id = %trace_id,
        review_provider = %review_provider,
        planner_provider = %planner_provider,
        files = diff_ctx.files.len(),
        units = diff_ctx.units.len(),
        "review session starting"
    );

    let kernel = ReviewKernel::new(
        review_adapter,
        planner_adapter,
        review_provider,
        planner_provider,
        trace_id,
    );
    kernel.run(&request, &diff_ctx, &events, approver.as_ref()).await
}
