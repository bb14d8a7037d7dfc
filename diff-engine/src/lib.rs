//! Diff perception for the review pipeline.
//!
//! Single high-level entry: [`collect_diff_context`].
//!
//! 1) **Diff acquisition** — resolve the diff mode (staged > working > PR
//!    for `auto`), run the matching git plumbing command with rename
//!    detection, bounded by `GIT_COMMAND_TIMEOUT`.
//! 2) **Unit construction** — parse the unified diff, read post-image
//!    files tolerantly, derive snippets/line numbers/tags/symbols, expand
//!    context via the Python AST where available, merge clustered hunks.
//! 3) **Rule layer** — attach `(context_level, confidence, notes)` plus a
//!    deterministic fallback decision to every unit.
//! 4) **Indexing** — build the full [`index::ReviewIndex`] and expose the
//!    planner projection and the markdown overview.
//!
//! Uses `tracing` for debug logging and enum dispatch throughout; errors
//! unify under [`errors::Error`].

pub mod analysis;
pub mod ast;
pub mod errors;
pub mod git;
pub mod index;
pub mod language;
pub mod parser;
pub mod snippets;
pub mod units;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

pub use errors::{DiffResult, Error, GitError};
pub use git::DiffMode;
pub use index::{PlannerIndex, ReviewIndex};
pub use language::Language;
pub use units::{ChangeType, ReviewUnit};

/// How to obtain the diff.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub mode: DiffMode,
    /// Base branch override for PR mode.
    pub base_branch: Option<String>,
    /// Left endpoint for commit mode (required there).
    pub commit_from: Option<String>,
    /// Right endpoint for commit mode; `HEAD` when omitted.
    pub commit_to: Option<String>,
    /// Diff from `merge-base(from, to)` instead of `from` directly.
    pub use_merge_base: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            mode: DiffMode::Auto,
            base_branch: None,
            commit_from: None,
            commit_to: None,
            use_merge_base: true,
        }
    }
}

/// Structured representation of the collected diff.
#[derive(Debug, Clone)]
pub struct DiffContext {
    /// One-line overview for logs and prompts.
    pub summary: String,
    /// Sorted unique changed file paths.
    pub files: Vec<String>,
    pub units: Vec<ReviewUnit>,
    pub mode: DiffMode,
    pub base_branch: Option<String>,
    pub review_index: ReviewIndex,
    /// Repository root the diff was taken in.
    pub cwd: PathBuf,
}

/// Collect the diff and build units + review index for the session.
pub async fn collect_diff_context(opts: &DiffOptions, cwd: &Path) -> DiffResult<DiffContext> {
    let (diff_text, actual_mode, base_branch) = match opts.mode {
        DiffMode::Commit => {
            let commit_from = opts.commit_from.as_deref().ok_or_else(|| {
                Error::Validation("commit mode requires commit_from".to_string())
            })?;
            let text = git::commit_diff(
                commit_from,
                opts.commit_to.as_deref(),
                opts.use_merge_base,
                cwd,
            )
            .await?;
            (text, DiffMode::Commit, Some(commit_from.to_string()))
        }
        mode => git::diff_text(mode, opts.base_branch.as_deref(), cwd).await?,
    };

    if diff_text.trim().is_empty() {
        return Err(GitError::NoChanges(actual_mode.as_str().to_string()).into());
    }

    let patch = parser::parse_unified_diff(&diff_text);
    debug!(files = patch.len(), mode = actual_mode.as_str(), "diff parsed");

    let units = units::build_review_units(&patch, cwd, true, true);
    if units.is_empty() {
        return Err(Error::Validation(
            "diff detected but no review units were produced".to_string(),
        ));
    }

    let review_index = index::build_review_index(&units, actual_mode, base_branch.as_deref());

    let files: Vec<String> = review_index.summary.files_changed.clone();
    let preview = files
        .iter()
        .take(5)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let summary = format!(
        "mode={}, base={}, files={}, units={}, lines=+{}/-{}; changed_files=[{}{}]",
        actual_mode.as_str(),
        base_branch.as_deref().unwrap_or("-"),
        review_index.review_metadata.total_files,
        review_index.review_metadata.total_changes,
        review_index.summary.total_lines.added,
        review_index.summary.total_lines.removed,
        preview,
        if files.len() > 5 {
            format!(", ... (+{})", files.len() - 5)
        } else {
            String::new()
        },
    );

    info!(
        mode = actual_mode.as_str(),
        files = files.len(),
        units = units.len(),
        "diff context collected"
    );

    Ok(DiffContext {
        summary,
        files,
        units,
        mode: actual_mode,
        base_branch,
        review_index,
        cwd: cwd.to_path_buf(),
    })
}

/// Planner projection for an already-collected context.
pub fn planner_index(ctx: &DiffContext) -> PlannerIndex {
    index::build_planner_index(&ctx.units, ctx.mode, ctx.base_branch.as_deref())
}

/// Markdown overview for the reviewer prompt.
pub fn markdown_context(ctx: &DiffContext) -> String {
    index::build_markdown_context(&ctx.review_index, &ctx.units)
}
