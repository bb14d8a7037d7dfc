//! Fusion + context scheduling for the review pipeline.
//!
//! Two stages live here:
//! - [`fusion::fuse_plan`] — deterministic merge of the rule layer's
//!   suggestion with the planner's proposal (pure, no I/O),
//! - [`scheduler::build_context_bundle`] — executes the fused plan against
//!   the repository: file slices, AST function extraction, `git show`
//!   previous versions, ripgrep caller search, all under per-field budgets.

pub mod config;
pub mod fusion;
pub mod scheduler;
pub mod types;

pub use config::ContextConfig;
pub use fusion::fuse_plan;
pub use scheduler::build_context_bundle;
pub use types::{
    BundleMeta, CallerHit, ContextBundleEntry, ContextPlan, ExtraRequest, FinalContextLevel,
    FusedPlan, FusedPlanItem, PlanItem,
};
