pub mod intent;
pub mod planner;
pub mod reviewer;

pub use intent::{IntentAgent, IntentCacheRecord, intent_summary};
pub use planner::PlanningAgent;
pub use reviewer::{CodeReviewAgent, ToolApprover};
