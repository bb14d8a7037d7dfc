//! Deterministic decision derived from a rule suggestion.
//!
//! Used as the scheduler's anchor when the planner is disabled or failed.

use crate::types::{
    AgentDecision, FocusKind, Priority, RuleContextLevel, RuleSuggestion, RuleUnit,
};

/// Map a suggestion to concrete window/focus/priority hints.
pub fn build_decision_from_rules(unit: &RuleUnit, suggestion: &RuleSuggestion) -> AgentDecision {
    let total_changed = unit.metrics.total_changed();

    let (before_lines, after_lines, mut focus, priority) = match suggestion.context_level {
        RuleContextLevel::DiffOnly => (
            5,
            5,
            vec![FocusKind::Style, FocusKind::Logic],
            if total_changed <= 2 {
                Priority::Low
            } else {
                Priority::Medium
            },
        ),
        RuleContextLevel::Function => (
            8,
            8,
            vec![FocusKind::Logic, FocusKind::Security],
            Priority::Medium,
        ),
        RuleContextLevel::FileContext => (
            10,
            10,
            vec![FocusKind::Logic, FocusKind::Security, FocusKind::Performance],
            Priority::High,
        ),
    };

    if unit.has_tag("security_sensitive") && !focus.contains(&FocusKind::Security) {
        focus.push(FocusKind::Security);
    }

    AgentDecision {
        context_level: suggestion.context_level,
        before_lines,
        after_lines,
        focus,
        priority,
        reason: format!("decision from rules ({})", suggestion.notes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, RuleMetrics, RuleUnit};

    fn unit() -> RuleUnit {
        RuleUnit {
            file_path: "src/app.py".into(),
            language: "python".into(),
            change_type: ChangeKind::Modify,
            metrics: RuleMetrics {
                added_lines: 1,
                removed_lines: 1,
                hunk_count: 1,
            },
            tags: Vec::new(),
            symbol: None,
            diff_content: None,
        }
    }

    #[test]
    fn diff_only_small_change_is_low_priority() {
        let suggestion =
            RuleSuggestion::new(RuleContextLevel::DiffOnly, 0.9, "base:small_safe_change");
        let decision = build_decision_from_rules(&unit(), &suggestion);
        assert_eq!(decision.priority, Priority::Low);
        assert_eq!(decision.before_lines, 5);
        assert!(decision.reason.contains("small_safe_change"));
    }

    #[test]
    fn file_context_is_high_priority_with_performance_focus() {
        let suggestion = RuleSuggestion::new(RuleContextLevel::FileContext, 0.92, "go:config");
        let decision = build_decision_from_rules(&unit(), &suggestion);
        assert_eq!(decision.priority, Priority::High);
        assert!(decision.focus.contains(&FocusKind::Performance));
    }
}
