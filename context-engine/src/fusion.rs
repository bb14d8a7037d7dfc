//! Fusion of rule suggestions with the planner's proposal.
//!
//! Pure function; no I/O. The rule is authoritative when highly confident
//! (the planner may only upgrade it), the planner wins below that, and
//! `skip_review` never survives on high-risk units.

use std::collections::HashMap;

use tracing::debug;

use diff_engine::ReviewUnit;
use rule_engine::config::HIGH_RISK_TAGS;

use crate::types::{ContextPlan, ExtraRequest, FinalContextLevel, FusedPlan, FusedPlanItem, PlanItem};

/// Rule confidence at which the rule level dominates the planner.
const RULE_AUTHORITATIVE: f64 = 0.8;

/// Merge the rule layer's per-unit suggestion with the planner plan.
///
/// Unit order is preserved from the input slice; every unit produces
/// exactly one fused item.
pub fn fuse_plan(units: &[ReviewUnit], plan: &ContextPlan) -> FusedPlan {
    let by_id: HashMap<&str, &PlanItem> = plan
        .plan
        .iter()
        .map(|item| (item.unit_id.as_str(), item))
        .collect();

    let mut fused = Vec::with_capacity(units.len());
    for unit in units {
        let rule_level: FinalContextLevel = unit
            .rule_context_level
            .map(Into::into)
            .unwrap_or(FinalContextLevel::Function);
        let rule_confidence = unit.rule_confidence.unwrap_or(0.0);
        let planner_item = by_id.get(unit.unit_id.as_str()).copied();
        let planner_level = planner_item.and_then(|item| item.llm_context_level);

        let final_level = if rule_confidence >= RULE_AUTHORITATIVE {
            // Planner may only upgrade an authoritative rule.
            match planner_level {
                Some(level) if level.rank() > rule_level.rank() => level,
                _ => rule_level,
            }
        } else {
            // Below the authoritative threshold the planner's level wins
            // whenever present. The mid-confidence band (0.5..0.8) and the
            // weak band (<0.5) differ only in what the absence of a planner
            // level falls back to, and both fall back to the rule's level,
            // so a single branch covers them.
            planner_level.unwrap_or(rule_level)
        };

        let mut extra_requests: Vec<ExtraRequest> = Vec::new();
        for spec in &unit.rule_extra_requests {
            push_unique(&mut extra_requests, ExtraRequest {
                kind: spec.kind.clone(),
                details: spec.details.clone(),
                symbol: None,
                keyword: None,
            });
        }
        if let Some(item) = planner_item {
            for request in &item.extra_requests {
                push_unique(&mut extra_requests, request.clone());
            }
        }

        let high_risk = HIGH_RISK_TAGS.iter().any(|tag| unit.has_tag(tag));
        let skip_review = planner_item.is_some_and(|item| item.skip_review) && !high_risk;
        if high_risk && planner_item.is_some_and(|item| item.skip_review) {
            debug!(unit_id = %unit.unit_id, "planner skip overridden by high-risk tag");
        }

        let reason = planner_item
            .and_then(|item| item.reason.clone())
            .or_else(|| unit.rule_notes.clone())
            .unwrap_or_else(|| "default_fallback".to_string());

        fused.push(FusedPlanItem {
            unit_id: unit.unit_id.clone(),
            final_context_level: final_level,
            extra_requests,
            skip_review,
            reason,
        });
    }

    FusedPlan { plan: fused }
}

/// Union-merge by request type: the first request of a kind wins.
fn push_unique(requests: &mut Vec<ExtraRequest>, request: ExtraRequest) {
    if !requests.iter().any(|r| r.kind == request.kind) {
        requests.push(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diff_engine::parser::parse_unified_diff;
    use diff_engine::units::build_review_units;
    use rule_engine::RuleContextLevel;
    use std::path::Path;

    fn unit_with(
        rule_level: RuleContextLevel,
        confidence: f64,
        tags: &[&str],
    ) -> ReviewUnit {
        let diff = "diff --git a/x.py b/x.py\n--- a/x.py\n+++ b/x.py\n@@ -1,1 +1,1 @@\n-a\n+b";
        let files = parse_unified_diff(diff);
        let mut units = build_review_units(&files, Path::new("/nonexistent"), false, false);
        let mut unit = units.remove(0);
        unit.rule_context_level = Some(rule_level);
        unit.rule_confidence = Some(confidence);
        unit.rule_notes = Some("base:test".to_string());
        unit.tags = tags.iter().map(|t| t.to_string()).collect();
        unit
    }

    fn plan_for(unit: &ReviewUnit, level: Option<FinalContextLevel>, skip: bool) -> ContextPlan {
        ContextPlan {
            plan: vec![PlanItem {
                unit_id: unit.unit_id.clone(),
                llm_context_level: level,
                extra_requests: Vec::new(),
                skip_review: skip,
                reason: Some("planner".to_string()),
            }],
            error: None,
        }
    }

    #[test]
    fn authoritative_rule_wins_when_planner_silent() {
        let unit = unit_with(RuleContextLevel::FileContext, 0.9, &[]);
        let fused = fuse_plan(std::slice::from_ref(&unit), &ContextPlan::default());
        assert_eq!(fused.plan.len(), 1);
        assert_eq!(
            fused.plan[0].final_context_level,
            FinalContextLevel::FileContext
        );
    }

    #[test]
    fn planner_can_only_upgrade_an_authoritative_rule() {
        let unit = unit_with(RuleContextLevel::Function, 0.9, &[]);
        // Downgrade attempt is ignored.
        let fused = fuse_plan(
            std::slice::from_ref(&unit),
            &plan_for(&unit, Some(FinalContextLevel::DiffOnly), false),
        );
        assert_eq!(fused.plan[0].final_context_level, FinalContextLevel::Function);
        // Upgrade is accepted.
        let fused = fuse_plan(
            std::slice::from_ref(&unit),
            &plan_for(&unit, Some(FinalContextLevel::FullFile), false),
        );
        assert_eq!(fused.plan[0].final_context_level, FinalContextLevel::FullFile);
    }

    #[test]
    fn planner_wins_in_middle_confidence_band() {
        let unit = unit_with(RuleContextLevel::Function, 0.6, &[]);
        let fused = fuse_plan(
            std::slice::from_ref(&unit),
            &plan_for(&unit, Some(FinalContextLevel::DiffOnly), false),
        );
        assert_eq!(fused.plan[0].final_context_level, FinalContextLevel::DiffOnly);
    }

    #[test]
    fn skip_never_survives_high_risk_tags() {
        for tag in ["security_sensitive", "config_file", "routing_file"] {
            let unit = unit_with(RuleContextLevel::Function, 0.6, &[tag]);
            let fused = fuse_plan(std::slice::from_ref(&unit), &plan_for(&unit, None, true));
            assert!(!fused.plan[0].skip_review, "tag {tag} must suppress skip");
        }
        // Harmless unit: skip goes through.
        let unit = unit_with(RuleContextLevel::DiffOnly, 0.6, &["only_comments"]);
        let fused = fuse_plan(std::slice::from_ref(&unit), &plan_for(&unit, None, true));
        assert!(fused.plan[0].skip_review);
    }

    #[test]
    fn extra_requests_union_merge_by_type() {
        let mut unit = unit_with(RuleContextLevel::Function, 0.9, &[]);
        unit.rule_extra_requests = vec![rule_engine::ExtraRequestSpec::new("search_config_usage")];
        let mut plan = plan_for(&unit, None, false);
        plan.plan[0].extra_requests = vec![
            ExtraRequest::of_kind("search_config_usage"),
            ExtraRequest::of_kind("previous_version"),
        ];
        let fused = fuse_plan(std::slice::from_ref(&unit), &plan);
        let kinds: Vec<&str> = fused.plan[0]
            .extra_requests
            .iter()
            .map(|r| r.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["search_config_usage", "previous_version"]);
    }
}
