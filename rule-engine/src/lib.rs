//! Deterministic rule layer for the review pipeline.
//!
//! Cheap first guess of how deep the reviewer should look at a change, so
//! the planner has an anchor and the pipeline still works when the planner
//! is skipped or fails. Pure function of the unit: no I/O, no clock, no
//! randomness.
//!
//! Tier order (first hit wins):
//! 1. Documentation / pure-noise / tiny changes
//! 2. Language-specific handler (patterns, framework paths, symbols,
//!    metrics, keywords)
//! 3. Generic symbol rules
//! 4. Small config/routing changes
//! 5. Large changes
//! 6. Security-sensitive changes
//! 7. Medium changes confined to one function
//! 8. `default_fallback` — always `function`, never `unknown`

pub mod adjusters;
pub mod config;
pub mod decision;
mod langs;
pub mod registry;
pub mod types;

pub use decision::build_decision_from_rules;
pub use types::{
    AgentDecision, ChangeKind, ExtraRequestSpec, FocusKind, Priority, RuleContextLevel,
    RuleMetrics, RuleSuggestion, RuleSymbol, RuleUnit,
};

use config::defaults;
use config::{CONFIG_KEYWORDS, DOC_TAGS, NOISE_TAGS, SECURITY_KEYWORDS};
use types::RuleContextLevel as Level;

/// Build the rule suggestion for one unit.
///
/// Total over all valid units: the returned level is always one of
/// `diff_only`/`function`/`file_context` and confidence lies in `[0, 1]`.
pub fn build_rule_suggestion(unit: &RuleUnit) -> RuleSuggestion {
    let total_changed = unit.metrics.total_changed();
    let lower_path = unit.file_path.to_lowercase();

    let is_noise = NOISE_TAGS.iter().any(|t| unit.has_tag(t));
    let is_doc = DOC_TAGS.iter().any(|t| unit.has_tag(t));
    let is_config_tagged = unit.has_tag("config_file") || unit.has_tag("routing_file");
    let is_security_tagged = unit.has_tag("security_sensitive");
    let is_sensitive_path = SECURITY_KEYWORDS.iter().any(|k| lower_path.contains(k));
    let is_config_path = CONFIG_KEYWORDS.iter().any(|k| lower_path.contains(k));

    // Documentation and pure-noise changes need no surrounding code.
    if is_doc {
        return RuleSuggestion::new(Level::DiffOnly, 0.9, "base:doc_file_light");
    }
    if total_changed <= 2 && is_noise && !is_sensitive_path {
        return RuleSuggestion::new(Level::DiffOnly, 0.9, "base:small_safe_change");
    }
    if is_noise && total_changed <= 6 && !is_sensitive_path {
        return RuleSuggestion::new(Level::DiffOnly, 0.88, "base:simple_change");
    }

    // Language handler hit wins over the remaining generic tiers.
    if let Some(handler) = registry::handler_for(&unit.language) {
        if let Some(suggestion) = handler.match_unit(unit) {
            return suggestion;
        }
    }

    if let Some(symbol) = &unit.symbol {
        let name = symbol.name.to_lowercase();
        if ["test", "spec", "unit"].iter().any(|p| name.contains(p)) {
            return RuleSuggestion::new(Level::Function, 0.8, "base:symbol_test_function");
        }
        if symbol.kind == "class"
            && ["controller", "service", "manager"]
                .iter()
                .any(|p| name.contains(p))
        {
            return RuleSuggestion::new(Level::FileContext, 0.85, "base:symbol_class_component");
        }
        if name == "main" {
            return RuleSuggestion::new(Level::FileContext, 0.9, "base:symbol_main_function");
        }
    }

    // Small config/routing tweaks: the diff is enough, but usage sites of
    // the touched key matter.
    if (is_config_tagged || is_config_path) && total_changed <= 8 && !is_security_tagged {
        return RuleSuggestion::new(Level::DiffOnly, 0.82, "base:small_config_or_routing")
            .with_extra(ExtraRequestSpec::new("search_config_usage"));
    }

    if total_changed >= defaults::LARGE_CHANGE_LINES {
        if is_config_tagged || is_config_path {
            return RuleSuggestion::new(Level::FileContext, 0.92, "base:large_change_config")
                .with_extra(ExtraRequestSpec::new("search_config_usage"));
        }
        return RuleSuggestion::new(Level::Function, 0.9, "base:large_change_function_scope");
    }

    if is_security_tagged || is_sensitive_path {
        let mut suggestion =
            RuleSuggestion::new(Level::Function, 0.95, "base:security_sensitive_change");
        if is_config_tagged {
            suggestion = suggestion.with_extra(ExtraRequestSpec::new("search_config_usage"));
        }
        return suggestion;
    }

    if unit.has_tag("in_single_function")
        && (3..=defaults::MODERATE_CHANGE_LINES).contains(&total_changed)
        && unit.metrics.hunk_count <= 2
    {
        return RuleSuggestion::new(Level::Function, 0.8, "base:medium_single_function_change");
    }

    RuleSuggestion::new(Level::Function, defaults::CONFIDENCE_DEFAULT, "default_fallback")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(path: &str, language: &str, added: u32, removed: u32, tags: &[&str]) -> RuleUnit {
        RuleUnit {
            file_path: path.into(),
            language: language.into(),
            change_type: ChangeKind::Modify,
            metrics: RuleMetrics {
                added_lines: added,
                removed_lines: removed,
                hunk_count: 1,
            },
            tags: tags.iter().map(|t| t.to_string()).collect(),
            symbol: None,
            diff_content: None,
        }
    }

    #[test]
    fn comment_only_change_is_diff_only_high_confidence() {
        let u = unit("foo.py", "python", 1, 1, &["only_comments"]);
        let suggestion = build_rule_suggestion(&u);
        assert_eq!(suggestion.context_level, RuleContextLevel::DiffOnly);
        assert!(suggestion.confidence >= 0.88);
    }

    #[test]
    fn security_config_change_requests_usage_search() {
        let u = unit(
            "config/auth/oauth.py",
            "python",
            2,
            2,
            &["config_file", "security_sensitive"],
        );
        let suggestion = build_rule_suggestion(&u);
        assert_eq!(suggestion.context_level, RuleContextLevel::Function);
        assert!(suggestion.confidence >= 0.8);
        assert!(
            suggestion
                .extra_requests
                .iter()
                .any(|e| e.kind == "search_config_usage")
        );
    }

    #[test]
    fn go_goroutine_pattern_elevates_to_function() {
        let mut u = unit("src/handler.go", "go", 60, 60, &[]);
        u.diff_content = Some("+\tgo func() {\n+\t\tch := make(chan int)\n".into());
        let suggestion = build_rule_suggestion(&u);
        assert_eq!(suggestion.context_level, RuleContextLevel::Function);
        assert!(suggestion.confidence >= 0.8);
        assert!(suggestion.notes.starts_with("go:concurrency:"));
    }

    #[test]
    fn large_change_prefers_function_scope() {
        let u = unit("src/engine.rs", "rust", 90, 30, &[]);
        let suggestion = build_rule_suggestion(&u);
        assert_eq!(suggestion.context_level, RuleContextLevel::Function);
        assert!((suggestion.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn fallback_is_function_with_default_confidence() {
        let u = unit("notes/whatever.xyz", "unknown", 3, 0, &[]);
        let suggestion = build_rule_suggestion(&u);
        assert_eq!(suggestion.context_level, RuleContextLevel::Function);
        assert!(suggestion.notes.ends_with("default_fallback"));
        assert!((0.30..=0.45).contains(&suggestion.confidence));
    }

    /// The rule layer is total: every sampled unit yields a valid level and
    /// a confidence inside the unit interval.
    #[test]
    fn suggestion_is_total_over_sampled_units() {
        let paths = [
            "a.py",
            "config/app.yaml",
            "src/auth/login.go",
            "app/models/user.rb",
            "web/components/Button.tsx",
            "README.md",
        ];
        let languages = ["python", "go", "ruby", "typescript", "java", "unknown"];
        let sizes = [0u32, 1, 5, 21, 79, 80, 500];
        let tag_sets: [&[&str]; 4] = [
            &[],
            &["only_imports"],
            &["security_sensitive", "config_file"],
            &["in_single_function"],
        ];

        for path in paths {
            for language in languages {
                for &size in &sizes {
                    for tags in tag_sets {
                        let u = unit(path, language, size, 0, tags);
                        let s = build_rule_suggestion(&u);
                        assert!((0.0..=1.0).contains(&s.confidence));
                        assert!(!s.notes.is_empty());
                    }
                }
            }
        }
    }

    /// Same unit, byte-identical suggestion.
    #[test]
    fn suggestion_is_deterministic() {
        let mut u = unit("src/handler.go", "go", 12, 4, &["in_single_function"]);
        u.diff_content = Some("+\tmu.Lock()\n+\tdefer mu.Unlock()\n".into());
        let first = serde_json::to_string(&build_rule_suggestion(&u)).unwrap();
        let second = serde_json::to_string(&build_rule_suggestion(&u)).unwrap();
        assert_eq!(first, second);
    }
}
