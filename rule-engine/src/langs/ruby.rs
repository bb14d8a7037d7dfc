//! Ruby rules: Rails callbacks, conventional paths, metrics.

use crate::adjusters::ConfidenceAdjusters;
use crate::types::{RuleContextLevel, RuleSuggestion, RuleUnit};

use super::{
    MetricRule, PathRule, PatternRule, Risk, match_keywords, match_metric_rules, match_path_rules,
    match_patterns,
};

const RAILS_PATTERNS: &[PatternRule] = &[
    PatternRule {
        name: "callbacks",
        patterns: &[
            r"\bbefore_action\b",
            r"\bafter_action\b",
            r"\bbefore_save\b",
            r"\bafter_save\b",
            r"\bbefore_validation\b",
            r"\bafter_commit\b",
        ],
        risk: Risk::High,
        level: RuleContextLevel::FileContext,
        notes: "ruby:rails:callbacks",
    },
    PatternRule {
        name: "validations",
        patterns: &[r"\bvalidates\b", r"\bvalidate\s+:"],
        risk: Risk::Medium,
        level: RuleContextLevel::Function,
        notes: "ruby:rails:validations",
    },
    PatternRule {
        name: "associations",
        patterns: &[r"\bhas_many\b", r"\bbelongs_to\b", r"\bhas_one\b"],
        risk: Risk::Medium,
        level: RuleContextLevel::FileContext,
        notes: "ruby:rails:associations",
    },
    PatternRule {
        name: "raw_sql",
        patterns: &[r"\bfind_by_sql\b", r"\bexecute\s*\(", r"\bsanitize_sql\b"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "ruby:rails:raw_sql",
    },
];

const PATH_RULES: &[PathRule] = &[
    PathRule {
        needles: &["app/controllers/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.76,
        notes: "ruby:rails:controller",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["app/models/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.74,
        notes: "ruby:rails:model",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["db/migrate/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.8,
        notes: "ruby:rails:migration",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["config/routes.rb"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "ruby:rails:routes",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["spec/", "_spec.rb"],
        level: RuleContextLevel::Function,
        base_confidence: 0.65,
        notes: "ruby:spec",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const METRIC_RULES: &[MetricRule] = &[
    MetricRule {
        min_changed: 80,
        max_changed: u32::MAX,
        level: RuleContextLevel::FileContext,
        base_confidence: 0.72,
        notes: "ruby:metric:large",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    MetricRule {
        min_changed: 25,
        max_changed: 79,
        level: RuleContextLevel::Function,
        base_confidence: 0.68,
        notes: "ruby:metric:medium",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const KEYWORDS: &[&str] = &["sidekiq", "activerecord", "devise", "rake"];

pub(crate) fn match_unit(unit: &RuleUnit) -> Option<RuleSuggestion> {
    match_patterns(RAILS_PATTERNS, 0.66, "ruby:pattern:", unit)
        .or_else(|| match_path_rules(PATH_RULES, unit))
        .or_else(|| match_metric_rules(METRIC_RULES, unit))
        .or_else(|| match_keywords(KEYWORDS, "ruby:kw:", unit))
}
