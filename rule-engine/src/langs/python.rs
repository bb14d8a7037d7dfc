//! Python rules: framework paths, symbols, metrics, keywords.

use crate::adjusters::ConfidenceAdjusters;
use crate::types::{RuleContextLevel, RuleSuggestion, RuleUnit};

use super::{
    MetricRule, PathRule, SymbolRule, match_keywords, match_metric_rules, match_path_rules,
    match_symbol_rules,
};

const PATH_RULES: &[PathRule] = &[
    PathRule {
        needles: &["views.py", "api/", "apis/", "endpoints/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.74,
        notes: "python:web:view",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["urls.py", "routers/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.76,
        notes: "python:web:routing",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["migrations/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "python:migration",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["models.py", "models/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.74,
        notes: "python:model",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["test_", "_test.py", "conftest.py"],
        level: RuleContextLevel::Function,
        base_confidence: 0.65,
        notes: "python:test",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const SYMBOL_RULES: &[SymbolRule] = &[
    SymbolRule {
        kinds: &["function", "method"],
        name_needles: &["test_"],
        level: RuleContextLevel::Function,
        base_confidence: 0.66,
        notes: "python:symbol:test",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    SymbolRule {
        kinds: &["function"],
        name_needles: &["main"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.7,
        notes: "python:symbol:main",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const METRIC_RULES: &[MetricRule] = &[
    MetricRule {
        min_changed: 80,
        max_changed: u32::MAX,
        level: RuleContextLevel::FileContext,
        base_confidence: 0.72,
        notes: "python:metric:large",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    MetricRule {
        min_changed: 25,
        max_changed: 79,
        level: RuleContextLevel::Function,
        base_confidence: 0.68,
        notes: "python:metric:medium",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const KEYWORDS: &[&str] = &["celery", "django", "fastapi", "sqlalchemy", "asyncio"];

pub(crate) fn match_unit(unit: &RuleUnit) -> Option<RuleSuggestion> {
    match_path_rules(PATH_RULES, unit)
        .or_else(|| match_symbol_rules(SYMBOL_RULES, unit))
        .or_else(|| match_metric_rules(METRIC_RULES, unit))
        .or_else(|| match_keywords(KEYWORDS, "python:kw:", unit))
}
