//! TypeScript/JavaScript rules: React hooks, framework paths, metrics.
//!
//! Also serves plain JavaScript; the registry routes both languages here.

use crate::adjusters::ConfidenceAdjusters;
use crate::types::{RuleContextLevel, RuleSuggestion, RuleUnit};

use super::{
    MetricRule, PathRule, PatternRule, Risk, match_keywords, match_metric_rules, match_path_rules,
    match_patterns,
};

const HOOK_PATTERNS: &[PatternRule] = &[
    PatternRule {
        name: "effect_hooks",
        patterns: &[r"\buseEffect\b", r"\buseLayoutEffect\b"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "ts:hook:effect",
    },
    PatternRule {
        name: "data_fetching_hooks",
        patterns: &[r"\buseQuery\b", r"\buseMutation\b", r"\buseSWR\b"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "ts:hook:query",
    },
    PatternRule {
        name: "state_hooks",
        patterns: &[r"\buseState\b", r"\buseReducer\b", r"\buseContext\b"],
        risk: Risk::Medium,
        level: RuleContextLevel::Function,
        notes: "ts:hook:state",
    },
    PatternRule {
        name: "memo_hooks",
        patterns: &[r"\buseMemo\b", r"\buseCallback\b", r"\buseRef\b"],
        risk: Risk::Low,
        level: RuleContextLevel::Function,
        notes: "ts:hook:memo",
    },
    PatternRule {
        name: "custom_hooks",
        patterns: &[r"\buse[A-Z][a-zA-Z]*\b"],
        risk: Risk::Medium,
        level: RuleContextLevel::Function,
        notes: "ts:hook:custom",
    },
];

const PATH_RULES: &[PathRule] = &[
    PathRule {
        needles: &["pages/api/", "app/api/", "routes/", "router/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "ts:next:api_route",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["middleware.ts", "middleware.js"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "ts:next:middleware",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["components/", "hooks/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.72,
        notes: "ts:react:component",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["prisma/schema.prisma", "prisma/migrations/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.8,
        notes: "ts:prisma:schema",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &[".test.", ".spec.", "__tests__/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.65,
        notes: "ts:test",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["tsconfig.json", "package.json", "next.config"],
        level: RuleContextLevel::DiffOnly,
        base_confidence: 0.72,
        notes: "ts:config",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const METRIC_RULES: &[MetricRule] = &[
    MetricRule {
        min_changed: 90,
        max_changed: u32::MAX,
        level: RuleContextLevel::FileContext,
        base_confidence: 0.72,
        notes: "ts:metric:large",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    MetricRule {
        min_changed: 30,
        max_changed: 89,
        level: RuleContextLevel::Function,
        base_confidence: 0.68,
        notes: "ts:metric:medium",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const KEYWORDS: &[&str] = &["redux", "graphql", "websocket", "axios", "fetch"];

pub(crate) fn match_unit(unit: &RuleUnit) -> Option<RuleSuggestion> {
    match_patterns(HOOK_PATTERNS, 0.66, "ts:hooks:", unit)
        .or_else(|| match_path_rules(PATH_RULES, unit))
        .or_else(|| match_metric_rules(METRIC_RULES, unit))
        .or_else(|| match_keywords(KEYWORDS, "ts:kw:", unit))
}
