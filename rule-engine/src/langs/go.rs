//! Go rules: concurrency patterns, framework paths, metrics, keywords.

use crate::adjusters::ConfidenceAdjusters;
use crate::types::{RuleContextLevel, RuleSuggestion, RuleUnit};

use super::{
    MetricRule, PathRule, PatternRule, Risk, match_keywords, match_metric_rules, match_path_rules,
    match_patterns,
};

/// Concurrency constructs warrant function-level context: a goroutine or
/// channel misuse rarely shows in the diff lines alone.
const CONCURRENCY_PATTERNS: &[PatternRule] = &[
    PatternRule {
        name: "goroutine_spawn",
        patterns: &[r"\bgo\s+func\b", r"\bgo\s+\w+\("],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "go:concurrency:goroutine",
    },
    PatternRule {
        name: "channel_ops",
        patterns: &[r"\bmake\s*\(\s*chan\b", r"\bchan\s+\w+", r"<-\s*\w+"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "go:concurrency:channel",
    },
    PatternRule {
        name: "select_statement",
        patterns: &[r"\bselect\s*\{"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "go:concurrency:select",
    },
    PatternRule {
        name: "sync_primitives",
        patterns: &[
            r"\bsync\.Mutex\b",
            r"\bsync\.RWMutex\b",
            r"\bsync\.WaitGroup\b",
            r"\.Lock\(\)",
            r"\.Unlock\(\)",
        ],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "go:concurrency:sync",
    },
    PatternRule {
        name: "atomic_ops",
        patterns: &[r"\batomic\.\w+"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "go:concurrency:atomic",
    },
    PatternRule {
        name: "context_usage",
        patterns: &[
            r"\bcontext\.Context\b",
            r"\bcontext\.WithCancel\b",
            r"\bcontext\.WithTimeout\b",
        ],
        risk: Risk::Medium,
        level: RuleContextLevel::Function,
        notes: "go:concurrency:context",
    },
];

const PATH_RULES: &[PathRule] = &[
    PathRule {
        needles: &["handlers/", "handler/", "controllers/", "controller/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.78,
        notes: "go:gin:handler",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["routes/", "router/", "routers/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "go:gin:routes",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["middleware/", "middlewares/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.75,
        notes: "go:gin:middleware",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["cmd/", "main.go"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.75,
        notes: "go:cmd:main",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["repository/", "repositories/", "repo/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.78,
        notes: "go:repository",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["proto/", "pb/", ".pb.go"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.8,
        notes: "go:grpc:proto",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["_test.go"],
        level: RuleContextLevel::Function,
        base_confidence: 0.65,
        notes: "go:test",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["config/", "configs/", "config.go"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "go:config",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const METRIC_RULES: &[MetricRule] = &[
    MetricRule {
        min_changed: 100,
        max_changed: u32::MAX,
        level: RuleContextLevel::FileContext,
        base_confidence: 0.72,
        notes: "go:metric:large",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    MetricRule {
        min_changed: 30,
        max_changed: 99,
        level: RuleContextLevel::Function,
        base_confidence: 0.68,
        notes: "go:metric:medium",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const KEYWORDS: &[&str] = &["goroutine", "grpc", "migration", "sqlx", "gorm"];

pub(crate) fn match_unit(unit: &RuleUnit) -> Option<RuleSuggestion> {
    match_patterns(CONCURRENCY_PATTERNS, 0.68, "go:concurrency:", unit)
        .or_else(|| match_path_rules(PATH_RULES, unit))
        .or_else(|| match_metric_rules(METRIC_RULES, unit))
        .or_else(|| match_keywords(KEYWORDS, "go:kw:", unit))
}
