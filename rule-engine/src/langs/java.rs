//! Java rules: Spring annotations, layered-architecture paths, metrics.

use crate::adjusters::ConfidenceAdjusters;
use crate::types::{RuleContextLevel, RuleSuggestion, RuleUnit};

use super::{
    MetricRule, PathRule, PatternRule, Risk, SymbolRule, match_keywords, match_metric_rules,
    match_path_rules, match_patterns, match_symbol_rules,
};

const SPRING_PATTERNS: &[PatternRule] = &[
    PatternRule {
        name: "transactional",
        patterns: &[r"@Transactional\b"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "java:spring:transactional",
    },
    PatternRule {
        name: "request_mapping",
        patterns: &[
            r"@RequestMapping\b",
            r"@GetMapping\b",
            r"@PostMapping\b",
            r"@PutMapping\b",
            r"@DeleteMapping\b",
        ],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "java:spring:mapping",
    },
    PatternRule {
        name: "dependency_injection",
        patterns: &[r"@Autowired\b", r"@Inject\b", r"@Resource\b"],
        risk: Risk::Medium,
        level: RuleContextLevel::Function,
        notes: "java:spring:injection",
    },
    PatternRule {
        name: "security_annotations",
        patterns: &[r"@PreAuthorize\b", r"@Secured\b", r"@RolesAllowed\b"],
        risk: Risk::High,
        level: RuleContextLevel::FileContext,
        notes: "java:spring:security",
    },
    PatternRule {
        name: "synchronized_blocks",
        patterns: &[r"\bsynchronized\s*[({]", r"\bvolatile\s+\w+"],
        risk: Risk::High,
        level: RuleContextLevel::Function,
        notes: "java:concurrency",
    },
];

const PATH_RULES: &[PathRule] = &[
    PathRule {
        needles: &["controller/", "controllers/", "rest/", "web/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.76,
        notes: "java:spring:controller",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["service/", "services/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.74,
        notes: "java:spring:service",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["repository/", "dao/"],
        level: RuleContextLevel::Function,
        base_confidence: 0.76,
        notes: "java:spring:repository",
        extra: None,
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["migration/", "migrations/", "flyway/", "liquibase/"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.8,
        notes: "java:migration",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    PathRule {
        needles: &["application.yml", "application.yaml", "application.properties"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.78,
        notes: "java:spring:config",
        extra: Some("search_config_usage"),
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const SYMBOL_RULES: &[SymbolRule] = &[
    SymbolRule {
        kinds: &["class"],
        name_needles: &["controller", "resource"],
        level: RuleContextLevel::FileContext,
        base_confidence: 0.75,
        notes: "java:symbol:controller",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    SymbolRule {
        kinds: &["function", "method"],
        name_needles: &["test"],
        level: RuleContextLevel::Function,
        base_confidence: 0.68,
        notes: "java:symbol:test",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const METRIC_RULES: &[MetricRule] = &[
    MetricRule {
        min_changed: 120,
        max_changed: u32::MAX,
        level: RuleContextLevel::FileContext,
        base_confidence: 0.72,
        notes: "java:metric:large",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
    MetricRule {
        min_changed: 40,
        max_changed: 119,
        level: RuleContextLevel::Function,
        base_confidence: 0.68,
        notes: "java:metric:medium",
        adjusters: ConfidenceAdjusters::LANG_RULE,
    },
];

const KEYWORDS: &[&str] = &["jpa", "hibernate", "kafka", "feign", "servlet"];

pub(crate) fn match_unit(unit: &RuleUnit) -> Option<RuleSuggestion> {
    match_patterns(SPRING_PATTERNS, 0.68, "java:pattern:", unit)
        .or_else(|| match_path_rules(PATH_RULES, unit))
        .or_else(|| match_symbol_rules(SYMBOL_RULES, unit))
        .or_else(|| match_metric_rules(METRIC_RULES, unit))
        .or_else(|| match_keywords(KEYWORDS, "java:kw:", unit))
}
