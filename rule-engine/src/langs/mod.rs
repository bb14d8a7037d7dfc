//! Language-specific rule handlers.
//!
//! Each language module exposes a `match_unit` applying its tiers in order:
//! code patterns, framework path rules, symbol rules, metric rules, keyword
//! rules. A handler returns `None` when nothing matched so the generic tiers
//! in [`crate::build_rule_suggestion`] can take over.

pub mod go;
pub mod java;
pub mod python;
pub mod ruby;
pub mod typescript;

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;

use crate::adjusters::ConfidenceAdjusters;
use crate::config::SECURITY_KEYWORDS;
use crate::types::{ExtraRequestSpec, RuleContextLevel, RuleSuggestion, RuleUnit};

/// Path rule: first matching needle wins.
pub(crate) struct PathRule {
    pub needles: &'static [&'static str],
    pub level: RuleContextLevel,
    pub base_confidence: f64,
    pub notes: &'static str,
    pub extra: Option<&'static str>,
    pub adjusters: ConfidenceAdjusters,
}

/// Symbol rule: matches on symbol kind and name fragments.
pub(crate) struct SymbolRule {
    pub kinds: &'static [&'static str],
    pub name_needles: &'static [&'static str],
    pub level: RuleContextLevel,
    pub base_confidence: f64,
    pub notes: &'static str,
    pub adjusters: ConfidenceAdjusters,
}

/// Metric rule: matches on total changed lines (inclusive bucket).
pub(crate) struct MetricRule {
    pub min_changed: u32,
    pub max_changed: u32,
    pub level: RuleContextLevel,
    pub base_confidence: f64,
    pub notes: &'static str,
    pub adjusters: ConfidenceAdjusters,
}

/// Risk attached to a code pattern; higher risk wins ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Risk {
    Low,
    Medium,
    High,
}

/// Code-pattern rule scanned over the unit's diff text.
pub(crate) struct PatternRule {
    pub name: &'static str,
    pub patterns: &'static [&'static str],
    pub risk: Risk,
    pub level: RuleContextLevel,
    pub notes: &'static str,
}

/// Rule regexes are static strings; compile each once, process-wide.
fn cached_regex(pattern: &'static str) -> Option<Regex> {
    static CACHE: OnceLock<Mutex<HashMap<&'static str, Option<Regex>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().unwrap_or_else(|p| p.into_inner());
    cache
        .entry(pattern)
        .or_insert_with(|| Regex::new(pattern).ok())
        .clone()
}

pub(crate) fn match_path_rules(
    rules: &[PathRule],
    unit: &RuleUnit,
) -> Option<RuleSuggestion> {
    let path = unit.file_path.to_lowercase();
    for rule in rules {
        if rule.needles.iter().any(|needle| path.contains(needle)) {
            let mut suggestion = RuleSuggestion::new(
                rule.level,
                rule.adjusters.compose(rule.base_confidence, unit),
                rule.notes,
            );
            if let Some(extra) = rule.extra {
                suggestion = suggestion.with_extra(ExtraRequestSpec::new(extra));
            }
            return Some(suggestion);
        }
    }
    None
}

pub(crate) fn match_symbol_rules(
    rules: &[SymbolRule],
    unit: &RuleUnit,
) -> Option<RuleSuggestion> {
    let symbol = unit.symbol.as_ref()?;
    let name = symbol.name.to_lowercase();
    for rule in rules {
        let kind_ok = rule.kinds.is_empty() || rule.kinds.contains(&symbol.kind.as_str());
        let name_ok = rule.name_needles.iter().any(|needle| name.contains(needle));
        if kind_ok && name_ok {
            return Some(RuleSuggestion::new(
                rule.level,
                rule.adjusters.compose(rule.base_confidence, unit),
                rule.notes,
            ));
        }
    }
    None
}

pub(crate) fn match_metric_rules(
    rules: &[MetricRule],
    unit: &RuleUnit,
) -> Option<RuleSuggestion> {
    let total = unit.metrics.total_changed();
    for rule in rules {
        if total >= rule.min_changed && total <= rule.max_changed {
            return Some(RuleSuggestion::new(
                rule.level,
                rule.adjusters.compose(rule.base_confidence, unit),
                rule.notes,
            ));
        }
    }
    None
}

/// Last-resort substring match over `path ⊕ symbol_name ⊕ tags` using the
/// language keyword list plus the base security keywords.
pub(crate) fn match_keywords(
    lang_keywords: &[&str],
    note_prefix: &str,
    unit: &RuleUnit,
) -> Option<RuleSuggestion> {
    let haystack = build_haystack(unit);
    let hit = lang_keywords
        .iter()
        .chain(SECURITY_KEYWORDS.iter())
        .find(|keyword| haystack.contains(*keyword))?;

    let adjusters = ConfidenceAdjusters {
        security_sensitive: 0.08,
        rule_specificity: 0.02,
        ..ConfidenceAdjusters::NONE
    };
    let mut suggestion = RuleSuggestion::new(
        RuleContextLevel::Function,
        adjusters.compose(0.82, unit),
        format!("{note_prefix}{hit}"),
    );
    if unit.has_tag("config_file") || unit.has_tag("routing_file") {
        suggestion = suggestion.with_extra(ExtraRequestSpec::new("search_config_usage"));
    }
    Some(suggestion)
}

fn build_haystack(unit: &RuleUnit) -> String {
    let mut haystack = unit.file_path.to_lowercase();
    if let Some(symbol) = &unit.symbol {
        haystack.push(' ');
        haystack.push_str(&symbol.name.to_lowercase());
    }
    for tag in &unit.tags {
        haystack.push(' ');
        haystack.push_str(tag);
    }
    haystack
}

/// Scan diff content against the pattern table; the riskiest hit wins and
/// matched pattern names are folded into the notes.
pub(crate) fn match_patterns(
    rules: &[PatternRule],
    base_confidence: f64,
    note_prefix: &str,
    unit: &RuleUnit,
) -> Option<RuleSuggestion> {
    let content = unit.diff_content.as_deref()?;
    let mut matched: Vec<&PatternRule> = rules
        .iter()
        .filter(|rule| {
            rule.patterns
                .iter()
                .any(|p| cached_regex(p).is_some_and(|re| re.is_match(content)))
        })
        .collect();
    if matched.is_empty() {
        return None;
    }
    matched.sort_by(|a, b| b.risk.cmp(&a.risk));
    let top = matched[0];

    let notes = if matched.len() == 1 {
        top.notes.to_string()
    } else {
        let names: Vec<&str> = matched.iter().map(|m| m.name).collect();
        format!("{note_prefix}{}", names.join(","))
    };
    Some(RuleSuggestion::new(
        top.level,
        ConfidenceAdjusters::LANG_RULE.compose(base_confidence, unit),
        notes,
    ))
}
