//! Named confidence adjusters.
//!
//! `confidence = clamp(base + Σ applicable adjusters, 0, 1)`. Each adjuster
//! is a named category so a suggestion's confidence can be audited back to
//! its contributions.

use crate::config::defaults::FILE_SIZE_ADJUSTER_LINES;
use crate::types::{ChangeKind, RuleUnit};

/// Per-rule adjuster weights. A weight contributes only when its condition
/// holds for the unit; `rule_specificity` and `language_specificity_bonus`
/// are properties of the rule itself and always apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceAdjusters {
    /// Applies when the unit changes at least `FILE_SIZE_ADJUSTER_LINES`.
    pub file_size: f64,
    /// Applies to newly added files.
    pub change_type: f64,
    /// Applies when the unit carries the `security_sensitive` tag.
    pub security_sensitive: f64,
    pub rule_specificity: f64,
    pub language_specificity_bonus: f64,
}

impl ConfidenceAdjusters {
    pub const NONE: Self = Self {
        file_size: 0.0,
        change_type: 0.0,
        security_sensitive: 0.0,
        rule_specificity: 0.0,
        language_specificity_bonus: 0.0,
    };

    /// Standard weights for language-specific rules.
    pub const LANG_RULE: Self = Self {
        file_size: 0.0,
        change_type: 0.0,
        security_sensitive: 0.05,
        rule_specificity: 0.1,
        language_specificity_bonus: 0.1,
    };

    pub fn compose(&self, base_confidence: f64, unit: &RuleUnit) -> f64 {
        let mut confidence = base_confidence;
        confidence += self.rule_specificity;
        confidence += self.language_specificity_bonus;
        if unit.metrics.total_changed() >= FILE_SIZE_ADJUSTER_LINES {
            confidence += self.file_size;
        }
        if unit.change_type == ChangeKind::Add {
            confidence += self.change_type;
        }
        if unit.has_tag("security_sensitive") {
            confidence += self.security_sensitive;
        }
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleMetrics;

    fn unit(added: u32, tags: &[&str]) -> RuleUnit {
        RuleUnit {
            file_path: "src/lib.rs".into(),
            language: "rust".into(),
            change_type: ChangeKind::Modify,
            metrics: RuleMetrics {
                added_lines: added,
                removed_lines: 0,
                hunk_count: 1,
            },
            tags: tags.iter().map(|t| t.to_string()).collect(),
            symbol: None,
            diff_content: None,
        }
    }

    #[test]
    fn conditional_adjusters_only_apply_when_triggered() {
        let adjusters = ConfidenceAdjusters {
            file_size: 0.1,
            security_sensitive: 0.05,
            ..ConfidenceAdjusters::NONE
        };
        assert_eq!(adjusters.compose(0.5, &unit(2, &[])), 0.5);
        assert_eq!(adjusters.compose(0.5, &unit(60, &[])), 0.6);
        let sensitive = unit(60, &["security_sensitive"]);
        assert!((adjusters.compose(0.5, &sensitive) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let adjusters = ConfidenceAdjusters {
            rule_specificity: 0.3,
            language_specificity_bonus: 0.3,
            ..ConfidenceAdjusters::NONE
        };
        assert_eq!(adjusters.compose(0.9, &unit(1, &[])), 1.0);
        assert_eq!(adjusters.compose(-0.9, &unit(1, &[])), 0.0);
    }
}
