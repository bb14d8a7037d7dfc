//! Language → handler registry.
//!
//! Handlers are a closed set of variants sharing one capability
//! (`match_unit`); dispatch is enum-based, no trait objects.

use crate::langs;
use crate::types::{RuleSuggestion, RuleUnit};

/// Registered language handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangHandler {
    Go,
    Java,
    Python,
    Ruby,
    TypeScript,
}

impl LangHandler {
    pub fn match_unit(&self, unit: &RuleUnit) -> Option<RuleSuggestion> {
        match self {
            LangHandler::Go => langs::go::match_unit(unit),
            LangHandler::Java => langs::java::match_unit(unit),
            LangHandler::Python => langs::python::match_unit(unit),
            LangHandler::Ruby => langs::ruby::match_unit(unit),
            LangHandler::TypeScript => langs::typescript::match_unit(unit),
        }
    }
}

/// Resolve a language key (including common aliases) to its handler.
pub fn handler_for(language: &str) -> Option<LangHandler> {
    match language.to_lowercase().as_str() {
        "go" | "golang" => Some(LangHandler::Go),
        "java" => Some(LangHandler::Java),
        "python" | "py" => Some(LangHandler::Python),
        "ruby" | "rb" => Some(LangHandler::Ruby),
        "typescript" | "ts" | "javascript" | "js" => Some(LangHandler::TypeScript),
        _ => None,
    }
}
