//! Provider → model-list catalogue.
//!
//! `models_config.json` next to the kernel is merged over the hardcoded
//! defaults and persisted with write-then-rename so readers never observe
//! a partial file. Preference strings (`auto`, `<provider>`,
//! `<provider>:<model>`) resolve against this catalogue.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, AiResult};

pub const MODELS_CONFIG_FILE: &str = "models_config.json";

/// Catalogue of models offered per provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelsConfig {
    pub providers: BTreeMap<String, Vec<String>>,
}

impl ModelsConfig {
    /// Hardcoded defaults shipped with the kernel.
    pub fn defaults() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "openai".to_string(),
            vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
        );
        providers.insert(
            "moonshot".to_string(),
            vec!["kimi-k2-0905-preview".to_string(), "moonshot-v1-32k".to_string()],
        );
        providers.insert(
            "minimax".to_string(),
            vec!["MiniMax-M2".to_string(), "abab6.5s-chat".to_string()],
        );
        providers.insert(
            "openrouter".to_string(),
            vec![
                "anthropic/claude-sonnet-4.5".to_string(),
                "qwen/qwen3-coder".to_string(),
            ],
        );
        Self { providers }
    }

    /// Load the file and merge its entries over the defaults. A missing or
    /// unreadable file silently yields the defaults.
    pub fn load(dir: &Path) -> Self {
        let mut merged = Self::defaults();
        let path = dir.join(MODELS_CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<ModelsConfig>(&raw) {
                Ok(file) => {
                    for (provider, models) in file.providers {
                        merged.providers.insert(provider, models);
                    }
                    debug!(path = %path.display(), "models config merged");
                }
                Err(err) => warn!(path = %path.display(), %err, "invalid models config ignored"),
            },
            Err(_) => debug!(path = %path.display(), "no models config file, using defaults"),
        }
        merged
    }

    /// Persist with write-then-rename to avoid partial reads.
    pub fn save(&self, dir: &Path) -> AiResult<()> {
        let path = dir.join(MODELS_CONFIG_FILE);
        let tmp = dir.join(format!("{MODELS_CONFIG_FILE}.tmp"));
        let data = serde_json::to_vec_pretty(self)
            .map_err(|err| AiLlmError::Config(format!("serialize models config: {err}")))?;
        std::fs::write(&tmp, data)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|err| AiLlmError::Config(format!("write models config: {err}")))?;
        Ok(())
    }

    /// Default model for a provider (first catalogue entry).
    pub fn default_model(&self, provider: LlmProvider) -> Option<String> {
        self.providers
            .get(provider.as_str())
            .and_then(|models| models.first().cloned())
    }
}

/// Parsed `llm_preference` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPreference {
    /// Pick the first provider with credentials configured.
    Auto,
    /// A provider, with its default model.
    Provider(LlmProvider),
    /// An explicit provider/model pair.
    ProviderModel(LlmProvider, String),
}

impl ModelPreference {
    /// Parse `auto` | `<provider>` | `<provider>:<model>`.
    pub fn parse(raw: &str) -> AiResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
            return Ok(ModelPreference::Auto);
        }
        match raw.split_once(':') {
            Some((provider, model)) => {
                let provider = LlmProvider::from_key(provider).ok_or_else(|| {
                    AiLlmError::Config(format!("unknown provider in preference: {raw}"))
                })?;
                let model = model.trim();
                if model.is_empty() {
                    Ok(ModelPreference::Provider(provider))
                } else {
                    Ok(ModelPreference::ProviderModel(provider, model.to_string()))
                }
            }
            None => {
                let provider = LlmProvider::from_key(raw).ok_or_else(|| {
                    AiLlmError::Config(format!("unknown provider in preference: {raw}"))
                })?;
                Ok(ModelPreference::Provider(provider))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_parsing_covers_all_forms() {
        assert_eq!(ModelPreference::parse("auto").unwrap(), ModelPreference::Auto);
        assert_eq!(ModelPreference::parse("").unwrap(), ModelPreference::Auto);
        assert_eq!(
            ModelPreference::parse("moonshot").unwrap(),
            ModelPreference::Provider(LlmProvider::Moonshot)
        );
        assert_eq!(
            ModelPreference::parse("openai:gpt-4o").unwrap(),
            ModelPreference::ProviderModel(LlmProvider::OpenAi, "gpt-4o".to_string())
        );
        assert!(ModelPreference::parse("nope:model").is_err());
    }

    #[test]
    fn file_entries_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MODELS_CONFIG_FILE),
            r#"{"providers": {"openai": ["my-tuned-model"]}}"#,
        )
        .unwrap();
        let config = ModelsConfig::load(dir.path());
        assert_eq!(
            config.default_model(LlmProvider::OpenAi).as_deref(),
            Some("my-tuned-model")
        );
        // Untouched providers keep their defaults.
        assert!(config.default_model(LlmProvider::Moonshot).is_some());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ModelsConfig::defaults();
        config
            .providers
            .insert("openai".to_string(), vec!["custom".to_string()]);
        config.save(dir.path()).unwrap();
        let loaded = ModelsConfig::load(dir.path());
        assert_eq!(
            loaded.default_model(LlmProvider::OpenAi).as_deref(),
            Some("custom")
        );
    }
}
