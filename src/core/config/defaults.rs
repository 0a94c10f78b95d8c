use crate::core::config::data::Config;
use std::time::Duration;

pub const DEFAULT_PRIMARY_PROVIDER: &str = "openai";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 10;

impl Config {
    pub fn primary_provider(&self) -> &str {
        self.default_provider
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PRIMARY_PROVIDER)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(
            self.catalog_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_CATALOG_TIMEOUT_SECS),
        )
    }

    pub fn get_default_model(&self, provider: &str) -> Option<&String> {
        let normalized = provider.to_lowercase();
        self.default_models
            .get(&normalized)
            .or_else(|| self.default_models.get(provider))
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        let normalized = provider.to_lowercase();
        self.default_models.insert(normalized.clone(), model);
        if normalized != provider {
            self.default_models.remove(&provider);
        }
    }

    pub fn unset_default_model(&mut self, provider: &str) {
        let normalized = provider.to_lowercase();
        self.default_models.remove(&normalized);
        if normalized != provider {
            self.default_models.remove(provider);
        }
    }
}
