//! Built-in provider configuration
//!
//! Providers are described by data: the table in `builtin_providers.toml` is
//! embedded at build time and custom providers from the config file use the
//! same shape.

use crate::core::model_rules::ModelRule;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Where a provider lists its models and how to flatten the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSpec {
    /// Absolute URL, or a path relative to the resolved base URL.
    pub url: String,
    /// Dotted JSON path, e.g. `data.id`.
    pub path: String,
}

impl Default for CatalogSpec {
    fn default() -> Self {
        Self {
            url: "models".to_string(),
            path: "data.id".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub id: String,
    pub display_name: String,
    /// Candidate base URLs, e.g. one per region. The first is the default.
    pub base_urls: Vec<String>,
    /// Environment variable holding the API key. `None` for local providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub catalog: CatalogSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ProviderSpec {
    /// Get the authentication mode for this provider
    pub fn auth_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("openai")
    }

    /// Check if this provider uses Anthropic-style authentication
    pub fn is_anthropic_mode(&self) -> bool {
        self.auth_mode() == "anthropic"
    }

    pub fn requires_credential(&self) -> bool {
        self.credential_env.is_some()
    }

    pub fn is_multi_region(&self) -> bool {
        self.base_urls.len() > 1
    }
}

#[derive(Debug, Deserialize)]
struct BuiltinTable {
    providers: Vec<ProviderSpec>,
    #[serde(default)]
    model_rules: Vec<ModelRule>,
}

static BUILTIN_TABLE: LazyLock<BuiltinTable> = LazyLock::new(|| {
    const CONFIG_CONTENT: &str = include_str!("../builtin_providers.toml");
    toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_providers.toml")
});

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> Vec<ProviderSpec> {
    BUILTIN_TABLE.providers.clone()
}

pub fn builtin_model_rules() -> Vec<ModelRule> {
    BUILTIN_TABLE.model_rules.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::json_path::JsonPath;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers();
        assert!(!providers.is_empty());

        let provider_ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert!(provider_ids.contains(&"openai"));
        assert!(provider_ids.contains(&"groq"));
        assert!(provider_ids.contains(&"ollama"));
        assert!(provider_ids.contains(&"moonshot"));
    }

    fn builtin(id: &str) -> ProviderSpec {
        load_builtin_providers()
            .into_iter()
            .find(|p| p.id == id)
            .unwrap_or_else(|| panic!("missing builtin provider {id}"))
    }

    #[test]
    fn builtin_ids_are_unique_and_lowercase() {
        let providers = load_builtin_providers();
        let mut ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.iter().all(|id| *id == id.to_ascii_lowercase()));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), providers.len());
        assert_eq!(builtin("groq").display_name, "Groq");
    }

    #[test]
    fn test_anthropic_mode() {
        let anthropic = builtin("anthropic");
        assert!(anthropic.is_anthropic_mode());

        let openai = builtin("openai");
        assert!(!openai.is_anthropic_mode());
        assert_eq!(openai.auth_mode(), "openai");
    }

    #[test]
    fn local_provider_needs_no_credential() {
        let ollama = builtin("ollama");
        assert!(!ollama.requires_credential());
        assert_eq!(ollama.catalog.path, "models.name");
        assert!(ollama.catalog.url.starts_with("http://localhost"));
    }

    #[test]
    fn multi_region_providers_list_every_candidate() {
        let moonshot = builtin("moonshot");
        assert!(moonshot.is_multi_region());
        assert_eq!(moonshot.base_urls[0], "https://api.moonshot.ai/v1");
    }

    #[test]
    fn test_provider_properties() {
        for provider in load_builtin_providers() {
            assert!(!provider.id.is_empty());
            assert!(!provider.display_name.is_empty());
            assert!(!provider.base_urls.is_empty());
            assert!(provider.default_model.is_some());
            assert!(
                JsonPath::parse(&provider.catalog.path).is_ok(),
                "bad catalog path for {}",
                provider.id
            );
            for url in &provider.base_urls {
                assert!(url.starts_with("https://") || url.starts_with("http://localhost"));
            }
        }
    }

    #[test]
    fn embedded_rules_are_present() {
        let rules = builtin_model_rules();
        assert!(rules.iter().any(|rule| rule.pattern == r"^o\d+"));
    }
}
