use crate::core::builtin_providers::{load_builtin_providers, CatalogSpec, ProviderSpec};
use crate::core::config::Config;
use crate::core::json_path::{JsonPath, PathError};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// Where API keys come from. One variable per provider, read on demand so a
/// key exported after startup is picked up on the next resolution.
pub trait CredentialSource: Send + Sync {
    fn credential(&self, env_name: &str) -> Option<String>;
}

/// Reads credentials from the process environment. An empty value counts as
/// unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credential(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

impl CredentialSource for HashMap<String, String> {
    fn credential(&self, env_name: &str) -> Option<String> {
        self.get(env_name).filter(|value| !value.is_empty()).cloned()
    }
}

#[derive(Debug)]
pub enum ProviderError {
    NotFound(String),
    CredentialMissing { provider: String, env: String },
    UnknownBaseUrl { provider: String, url: String },
    NoBaseUrl(String),
    InvalidCatalogPath { provider: String, source: PathError },
    /// No model was given and the provider has no default.
    NoModel(String),
}

impl ProviderError {
    /// Suggested next step for the user, if there is an obvious one.
    pub fn hint(&self) -> Option<String> {
        match self {
            ProviderError::NotFound(_) => {
                Some("palaver providers    # list known providers".into())
            }
            ProviderError::CredentialMissing { env, .. } => {
                Some(format!("export {env}=...    # then run palaver again"))
            }
            ProviderError::NoModel(id) => Some(format!(
                "palaver -p {id} -m <model>    # or: palaver set default-model {id} <model>"
            )),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotFound(id) => write!(f, "Provider '{id}' not found"),
            ProviderError::CredentialMissing { provider, env } => write!(
                f,
                "Credential missing for provider '{provider}': environment variable {env} is not set"
            ),
            ProviderError::UnknownBaseUrl { provider, url } => {
                write!(f, "'{url}' is not a base URL of provider '{provider}'")
            }
            ProviderError::NoBaseUrl(id) => write!(f, "Provider '{id}' has no base URL"),
            ProviderError::InvalidCatalogPath { provider, source } => {
                write!(f, "Provider '{provider}' has an invalid catalog path: {source}")
            }
            ProviderError::NoModel(id) => {
                write!(f, "No model selected for provider '{id}' and no default is configured")
            }
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProviderError::InvalidCatalogPath { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Everything needed to talk to one provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConnection {
    pub provider_id: String,
    pub display_name: String,
    pub base_url: String,
    pub credential_env: Option<String>,
    pub api_key: Option<String>,
    pub anthropic_mode: bool,
    pub catalog: CatalogSpec,
}

#[derive(Clone, Debug)]
pub struct ProviderStatus {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub credential_env: Option<String>,
    pub has_credential: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
    primary: String,
    /// Base URL chosen for multi-region providers, keyed by lowercase id.
    /// Sticky for the life of the process.
    pinned: HashMap<String, String>,
}

impl ProviderRegistry {
    pub fn new(
        providers: Vec<ProviderSpec>,
        primary: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        for provider in &providers {
            if provider.base_urls.is_empty() {
                return Err(ProviderError::NoBaseUrl(provider.id.clone()));
            }
            JsonPath::parse(&provider.catalog.path).map_err(|source| {
                ProviderError::InvalidCatalogPath {
                    provider: provider.id.clone(),
                    source,
                }
            })?;
        }

        Ok(Self {
            providers,
            primary: primary.into().to_lowercase(),
            pinned: HashMap::new(),
        })
    }

    /// Built-in table plus custom providers; a custom provider replaces a
    /// built-in one with the same id.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut providers = load_builtin_providers();
        for custom in &config.custom_providers {
            match providers
                .iter_mut()
                .find(|p| p.id.eq_ignore_ascii_case(&custom.id))
            {
                Some(existing) => *existing = custom.clone(),
                None => providers.push(custom.clone()),
            }
        }
        Self::new(providers, config.primary_provider())
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn is_primary(&self, id: &str) -> bool {
        self.primary.eq_ignore_ascii_case(id)
    }

    pub fn providers(&self) -> &[ProviderSpec] {
        &self.providers
    }

    pub fn get(&self, id: &str) -> Result<&ProviderSpec, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    /// Candidate base URLs, for interactive region choice.
    pub fn candidates(&self, id: &str) -> Result<&[String], ProviderError> {
        Ok(&self.get(id)?.base_urls)
    }

    pub fn pinned_base_url(&self, id: &str) -> Option<&str> {
        self.pinned.get(&id.to_lowercase()).map(String::as_str)
    }

    pub fn pin_base_url(&mut self, id: &str, url: &str) -> Result<(), ProviderError> {
        let provider = self.get(id)?;
        if !provider.base_urls.iter().any(|candidate| candidate == url) {
            return Err(ProviderError::UnknownBaseUrl {
                provider: provider.id.clone(),
                url: url.to_string(),
            });
        }
        self.pinned.insert(id.to_lowercase(), url.to_string());
        Ok(())
    }

    /// Resolve without touching the pinned URLs.
    pub fn peek(
        &self,
        id: &str,
        credentials: &dyn CredentialSource,
    ) -> Result<ProviderConnection, ProviderError> {
        let provider = self.get(id)?;

        let base_url = match self.pinned_base_url(id) {
            Some(url) => url.to_string(),
            None => provider
                .base_urls
                .first()
                .cloned()
                .ok_or_else(|| ProviderError::NoBaseUrl(provider.id.clone()))?,
        };

        let api_key = match &provider.credential_env {
            Some(env) => Some(credentials.credential(env).ok_or_else(|| {
                ProviderError::CredentialMissing {
                    provider: provider.id.clone(),
                    env: env.clone(),
                }
            })?),
            None => None,
        };

        Ok(ProviderConnection {
            provider_id: provider.id.to_lowercase(),
            display_name: provider.display_name.clone(),
            base_url,
            credential_env: provider.credential_env.clone(),
            api_key,
            anthropic_mode: provider.is_anthropic_mode(),
            catalog: provider.catalog.clone(),
        })
    }

    /// Resolve and pin the base URL used, so later resolutions in this
    /// process keep the same region.
    pub fn resolve(
        &mut self,
        id: &str,
        credentials: &dyn CredentialSource,
    ) -> Result<ProviderConnection, ProviderError> {
        let connection = self.peek(id, credentials)?;
        self.pinned
            .entry(connection.provider_id.clone())
            .or_insert_with(|| connection.base_url.clone());
        Ok(connection)
    }

    /// Model to use when none was given: the configured default for the
    /// provider, else the built-in default for the primary provider only.
    pub fn default_model(&self, id: &str, config: &Config) -> Option<String> {
        if let Some(model) = config.get_default_model(id) {
            return Some(model.clone());
        }
        if !self.is_primary(id) {
            return None;
        }
        self.get(id).ok().and_then(|p| p.default_model.clone())
    }

    pub fn statuses(&self, credentials: &dyn CredentialSource) -> Vec<ProviderStatus> {
        self.providers
            .iter()
            .map(|provider| ProviderStatus {
                id: provider.id.clone(),
                display_name: provider.display_name.clone(),
                base_url: self
                    .pinned_base_url(&provider.id)
                    .or(provider.base_urls.first().map(String::as_str))
                    .unwrap_or_default()
                    .to_string(),
                credential_env: provider.credential_env.clone(),
                has_credential: !provider.requires_credential()
                    || provider
                        .credential_env
                        .as_deref()
                        .is_some_and(|env| credentials.credential(env).is_some()),
                is_primary: self.is_primary(&provider.id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::TestEnvVarGuard;

    fn creds(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn resolves_single_url_provider_with_credential() {
        let mut registry = registry();
        let connection = registry
            .resolve("Groq", &creds(&[("GROQ_API_KEY", "gsk-test")]))
            .unwrap();

        assert_eq!(connection.provider_id, "groq");
        assert_eq!(connection.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(connection.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(connection.credential_env.as_deref(), Some("GROQ_API_KEY"));
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let err = registry().peek("nope", &creds(&[])).unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(ref id) if id == "nope"));
        assert!(err.hint().is_some());
    }

    #[test]
    fn missing_credential_is_reported_with_variable_name() {
        let err = registry().peek("mistral", &creds(&[])).unwrap_err();
        match err {
            ProviderError::CredentialMissing { provider, env } => {
                assert_eq!(provider, "mistral");
                assert_eq!(env, "MISTRAL_API_KEY");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = registry()
            .peek("mistral", &creds(&[("MISTRAL_API_KEY", "")]))
            .unwrap_err();
        assert!(matches!(err, ProviderError::CredentialMissing { .. }));
    }

    #[test]
    fn local_provider_needs_no_credential() {
        let connection = registry().peek("ollama", &creds(&[])).unwrap();
        assert!(connection.api_key.is_none());
        assert_eq!(connection.catalog.path, "models.name");
    }

    #[test]
    fn multi_region_defaults_to_first_and_pins_after_resolution() {
        let keys = creds(&[("MOONSHOT_API_KEY", "sk-moon")]);
        let mut registry = registry();
        assert_eq!(registry.candidates("moonshot").unwrap().len(), 2);
        assert!(registry.pinned_base_url("moonshot").is_none());

        let first = registry.resolve("moonshot", &keys).unwrap();
        assert_eq!(first.base_url, "https://api.moonshot.ai/v1");
        assert_eq!(
            registry.pinned_base_url("moonshot"),
            Some("https://api.moonshot.ai/v1")
        );
    }

    #[test]
    fn pinned_url_is_sticky() {
        let keys = creds(&[("DASHSCOPE_API_KEY", "sk-ds")]);
        let mut registry = registry();
        let china = "https://dashscope.aliyuncs.com/compatible-mode/v1";
        registry.pin_base_url("dashscope", china).unwrap();

        assert_eq!(registry.resolve("dashscope", &keys).unwrap().base_url, china);
        assert_eq!(registry.resolve("dashscope", &keys).unwrap().base_url, china);
        assert_eq!(registry.peek("dashscope", &keys).unwrap().base_url, china);
    }

    #[test]
    fn pinning_requires_a_candidate_url() {
        let mut registry = registry();
        let err = registry
            .pin_base_url("moonshot", "https://evil.example/v1")
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownBaseUrl { .. }));
        assert!(registry.pinned_base_url("moonshot").is_none());
    }

    #[test]
    fn primary_provider_gets_implicit_default_model() {
        let registry = registry();
        let config = Config::default();
        assert_eq!(
            registry.default_model("openai", &config).as_deref(),
            Some("gpt-4o-mini")
        );
        assert_eq!(registry.default_model("groq", &config), None);

        let mut config = Config::default();
        config.set_default_model("groq".into(), "llama-3.1-8b-instant".into());
        assert_eq!(
            registry.default_model("groq", &config).as_deref(),
            Some("llama-3.1-8b-instant")
        );
    }

    #[test]
    fn custom_provider_overrides_builtin() {
        let mut config = Config::default();
        config.custom_providers.push(ProviderSpec {
            id: "openai".to_string(),
            display_name: "OpenAI via proxy".to_string(),
            base_urls: vec!["https://proxy.example/v1".to_string()],
            credential_env: Some("PROXY_KEY".to_string()),
            catalog: CatalogSpec::default(),
            default_model: Some("gpt-4o".to_string()),
            mode: None,
        });

        let registry = ProviderRegistry::from_config(&config).unwrap();
        let connection = registry
            .peek("openai", &creds(&[("PROXY_KEY", "k")]))
            .unwrap();
        assert_eq!(connection.base_url, "https://proxy.example/v1");
        assert_eq!(
            registry
                .providers()
                .iter()
                .filter(|p| p.id == "openai")
                .count(),
            1
        );
    }

    #[test]
    fn invalid_catalog_path_is_rejected_at_load() {
        let mut config = Config::default();
        config.custom_providers.push(ProviderSpec {
            id: "broken".to_string(),
            display_name: "Broken".to_string(),
            base_urls: vec!["https://broken.example".to_string()],
            credential_env: None,
            catalog: CatalogSpec {
                url: "models".to_string(),
                path: "data..id".to_string(),
            },
            default_model: None,
            mode: None,
        });

        let err = ProviderRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCatalogPath { .. }));
    }

    #[test]
    fn env_credentials_treat_blank_as_missing() {
        let mut guard = TestEnvVarGuard::new();
        guard.set_var("PALAVER_TEST_PROVIDER_KEY", "  ");
        assert_eq!(EnvCredentials.credential("PALAVER_TEST_PROVIDER_KEY"), None);

        guard.set_var("PALAVER_TEST_PROVIDER_KEY", "sk-live");
        assert_eq!(
            EnvCredentials.credential("PALAVER_TEST_PROVIDER_KEY").as_deref(),
            Some("sk-live")
        );
    }

    #[test]
    fn statuses_mark_credentials_and_primary() {
        let statuses = registry().statuses(&creds(&[("GROQ_API_KEY", "x")]));
        let groq = statuses.iter().find(|s| s.id == "groq").unwrap();
        let openai = statuses.iter().find(|s| s.id == "openai").unwrap();
        let ollama = statuses.iter().find(|s| s.id == "ollama").unwrap();

        assert!(groq.has_credential);
        assert!(!openai.has_credential);
        assert!(openai.is_primary);
        assert!(ollama.has_credential);
    }
}
