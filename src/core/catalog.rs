//! Model catalogs across providers.
//!
//! [`fetch_all_catalogs`] asks every usable provider for its models at once
//! and merges whatever comes back within the timeout. Individual failures are
//! logged and dropped; only an empty merge is an error.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::api::models::fetch_models;
use crate::core::json_path::PathError;
use crate::core::providers::{
    CredentialSource, ProviderConnection, ProviderError, ProviderRegistry,
};

#[derive(Debug)]
pub enum CatalogError {
    Provider(ProviderError),
    Transport {
        provider: String,
        source: reqwest::Error,
    },
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    Decode {
        provider: String,
        source: serde_json::Error,
    },
    Path {
        provider: String,
        source: PathError,
    },
    Timeout {
        provider: String,
        after: Duration,
    },
    /// No provider contributed a single model.
    Empty,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Provider(err) => write!(f, "{err}"),
            CatalogError::Transport { provider, source } => {
                write!(f, "Could not reach {provider}: {source}")
            }
            CatalogError::Http {
                provider,
                status,
                body,
            } => write!(
                f,
                "Listing models for {provider} failed with status {status}: {body}"
            ),
            CatalogError::Decode { provider, source } => {
                write!(f, "{provider} returned a catalog that is not JSON: {source}")
            }
            CatalogError::Path { provider, source } => {
                write!(f, "Unexpected catalog shape from {provider}: {source}")
            }
            CatalogError::Timeout { provider, after } => write!(
                f,
                "{provider} did not answer within {}s",
                after.as_secs_f32()
            ),
            CatalogError::Empty => write!(f, "No models available from any provider"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CatalogError::Provider(err) => Some(err),
            CatalogError::Transport { source, .. } => Some(source),
            CatalogError::Decode { source, .. } => Some(source),
            CatalogError::Path { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ProviderError> for CatalogError {
    fn from(err: ProviderError) -> Self {
        CatalogError::Provider(err)
    }
}

/// Anything that can list one provider's models.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_models(&self, connection: &ProviderConnection)
        -> Result<Vec<String>, CatalogError>;
}

#[derive(Clone, Default)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
}

impl HttpCatalogSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn list_models(
        &self,
        connection: &ProviderConnection,
    ) -> Result<Vec<String>, CatalogError> {
        fetch_models(&self.client, connection).await
    }
}

/// One model of the composite catalog, tagged with its provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CatalogEntry {
    pub provider: String,
    pub model: String,
}

impl CatalogEntry {
    /// `provider|model`
    pub fn tag(&self) -> String {
        format!("{}|{}", self.provider, self.model)
    }

    /// Inverse of [`CatalogEntry::tag`]. Model names may themselves contain
    /// `|`; only the first separator splits.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let (provider, model) = tag.split_once('|')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// What the user picked from a catalog: enough to rebind the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSelection {
    pub provider: String,
    pub model: String,
    pub base_url: String,
}

/// Query every provider that can be reached with the available credentials.
///
/// Each provider runs as its own task with its own `timeout`; results come
/// back in completion order.
pub async fn fetch_all_catalogs(
    registry: &ProviderRegistry,
    credentials: &dyn CredentialSource,
    source: Arc<dyn CatalogSource>,
    timeout: Duration,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    let mut tasks = JoinSet::new();

    for provider in registry.providers() {
        let connection = match registry.peek(&provider.id, credentials) {
            Ok(connection) => connection,
            Err(err) => {
                debug!(provider = %provider.id, "skipping catalog: {err}");
                continue;
            }
        };

        let source = Arc::clone(&source);
        tasks.spawn(async move {
            let provider = connection.provider_id.clone();
            let fetch = source.list_models(&connection);
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(CatalogError::Timeout {
                    provider: provider.clone(),
                    after: timeout,
                }),
            };
            (provider, result)
        });
    }

    let mut entries = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((provider, Ok(models))) => {
                debug!(provider = %provider, count = models.len(), "catalog fetched");
                entries.extend(models.into_iter().map(|model| CatalogEntry {
                    provider: provider.clone(),
                    model,
                }));
            }
            Ok((provider, Err(err))) => {
                warn!(provider = %provider, "dropping catalog: {err}");
            }
            Err(err) => warn!("catalog task failed: {err}"),
        }
    }

    if entries.is_empty() {
        return Err(CatalogError::Empty);
    }
    Ok(entries)
}

/// Single-provider listing. Unlike the aggregate, every failure is returned.
pub async fn fetch_catalog(
    registry: &ProviderRegistry,
    credentials: &dyn CredentialSource,
    source: &dyn CatalogSource,
    provider: &str,
) -> Result<Vec<String>, CatalogError> {
    let connection = registry.peek(provider, credentials)?;
    source.list_models(&connection).await
}
