//! Model listing for one provider, or for every reachable provider at once.

use std::error::Error;
use std::sync::Arc;

use crate::api::models::sort_models;
use crate::core::catalog::{fetch_all_catalogs, fetch_catalog, CatalogEntry, CatalogSource};
use crate::core::config::Config;
use crate::core::providers::{CredentialSource, ProviderRegistry};

pub async fn list_models(
    config: &Config,
    credentials: &dyn CredentialSource,
    source: Arc<dyn CatalogSource>,
    provider: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let registry = ProviderRegistry::from_config(config)?;
    let provider = provider
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| registry.primary().to_string());
    let spec = registry.get(&provider)?;

    let mut models = fetch_catalog(&registry, credentials, source.as_ref(), &provider).await?;
    sort_models(&mut models);

    println!("Available models for {}", spec.display_name);
    if let Some(default_model) = registry.default_model(&provider, config) {
        println!("Default: {default_model}");
    }
    println!();
    if models.is_empty() {
        println!("No models found for this provider.");
    } else {
        for model in &models {
            println!("  {model}");
        }
        println!("\n{} models", models.len());
    }
    Ok(())
}

/// Group the composite catalog under one heading per provider.
pub fn format_catalog(entries: &[CatalogEntry]) -> String {
    let mut entries = entries.to_vec();
    entries.sort();

    let mut out = String::new();
    let mut current: Option<&str> = None;
    for entry in &entries {
        if current != Some(entry.provider.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("{}:\n", entry.provider));
            current = Some(entry.provider.as_str());
        }
        out.push_str(&format!("  {}\n", entry.model));
    }
    out
}

pub async fn list_all_models(
    config: &Config,
    credentials: &dyn CredentialSource,
    source: Arc<dyn CatalogSource>,
) -> Result<(), Box<dyn Error>> {
    let registry = ProviderRegistry::from_config(config)?;
    let entries =
        fetch_all_catalogs(&registry, credentials, source, config.catalog_timeout()).await?;
    print!("{}", format_catalog(&entries));
    println!("\n{} models", entries.len());
    Ok(())
}
