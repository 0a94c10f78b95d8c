use std::error::Error;

use crate::core::config::Config;
use crate::core::providers::{CredentialSource, ProviderRegistry, ProviderStatus};

pub fn format_provider_table(statuses: &[ProviderStatus]) -> String {
    let id_width = statuses
        .iter()
        .map(|s| s.id.len() + usize::from(s.is_primary))
        .chain(["Provider".len()])
        .max()
        .unwrap_or_default();
    let name_width = statuses
        .iter()
        .map(|s| s.display_name.chars().count())
        .chain(["Display Name".len()])
        .max()
        .unwrap_or_default();

    let mut table = format!(
        "{:id_width$}  {:name_width$}  {:4}  URL\n",
        "Provider", "Display Name", "Key"
    );
    for status in statuses {
        let id = if status.is_primary {
            format!("{}*", status.id)
        } else {
            status.id.clone()
        };
        let key = match (&status.credential_env, status.has_credential) {
            (None, _) => "-",
            (Some(_), true) => "yes",
            (Some(_), false) => "no",
        };
        table.push_str(&format!(
            "{id:id_width$}  {:name_width$}  {key:4}  {}\n",
            status.display_name, status.base_url
        ));
    }
    table
}

pub fn list_providers(
    config: &Config,
    credentials: &dyn CredentialSource,
) -> Result<(), Box<dyn Error>> {
    let registry = ProviderRegistry::from_config(config)?;
    let statuses = registry.statuses(credentials);

    if statuses.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    println!("Configured providers:\n");
    print!("{}", format_provider_table(&statuses));
    println!("\n* = primary provider, Key - = no credential needed");

    let missing: Vec<_> = statuses
        .iter()
        .filter(|s| !s.has_credential)
        .filter_map(|s| s.credential_env.as_deref())
        .collect();
    if !missing.is_empty() {
        println!("Set {} to enable the rest.", missing.join(", "));
    }
    Ok(())
}
