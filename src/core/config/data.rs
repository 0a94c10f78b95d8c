use crate::core::builtin_providers::ProviderSpec;
use crate::core::model_rules::ModelRule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Session persistence switches. Persistence is opt-in.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Save after every completed turn
    #[serde(default)]
    pub autosave: bool,
    /// Override for the snapshot directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Primary provider, used when no provider is given on the command line
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_models: HashMap<String, String>,
    pub system_prompt: Option<String>,
    /// Providers added to (or replacing) the built-in table, matched by id
    #[serde(default)]
    pub custom_providers: Vec<ProviderSpec>,
    /// Classification rules checked before the built-in ones
    #[serde(default)]
    pub model_rules: Vec<ModelRule>,
    #[serde(default)]
    pub sessions: SessionSettings,
    /// Per-provider timeout when listing every catalog at once
    pub catalog_timeout_secs: Option<u64>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
