//! `palaver set` / `palaver unset`.
//!
//! Each function edits a [`Config`] in place and returns the confirmation to
//! print; the caller decides whether and where to save.

use std::fmt;

use crate::core::config::Config;
use crate::core::providers::ProviderRegistry;

/// Keys accepted by `set` and `unset`, in the order `palaver set` lists them.
pub const SETTING_KEYS: &[&str] = &[
    "default-provider",
    "default-model",
    "system-prompt",
    "sessions",
    "catalog-timeout",
];

#[derive(Debug, PartialEq, Eq)]
pub enum SettingError {
    UnknownKey(String),
    UnknownProvider(String),
    InvalidValue { key: &'static str, value: String },
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(
                f,
                "Unknown config key: {key} (known keys: {})",
                SETTING_KEYS.join(", ")
            ),
            SettingError::UnknownProvider(id) => write!(
                f,
                "Unknown provider: {id}. Run 'palaver providers' to list them."
            ),
            SettingError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {key}: {value}")
            }
            SettingError::MissingArgs { hint, example } => {
                write!(f, "{hint}\nExample: {example}")
            }
        }
    }
}

impl std::error::Error for SettingError {}

fn known_provider(config: &Config, id: &str) -> Result<String, SettingError> {
    let registry = ProviderRegistry::from_config(config)
        .map_err(|_| SettingError::UnknownProvider(id.to_string()))?;
    registry
        .get(id)
        .map(|provider| provider.id.to_lowercase())
        .map_err(|_| SettingError::UnknownProvider(id.to_string()))
}

pub fn apply_set(config: &mut Config, key: &str, args: &[String]) -> Result<String, SettingError> {
    let value = args.join(" ");
    let value = value.trim();

    match key {
        "default-provider" => {
            if value.is_empty() {
                return Err(SettingError::MissingArgs {
                    hint: "Specify the provider id.",
                    example: "palaver set default-provider groq",
                });
            }
            let id = known_provider(config, value)?;
            config.default_provider = Some(id.clone());
            Ok(format!("Set default-provider to: {id}"))
        }
        "default-model" => {
            let Some((provider, model)) = value
                .split_once(char::is_whitespace)
                .map(|(provider, model)| (provider, model.trim()))
                .filter(|(_, model)| !model.is_empty())
            else {
                return Err(SettingError::MissingArgs {
                    hint: "To set a default model, specify the provider and model.",
                    example: "palaver set default-model openai gpt-4o",
                });
            };
            let id = known_provider(config, provider)?;
            config.set_default_model(id.clone(), model.to_string());
            Ok(format!("Set default-model for provider '{id}' to: {model}"))
        }
        "system-prompt" => {
            if value.is_empty() {
                return Err(SettingError::MissingArgs {
                    hint: "Specify the prompt text.",
                    example: "palaver set system-prompt You answer in haiku.",
                });
            }
            config.system_prompt = Some(value.to_string());
            Ok("Set system-prompt".to_string())
        }
        "sessions" => {
            match value.to_lowercase().as_str() {
                "on" => {
                    config.sessions.enabled = true;
                    config.sessions.autosave = false;
                }
                "autosave" => {
                    config.sessions.enabled = true;
                    config.sessions.autosave = true;
                }
                "off" => {
                    config.sessions.enabled = false;
                    config.sessions.autosave = false;
                }
                _ => {
                    return Err(SettingError::MissingArgs {
                        hint: "Sessions can be on, autosave or off.",
                        example: "palaver set sessions autosave",
                    })
                }
            }
            Ok(format!("Set sessions to: {}", value.to_lowercase()))
        }
        "catalog-timeout" => match value.parse::<u64>() {
            Ok(secs) if secs > 0 => {
                config.catalog_timeout_secs = Some(secs);
                Ok(format!("Set catalog-timeout to: {secs}s"))
            }
            _ => Err(SettingError::InvalidValue {
                key: "catalog-timeout",
                value: value.to_string(),
            }),
        },
        _ => Err(SettingError::UnknownKey(key.to_string())),
    }
}

pub fn apply_unset(
    config: &mut Config,
    key: &str,
    arg: Option<&str>,
) -> Result<String, SettingError> {
    match key {
        "default-provider" => {
            config.default_provider = None;
            Ok("Unset default-provider".to_string())
        }
        "default-model" => {
            let Some(provider) = arg.filter(|p| !p.trim().is_empty()) else {
                return Err(SettingError::MissingArgs {
                    hint: "To unset a default model, specify the provider.",
                    example: "palaver unset default-model openai",
                });
            };
            config.unset_default_model(provider);
            Ok(format!("Unset default-model for provider: {provider}"))
        }
        "system-prompt" => {
            config.system_prompt = None;
            Ok("Unset system-prompt".to_string())
        }
        "sessions" => {
            config.sessions.enabled = false;
            config.sessions.autosave = false;
            Ok("Sessions disabled".to_string())
        }
        "catalog-timeout" => {
            config.catalog_timeout_secs = None;
            Ok("Unset catalog-timeout".to_string())
        }
        _ => Err(SettingError::UnknownKey(key.to_string())),
    }
}
