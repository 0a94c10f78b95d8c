//! Streaming vs blocking classification of model names.
//!
//! Some model families only answer once the whole reply is ready. They are
//! listed as ordered pattern rules, so adding a family is a configuration
//! change and the dispatcher never branches on model names itself.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
    Blocking,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Streaming => write!(f, "streaming"),
            ResponseMode::Blocking => write!(f, "blocking"),
        }
    }
}

/// A rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRule {
    pub pattern: String,
    pub mode: ResponseMode,
}

#[derive(Debug)]
pub struct RuleError {
    pattern: String,
    source: regex::Error,
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid model rule pattern '{}': {}", self.pattern, self.source)
    }
}

impl Error for RuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRules {
    rules: Vec<(Regex, ResponseMode)>,
}

impl ModelRules {
    pub fn compile(rules: &[ModelRule]) -> Result<Self, RuleError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| (regex, rule.mode))
                    .map_err(|source| RuleError {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Rules shipped in the embedded provider table.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::compile(&crate::core::builtin_providers::builtin_model_rules())
    }

    /// User rules are checked before the built-in ones.
    pub fn with_overrides(user_rules: &[ModelRule]) -> Result<Self, RuleError> {
        let mut combined = user_rules.to_vec();
        combined.extend(crate::core::builtin_providers::builtin_model_rules());
        Self::compile(&combined)
    }

    pub fn classify(&self, model: &str) -> ResponseMode {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(model))
            .map(|(_, mode)| *mode)
            .unwrap_or(ResponseMode::Streaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, mode: ResponseMode) -> ModelRule {
        ModelRule {
            pattern: pattern.to_string(),
            mode,
        }
    }

    #[test]
    fn reasoning_family_blocks_and_chat_models_stream() {
        let rules = ModelRules::compile(&[rule(r"^o\d+", ResponseMode::Blocking)]).unwrap();
        assert_eq!(rules.classify("o3-mini"), ResponseMode::Blocking);
        assert_eq!(rules.classify("o1"), ResponseMode::Blocking);
        assert_eq!(rules.classify("gpt-4o"), ResponseMode::Streaming);
    }

    #[test]
    fn builtin_rules_cover_router_prefixed_models() {
        let rules = ModelRules::builtin().unwrap();
        assert_eq!(rules.classify("o4-mini"), ResponseMode::Blocking);
        assert_eq!(rules.classify("openai/o3"), ResponseMode::Blocking);
        assert_eq!(rules.classify("o3-deep-research"), ResponseMode::Blocking);
        assert_eq!(rules.classify("gpt-4o-mini"), ResponseMode::Streaming);
        assert_eq!(rules.classify("llama3.2"), ResponseMode::Streaming);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = ModelRules::with_overrides(&[rule(r"^o3-mini$", ResponseMode::Streaming)])
            .unwrap();
        assert_eq!(rules.classify("o3-mini"), ResponseMode::Streaming);
        assert_eq!(rules.classify("o3"), ResponseMode::Blocking);
    }

    #[test]
    fn invalid_pattern_names_the_rule() {
        let err = ModelRules::compile(&[rule("(unclosed", ResponseMode::Blocking)]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn mode_parses_from_config_strings() {
        let parsed: ModelRule =
            toml::from_str("pattern = '^gpt-5-pro'\nmode = \"blocking\"").unwrap();
        assert_eq!(parsed.mode, ResponseMode::Blocking);
    }
}
