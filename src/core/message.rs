use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => ROLE_SYSTEM,
            Role::User => ROLE_USER,
            Role::Assistant => ROLE_ASSISTANT,
        }
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            ROLE_SYSTEM => Ok(Role::System),
            ROLE_USER => Ok(Role::User),
            ROLE_ASSISTANT => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One entry of the transcript sent verbatim to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One logical turn of the display history.
///
/// Field names follow the session file layout
/// (`{time, user, bot, platform, model}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "user")]
    pub user_text: String,
    #[serde(rename = "bot")]
    pub bot_text: String,
    #[serde(rename = "platform")]
    pub provider: String,
    pub model: String,
}

impl HistoryEntry {
    /// Sentinel stored at history index 0. It carries the system prompt in
    /// `bot_text` and never expands into a user/assistant pair.
    pub fn sentinel(system_prompt: &str, provider: &str, model: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            user_text: String::new(),
            bot_text: system_prompt.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }

    /// Single-line label used when offering history entries to a chooser.
    pub fn label(&self, index: usize) -> String {
        let preview: String = self.user_text.chars().take(60).collect();
        let ellipsis = if self.user_text.chars().count() > 60 {
            "…"
        } else {
            ""
        };
        format!(
            "{index}. [{}] {preview}{ellipsis} ({}/{})",
            self.timestamp.format("%H:%M:%S"),
            self.provider,
            self.model
        )
    }
}
