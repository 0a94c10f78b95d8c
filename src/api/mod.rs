//! OpenAI-compatible chat completion payloads.

use crate::core::message::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: &str, transcript: &[Message], stream: bool) -> Self {
        Self {
            model: model.to_string(),
            messages: transcript.iter().map(ChatMessage::from).collect(),
            stream,
        }
    }
}

/// One `data:` event of a streamed completion.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseChoice {
    #[serde(default)]
    pub delta: ChatResponseDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

/// A non-streamed completion.
#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletion {
    /// Text of the first choice; `None` when the provider returned no choices.
    pub fn first_text(&self) -> Option<String> {
        self.choices
            .first()
            .map(|choice| choice.message.content.clone().unwrap_or_default())
    }
}

pub mod models;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_transcript_roles() {
        let transcript = vec![Message::system("sys"), Message::user("hi")];
        let request = ChatRequest::new("gpt-4o", &transcript, true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn completion_first_text_handles_empty_choices() {
        let empty: ChatCompletion = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.first_text(), None);

        let missing: ChatCompletion = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(missing.first_text(), None);

        let full: ChatCompletion = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"42"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(full.first_text().as_deref(), Some("42"));
    }
}
