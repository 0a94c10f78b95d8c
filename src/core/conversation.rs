//! Transcript and display history for one chat.
//!
//! The transcript (`messages`) is what goes over the wire each turn; the
//! history is the display log. Index 0 of both is reserved: the system prompt
//! in the transcript and a sentinel entry in the history.

use crate::core::message::{HistoryEntry, Message, Role};
use chrono::Utc;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// Only the sentinel is present.
    NothingToRewind,
    IndexOutOfRange { index: usize, max: usize },
    /// `remove_last_user` found something other than a user turn at the end.
    NoPendingUserTurn,
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationError::NothingToRewind => write!(f, "No history to rewind"),
            ConversationError::IndexOutOfRange { index, max } => {
                write!(f, "History index {index} is out of range (1..={max})")
            }
            ConversationError::NoPendingUserTurn => {
                write!(f, "The transcript does not end with a user message")
            }
        }
    }
}

impl Error for ConversationError {}

#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,
    provider: String,
    model: String,
    messages: Vec<Message>,
    history: Vec<HistoryEntry>,
}

impl Conversation {
    pub fn new(
        system_prompt: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let mut conversation = Self {
            system_prompt: system_prompt.into(),
            provider: provider.into(),
            model: model.into(),
            messages: Vec::new(),
            history: Vec::new(),
        };
        conversation.clear();
        conversation
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Number of recorded turns, not counting the sentinel.
    pub fn turn_count(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Tags used for subsequent `record_history` calls.
    pub fn set_connection(&mut self, provider: impl Into<String>, model: impl Into<String>) {
        self.provider = provider.into();
        self.model = model.into();
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Roll back a user turn whose request produced no reply.
    pub fn remove_last_user(&mut self) -> Result<Message, ConversationError> {
        match self.messages.last() {
            Some(message) if message.role == Role::User && self.messages.len() > 1 => {
                self.messages.pop().ok_or(ConversationError::NoPendingUserTurn)
            }
            _ => Err(ConversationError::NoPendingUserTurn),
        }
    }

    pub fn record_history(&mut self, user_text: impl Into<String>, bot_text: impl Into<String>) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            user_text: user_text.into(),
            bot_text: bot_text.into(),
            provider: self.provider.clone(),
            model: self.model.clone(),
        });
    }

    /// Reset the transcript to the system message and the history to its
    /// sentinel.
    pub fn clear(&mut self) {
        self.messages = vec![Message::system(self.system_prompt.clone())];
        self.history = vec![HistoryEntry::sentinel(
            &self.system_prompt,
            &self.provider,
            &self.model,
        )];
    }

    /// Keep history entries `1..=index` and rebuild the transcript from them.
    ///
    /// Validation happens before any mutation, so a rejected call leaves both
    /// the transcript and the history untouched.
    pub fn rewind_to(&mut self, index: usize) -> Result<(), ConversationError> {
        if self.history.len() <= 1 {
            return Err(ConversationError::NothingToRewind);
        }
        let max = self.history.len() - 1;
        if index < 1 || index > max {
            return Err(ConversationError::IndexOutOfRange { index, max });
        }

        self.history.truncate(index + 1);
        self.messages = self.rebuild_transcript();
        Ok(())
    }

    fn rebuild_transcript(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 - 1);
        messages.push(Message::system(self.system_prompt.clone()));
        for entry in self.history.iter().skip(1) {
            messages.push(Message::user(entry.user_text.clone()));
            messages.push(Message::assistant(entry.bot_text.clone()));
        }
        messages
    }

    /// Wholesale replacement used when restoring a saved session. The system
    /// prompt is taken from the restored transcript when it has one.
    pub fn replace(&mut self, messages: Vec<Message>, history: Vec<HistoryEntry>) {
        if let Some(first) = messages.first().filter(|m| m.role == Role::System) {
            self.system_prompt = first.content.clone();
        }
        if let Some(last) = history.last() {
            self.provider = last.provider.clone();
            self.model = last.model.clone();
        }
        self.messages = messages;
        self.history = history;

        if self.messages.first().map(|m| m.role) != Some(Role::System) {
            self.messages
                .insert(0, Message::system(self.system_prompt.clone()));
        }
        if self.history.is_empty() {
            self.history.push(HistoryEntry::sentinel(
                &self.system_prompt,
                &self.provider,
                &self.model,
            ));
        }
    }
}
