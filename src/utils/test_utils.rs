use crate::api::{ChatCompletion, ChatRequest};
use crate::core::app::{ChatApp, ChatAppOptions, TransportFactory};
use crate::core::config::{Config, SessionSettings};
use crate::core::conversation::Conversation;
use crate::core::dispatcher::{ByteStream, ChatTransport, DispatchError, RequestState};
use crate::core::providers::ProviderConnection;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Serialises tests that mutate process environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Sets environment variables for the duration of a test and restores the
/// previous values on drop.
pub struct TestEnvVarGuard {
    saved: HashMap<String, Option<OsString>>,
    _lock: MutexGuard<'static, ()>,
}

impl TestEnvVarGuard {
    pub fn new() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            saved: HashMap::new(),
            _lock: lock,
        }
    }

    pub fn set_var(&mut self, key: &str, value: &str) {
        self.remember(key);
        std::env::set_var(key, value);
    }

    pub fn remove_var(&mut self, key: &str) {
        self.remember(key);
        std::env::remove_var(key);
    }

    fn remember(&mut self, key: &str) {
        self.saved
            .entry(key.to_string())
            .or_insert_with(|| std::env::var_os(key));
    }
}

impl Drop for TestEnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain() {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

pub fn create_test_conversation(turns: usize) -> Conversation {
    let mut conversation = Conversation::new("You are a test assistant.", "test", "test-model");
    for i in 1..=turns {
        let user = format!("question {i}");
        let bot = format!("answer {i}");
        conversation.append_user(user.clone());
        conversation.append_assistant(bot.clone());
        conversation.record_history(user, bot);
    }
    conversation
}

/// Replies `echo: <last user message>`, streamed or whole.
pub struct EchoTransport;

impl EchoTransport {
    fn reply(request: &ChatRequest) -> String {
        let last = request
            .messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        format!("echo: {last}")
    }
}

#[async_trait]
impl ChatTransport for EchoTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, DispatchError> {
        let event = format!(
            "data: {}\n\ndata: [DONE]\n\n",
            serde_json::json!({"choices": [{"delta": {"content": Self::reply(request)}}]})
        );
        Ok(futures_util::stream::iter([Ok(event.into_bytes())]).boxed())
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, DispatchError> {
        serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": Self::reply(request)}}]
        }))
        .map_err(|err| DispatchError::Decode(err.to_string()))
    }
}

/// A chat bound to OpenAI with echo transports; sessions live under `dir`.
pub fn create_test_app(dir: &Path) -> ChatApp {
    let config = Config {
        sessions: SessionSettings {
            enabled: true,
            autosave: false,
            directory: Some(dir.join("sessions")),
        },
        ..Default::default()
    };
    let credentials: HashMap<String, String> = HashMap::from([
        ("OPENAI_API_KEY".to_string(), "sk-test".to_string()),
        ("GROQ_API_KEY".to_string(), "gsk-test".to_string()),
    ]);
    let transports: TransportFactory =
        Arc::new(|_: &ProviderConnection| Arc::new(EchoTransport) as Arc<dyn ChatTransport>);

    ChatApp::new(
        config,
        Arc::new(credentials),
        ChatAppOptions::default(),
        RequestState::new(),
        transports,
    )
    .expect("test app")
}
