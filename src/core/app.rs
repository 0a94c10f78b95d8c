//! The run context owned by the top-level loop.
//!
//! Everything a chat needs (provider registry, active connection, dispatcher,
//! conversation, session store, transcript log) lives here and is passed by
//! reference, rather than sitting in process-wide statics.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::catalog::{
    fetch_all_catalogs, CatalogEntry, CatalogError, CatalogSource, PlatformSelection,
};
use crate::core::config::Config;
use crate::core::conversation::{Conversation, ConversationError};
use crate::core::dispatcher::{
    ChatReply, ChatTransport, DispatchError, Dispatcher, HttpTransport, ReplySink, RequestState,
};
use crate::core::model_rules::ModelRules;
use crate::core::providers::{
    CredentialSource, ProviderConnection, ProviderError, ProviderRegistry,
};
use crate::core::session::{new_session_id, Session, SessionError, SessionStore};
use crate::utils::logging::LoggingState;

/// Builds the transport for a freshly resolved connection.
pub type TransportFactory =
    Arc<dyn Fn(&ProviderConnection) -> Arc<dyn ChatTransport> + Send + Sync>;

/// Real HTTP transports sharing one connection pool.
pub fn http_transport_factory() -> TransportFactory {
    let client = reqwest::Client::new();
    Arc::new(move |connection: &ProviderConnection| {
        Arc::new(HttpTransport::with_client(client.clone(), connection.clone()))
            as Arc<dyn ChatTransport>
    })
}

#[derive(Debug, Clone, Default)]
pub struct ChatAppOptions {
    /// Provider id; the primary provider when absent.
    pub provider: Option<String>,
    /// Model name; the provider's default when absent.
    pub model: Option<String>,
    /// Transcript log file, enabled from the start when given.
    pub log_file: Option<String>,
}

/// What became of a submitted turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply arrived in full and was recorded.
    Completed(ChatReply),
    /// A stream was interrupted after some text arrived; the partial reply
    /// was recorded.
    Partial(ChatReply),
    /// Interrupted before any text arrived; the user turn was rolled back.
    Discarded,
}

pub struct ChatApp {
    config: Config,
    registry: ProviderRegistry,
    credentials: Arc<dyn CredentialSource>,
    connection: ProviderConnection,
    conversation: Conversation,
    dispatcher: Dispatcher,
    transports: TransportFactory,
    sessions: Option<SessionStore>,
    session_id: String,
    logging: LoggingState,
}

impl ChatApp {
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialSource>,
        options: ChatAppOptions,
        state: RequestState,
        transports: TransportFactory,
    ) -> Result<Self, Box<dyn Error>> {
        let mut registry = ProviderRegistry::from_config(&config)?;
        let provider = options
            .provider
            .unwrap_or_else(|| registry.primary().to_string());
        let connection = registry.resolve(&provider, credentials.as_ref())?;
        let model = pick_model(&registry, &config, &connection.provider_id, options.model)?;

        let rules = ModelRules::with_overrides(&config.model_rules)?;
        let dispatcher = Dispatcher::new(transports(&connection), rules, state);
        let conversation =
            Conversation::new(config.system_prompt(), &connection.provider_id, &model);
        let sessions = SessionStore::from_settings(&config.sessions)?;
        let logging = LoggingState::new(options.log_file)?;

        info!(provider = %connection.provider_id, model = %model, "chat ready");
        Ok(Self {
            config,
            registry,
            credentials,
            connection,
            conversation,
            dispatcher,
            transports,
            sessions,
            session_id: new_session_id(),
            logging,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> &dyn CredentialSource {
        self.credentials.as_ref()
    }

    pub fn connection(&self) -> &ProviderConnection {
        &self.connection
    }

    pub fn model(&self) -> &str {
        self.conversation.model()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn request_state(&self) -> &RequestState {
        self.dispatcher.state()
    }

    pub fn sessions(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }

    pub fn logging(&self) -> &LoggingState {
        &self.logging
    }

    pub fn logging_mut(&mut self) -> &mut LoggingState {
        &mut self.logging
    }

    /// Send one user turn and record the outcome.
    ///
    /// On any error, and on an interruption that produced no text, the user
    /// turn is rolled back so the transcript is exactly as before the call.
    pub async fn submit(
        &mut self,
        text: &str,
        sink: &mut dyn ReplySink,
    ) -> Result<TurnOutcome, DispatchError> {
        self.conversation.append_user(text);

        let result = self
            .dispatcher
            .send_chat_request(self.conversation.messages(), self.conversation.model(), sink)
            .await;

        let reply = match result {
            Ok(reply) if reply.interrupted && reply.text.is_empty() => {
                self.roll_back_user_turn();
                return Ok(TurnOutcome::Discarded);
            }
            Ok(reply) => reply,
            Err(err) => {
                self.roll_back_user_turn();
                return Err(err);
            }
        };

        self.conversation.append_assistant(reply.text.clone());
        self.conversation.record_history(text, reply.text.clone());
        if let Err(err) = self.logging.log_turn(text, &reply.text) {
            warn!("Could not write transcript log: {err}");
        }
        self.autosave();

        Ok(if reply.interrupted {
            TurnOutcome::Partial(reply)
        } else {
            TurnOutcome::Completed(reply)
        })
    }

    fn roll_back_user_turn(&mut self) {
        if let Err(err) = self.conversation.remove_last_user() {
            warn!("Nothing to roll back: {err}");
        }
    }

    fn autosave(&self) {
        if !self.config.sessions.autosave {
            return;
        }
        if let Err(err) = self.save_session() {
            warn!("Autosave failed: {err}");
        }
    }

    /// Rebind to another provider. The model defaults like at startup.
    pub fn switch_provider(&mut self, id: &str, model: Option<&str>) -> Result<(), ProviderError> {
        let connection = self.registry.resolve(id, self.credentials.as_ref())?;
        let model = pick_model(
            &self.registry,
            &self.config,
            &connection.provider_id,
            model.map(str::to_string),
        )?;
        self.bind(connection, &model);
        Ok(())
    }

    pub fn switch_model(&mut self, model: &str) {
        debug!(model, "switching model");
        self.conversation
            .set_connection(self.connection.provider_id.clone(), model);
    }

    /// Selection record for a composite-catalog entry.
    pub fn selection_for(&self, entry: &CatalogEntry) -> Result<PlatformSelection, ProviderError> {
        let connection = self
            .registry
            .peek(&entry.provider, self.credentials.as_ref())?;
        Ok(PlatformSelection {
            provider: connection.provider_id,
            model: entry.model.clone(),
            base_url: connection.base_url,
        })
    }

    pub fn apply_selection(&mut self, selection: &PlatformSelection) -> Result<(), ProviderError> {
        self.registry
            .pin_base_url(&selection.provider, &selection.base_url)?;
        self.switch_provider(&selection.provider, Some(&selection.model))
    }

    /// Pin a region for a multi-URL provider before switching to it.
    pub fn pin_base_url(&mut self, id: &str, url: &str) -> Result<(), ProviderError> {
        self.registry.pin_base_url(id, url)
    }

    /// Models of every reachable provider, tagged by provider.
    pub async fn all_models(
        &self,
        source: Arc<dyn CatalogSource>,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        fetch_all_catalogs(
            &self.registry,
            self.credentials.as_ref(),
            source,
            self.config.catalog_timeout(),
        )
        .await
    }

    pub fn rewind_to(&mut self, index: usize) -> Result<(), ConversationError> {
        self.conversation.rewind_to(index)?;
        self.rewrite_log();
        self.autosave();
        Ok(())
    }

    /// Start over. The next save goes to a new session file.
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.session_id = new_session_id();
        self.rewrite_log();
    }

    fn rewrite_log(&self) {
        if let Err(err) = self.logging.rewrite_from_history(self.conversation.history()) {
            warn!("Could not rewrite transcript log: {err}");
        }
    }

    pub fn snapshot(&self) -> Session {
        Session::capture(&self.session_id, &self.conversation, &self.connection.base_url)
    }

    /// Save now. `Ok(None)` when persistence is disabled.
    pub fn save_session(&self) -> Result<Option<PathBuf>, SessionError> {
        match &self.sessions {
            Some(store) => store.save(&self.snapshot()).map(Some),
            None => Ok(None),
        }
    }

    /// Replace the conversation with a saved one and rebind to the provider
    /// and region it was recorded with. Later saves overwrite that session.
    pub fn restore(&mut self, session: Session) -> Result<(), ProviderError> {
        if self
            .registry
            .candidates(&session.provider)?
            .contains(&session.base_url)
        {
            self.registry
                .pin_base_url(&session.provider, &session.base_url)?;
        } else {
            warn!(
                provider = %session.provider,
                url = %session.base_url,
                "saved base URL is no longer offered; using the default"
            );
        }
        let connection = self
            .registry
            .resolve(&session.provider, self.credentials.as_ref())?;

        let restored = session.restore_into(&mut self.conversation);
        self.bind(connection, &restored.model);
        self.session_id = session.id;
        self.rewrite_log();
        Ok(())
    }

    fn bind(&mut self, connection: ProviderConnection, model: &str) {
        debug!(provider = %connection.provider_id, model, "binding connection");
        self.dispatcher.set_transport((self.transports)(&connection));
        self.conversation
            .set_connection(connection.provider_id.clone(), model);
        self.connection = connection;
    }
}

fn pick_model(
    registry: &ProviderRegistry,
    config: &Config,
    provider: &str,
    requested: Option<String>,
) -> Result<String, ProviderError> {
    requested
        .filter(|model| !model.trim().is_empty())
        .or_else(|| registry.default_model(provider, config))
        .ok_or_else(|| ProviderError::NoModel(provider.to_string()))
}
