//! Durable conversation snapshots.
//!
//! One JSON file per conversation under the session directory. A snapshot is
//! written whole and atomically; autosaves of the same conversation reuse its
//! `id` and so overwrite a single file.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::chooser::Chooser;
use crate::core::config::io::project_dirs;
use crate::core::config::{path_display, SessionSettings};
use crate::core::conversation::Conversation;
use crate::core::message::{HistoryEntry, Message, Role};

const FILE_PREFIX: &str = "session_";
const FILE_EXTENSION: &str = "json";
const FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug)]
pub enum SessionError {
    NotFound,
    EmptyQuery,
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Encode(serde_json::Error),
    /// The platform exposes no per-user data directory.
    NoDataDir,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound => write!(f, "No saved session found"),
            SessionError::EmptyQuery => write!(f, "Search query must not be empty"),
            SessionError::Io { path, source } => {
                write!(f, "Session I/O failed at {}: {source}", path_display(path))
            }
            SessionError::Parse { path, source } => {
                write!(f, "Invalid session file {}: {source}", path_display(path))
            }
            SessionError::Encode(source) => write!(f, "Could not encode session: {source}"),
            SessionError::NoDataDir => write!(f, "Could not determine a data directory"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Io { source, .. } => Some(source),
            SessionError::Parse { source, .. } => Some(source),
            SessionError::Encode(source) => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "new_session_id")]
    pub id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub messages: Vec<Message>,
    pub history: Vec<HistoryEntry>,
}

/// Connection details recorded in a snapshot, handed back on restore so the
/// caller can rebind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConnection {
    pub provider: String,
    pub model: String,
    pub base_url: String,
}

pub fn new_session_id() -> String {
    Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string()
}

impl Session {
    pub fn capture(id: &str, conversation: &Conversation, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            timestamp: Utc::now(),
            provider: conversation.provider().to_string(),
            model: conversation.model().to_string(),
            base_url: base_url.to_string(),
            messages: conversation.messages().to_vec(),
            history: conversation.history().to_vec(),
        }
    }

    /// Replace the conversation's transcript and history with this snapshot.
    pub fn restore_into(&self, conversation: &mut Conversation) -> SessionConnection {
        conversation.replace(self.messages.clone(), self.history.clone());
        conversation.set_connection(self.provider.clone(), self.model.clone());
        SessionConnection {
            provider: self.provider.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }

    pub fn turn_count(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Text searched by [`SessionStore::search`]: every user and assistant
    /// message.
    fn searchable_text(&self) -> String {
        self.messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }
}

/// Listing row for a saved session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub turns: usize,
    pub preview: String,
}

impl SessionSummary {
    fn from_session(path: PathBuf, session: &Session) -> Self {
        let preview: String = session
            .first_user_text()
            .unwrap_or_default()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(60)
            .collect();
        Self {
            path,
            id: session.id.clone(),
            timestamp: session.timestamp,
            provider: session.provider.clone(),
            model: session.model.clone(),
            turns: session.turn_count(),
            preview,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{}  {}/{}  ({} turns)  {}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.provider,
            self.model,
            self.turns,
            self.preview
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_dir() -> Result<PathBuf, SessionError> {
        project_dirs()
            .map(|dirs| dirs.data_dir().join("sessions"))
            .ok_or(SessionError::NoDataDir)
    }

    /// A store for the configured directory, or `None` when persistence is
    /// switched off.
    pub fn from_settings(settings: &SessionSettings) -> Result<Option<Self>, SessionError> {
        if !settings.enabled {
            return Ok(None);
        }
        let dir = match &settings.directory {
            Some(dir) => dir.clone(),
            None => Self::default_dir()?,
        };
        Ok(Some(Self::new(dir)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{id}.{FILE_EXTENSION}"))
    }

    pub fn save(&self, session: &Session) -> Result<PathBuf, SessionError> {
        let io_error = |source| SessionError::Io {
            path: self.dir.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_error)?;

        let contents = serde_json::to_vec_pretty(session).map_err(SessionError::Encode)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(io_error)?;
        temp_file
            .write_all(&contents)
            .and_then(|_| temp_file.as_file_mut().sync_all())
            .map_err(io_error)?;

        let path = self.path_for(&session.id);
        temp_file.persist(&path).map_err(|err| SessionError::Io {
            path: path.clone(),
            source: err.error,
        })?;
        debug!(path = %path.display(), turns = session.turn_count(), "session saved");
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Session, SessionError> {
        let contents = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SessionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_latest(&self) -> Result<Session, SessionError> {
        self.load_all()?
            .into_iter()
            .next()
            .map(|(_, session)| session)
            .ok_or(SessionError::NotFound)
    }

    /// Every readable snapshot, newest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        Ok(self
            .load_all()?
            .into_iter()
            .map(|(path, session)| SessionSummary::from_session(path, &session))
            .collect())
    }

    /// Snapshots whose transcript mentions `query`, newest first.
    ///
    /// Exact search is a case-sensitive substring match. Fuzzy search also
    /// ignores case and accepts near-miss spellings of each query word.
    pub fn search(&self, query: &str, exact: bool) -> Result<Vec<SessionSummary>, SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::EmptyQuery);
        }

        Ok(self
            .load_all()?
            .into_iter()
            .filter(|(_, session)| {
                let text = session.searchable_text();
                if exact {
                    text.contains(query)
                } else {
                    fuzzy_matches(&text, query)
                }
            })
            .map(|(path, session)| SessionSummary::from_session(path, &session))
            .collect())
    }

    /// Offer saved sessions (all of them, or those matching `query`) to the
    /// chooser and load the one picked. `Ok(None)` when the user backs out.
    pub fn choose(
        &self,
        chooser: &dyn Chooser,
        query: Option<&str>,
        exact: bool,
    ) -> Result<Option<Session>, SessionError> {
        let candidates = match query {
            Some(query) => self.search(query, exact)?,
            None => self.list()?,
        };
        if candidates.is_empty() {
            return Err(SessionError::NotFound);
        }

        let labels: Vec<String> = candidates.iter().map(SessionSummary::label).collect();
        let picked = chooser
            .select("Select a session", &labels)
            .map_err(|source| SessionError::Io {
                path: self.dir.clone(),
                source,
            })?;

        match picked.and_then(|index| candidates.get(index)) {
            Some(summary) => self.load(&summary.path).map(Some),
            None => Ok(None),
        }
    }

    /// Delete every snapshot. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize, SessionError> {
        let mut removed = 0;
        for path in self.session_files()? {
            fs::remove_file(&path).map_err(|source| SessionError::Io { path, source })?;
            removed += 1;
        }
        Ok(removed)
    }

    fn session_files(&self) -> Result<Vec<PathBuf>, SessionError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_session_file(path))
            .collect())
    }

    fn load_all(&self) -> Result<Vec<(PathBuf, Session)>, SessionError> {
        let mut sessions: Vec<(PathBuf, Session)> = self
            .session_files()?
            .into_iter()
            .filter_map(|path| match self.load(&path) {
                Ok(session) => Some((path, session)),
                Err(err) => {
                    warn!("Skipping unreadable session: {err}");
                    None
                }
            })
            .collect();
        sessions.sort_by(|(_, a), (_, b)| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }
}

fn is_session_file(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX));
    let ext_ok = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == FILE_EXTENSION);
    name_ok && ext_ok && path.is_file()
}

fn fuzzy_matches(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    let query = query.to_lowercase();
    if text.contains(&query) {
        return true;
    }

    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    query.split_whitespace().all(|wanted| {
        words
            .iter()
            .any(|word| strsim::jaro_winkler(wanted, word) >= FUZZY_THRESHOLD)
    })
}
