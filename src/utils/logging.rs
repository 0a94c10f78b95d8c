//! Plain-text transcript log (`--log FILE`, `/log`).

use crate::core::message::HistoryEntry;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
}

impl LoggingState {
    /// A file given on the command line starts logging immediately.
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn Error>> {
        let mut logging = LoggingState {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            logging.set_log_file(path)?;
        }
        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn Error>> {
        // Fail early if the file cannot be created
        Self::test_file_access(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn Error>> {
        match &self.file_path {
            Some(path) => {
                if self.is_active {
                    self.log_message("## Logging paused")?;
                    self.is_active = false;
                    Ok(format!("Logging paused (file: {path})"))
                } else {
                    self.is_active = true;
                    Ok(format!("Logging resumed to: {path}"))
                }
            }
            None => {
                Err("No log file specified. Use /log <filename> to enable logging first.".into())
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn log_turn(&self, user_text: &str, bot_text: &str) -> Result<(), Box<dyn Error>> {
        self.log_message(&format!("You: {user_text}"))?;
        self.log_message(bot_text)
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn Error>> {
        let Some(file_path) = self.active_path() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        write_block(&mut writer, content)?;
        writer.flush()?;
        Ok(())
    }

    /// Rewrite the whole log from the retained history, e.g. after a rewind
    /// or clear. The original file is only replaced once the new content is
    /// fully written.
    pub fn rewrite_from_history(&self, history: &[HistoryEntry]) -> Result<(), Box<dyn Error>> {
        let Some(file_path) = self.active_path() else {
            return Ok(());
        };

        let target_path = Path::new(file_path);
        let parent = target_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent)?;

        for entry in history.iter().skip(1) {
            write_block(&mut temp_file, &format!("You: {}", entry.user_text))?;
            write_block(&mut temp_file, &entry.bot_text)?;
        }

        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(file_path)?;
        Ok(())
    }

    pub fn get_status_string(&self) -> String {
        let name = |path: &str| {
            Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", name(path)),
            (Some(path), false) => format!("paused ({})", name(path)),
        }
    }

    fn active_path(&self) -> Option<&str> {
        self.file_path.as_deref().filter(|_| self.is_active)
    }

    fn test_file_access(path: &str) -> Result<(), Box<dyn Error>> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.flush()?;
        Ok(())
    }
}

/// Each message is followed by a blank line, matching the screen layout.
fn write_block<W: Write>(writer: &mut W, content: &str) -> std::io::Result<()> {
    for line in content.lines() {
        writeln!(writer, "{line}")?;
    }
    writeln!(writer)
}
