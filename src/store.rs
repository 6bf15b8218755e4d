//! Append-only conversation log, one JSON-encoded message per line.

use crate::error::StoreError;
use crate::llm::{Message, Role};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub struct ConversationStore {
    path: PathBuf,
}

impl ConversationStore {
    /// Open the log at `path`, creating it and its parent directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return up to `max_count` of the most recent well-formed messages, oldest
    /// first. Blank and undecodable lines are skipped.
    pub fn load_recent(&self, max_count: usize) -> Result<Vec<Message>, StoreError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut window = VecDeque::with_capacity(max_count);
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    tracing::warn!("Skipping non-UTF-8 line {} in {:?}", line_no + 1, self.path);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(&line) {
                Ok(msg) => {
                    if window.len() == max_count {
                        window.pop_front();
                    }
                    window.push_back(msg);
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed line {} in {:?}: {}",
                        line_no + 1,
                        self.path,
                        e
                    );
                }
            }
        }

        Ok(window.into())
    }

    /// Durably append one user or assistant message.
    pub fn append(&self, message: &Message) -> Result<(), StoreError> {
        self.append_all(std::slice::from_ref(message))
    }

    /// Durably append `messages` with a single write, so an exchange lands
    /// whole or not at all. Nothing is written if any message is a system one.
    pub fn append_all(&self, messages: &[Message]) -> Result<(), StoreError> {
        if let Some(system) = messages.iter().find(|m| m.role == Role::System) {
            return Err(StoreError::NotPersistable(system.role));
        }
        if messages.is_empty() {
            return Ok(());
        }

        let mut batch = String::new();
        for message in messages {
            batch.push_str(&serde_json::to_string(message)?);
            batch.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(batch.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}
