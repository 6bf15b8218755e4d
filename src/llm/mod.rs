pub mod offline;
pub mod ollama;
pub mod openai;

pub use offline::OfflineClient;
pub use ollama::OllamaClient;
pub use openai::OpenAICompatibleClient;

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// A chat backend. Implementations perform their own network exchange and
/// report failures through [`LlmError`]; they never touch persistence.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Stable name used for selection and display
    fn name(&self) -> &str;

    /// Send the whole conversation and return the reply text.
    ///
    /// Firing `cancel` aborts the in-flight request with [`LlmError::Cancelled`].
    async fn chat(&self, messages: &[Message], cancel: &CancellationToken)
        -> Result<String, LlmError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "Role")]
    pub role: Role,
    #[serde(alias = "Content")]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
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

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Wire shape shared by every role/content chat protocol.
#[derive(Serialize)]
pub(crate) struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

pub(crate) fn wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .collect()
}

/// Normalize `base_url` to end with exactly one `/`, and report whether it
/// already ends in the `segment` namespace (compared case-insensitively).
pub(crate) fn normalize_base(base_url: &str, segment: &str) -> (String, bool) {
    let trimmed = base_url.trim().trim_end_matches('/');
    let has_segment = trimmed
        .rsplit('/')
        .next()
        .is_some_and(|last| last.eq_ignore_ascii_case(segment));
    (format!("{}/", trimmed), has_segment)
}
