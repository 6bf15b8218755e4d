use crate::error::LlmError;
use crate::llm::{Message, ModelClient, Role};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const OFFLINE_NAME: &str = "Offline";

/// Always-available fallback that echoes the latest user message.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineClient;

impl OfflineClient {
    pub fn new() -> Self {
        Self
    }

    pub fn reply(messages: &[Message]) -> String {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        format!(
            "(offline demo) I can't reach a model right now, but I received: {}",
            last
        )
    }
}

#[async_trait]
impl ModelClient for OfflineClient {
    fn name(&self) -> &str {
        OFFLINE_NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        _cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        Ok(Self::reply(messages))
    }
}
