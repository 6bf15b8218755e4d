use crate::error::SessionError;
use crate::llm::Message;
use crate::registry::BackendRegistry;
use crate::store::ConversationStore;
use tokio_util::sync::CancellationToken;

/// Caller-side chat flow: persona, recent history and the new user message go
/// to the active backend; the exchange is persisted only when a reply arrives.
pub struct ChatSession {
    registry: BackendRegistry,
    store: ConversationStore,
    persona: String,
    window: usize,
}

impl ChatSession {
    pub fn new(
        registry: BackendRegistry,
        store: ConversationStore,
        persona: impl Into<String>,
        window: usize,
    ) -> Self {
        Self {
            registry,
            store,
            persona: persona.into(),
            window,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    pub fn set_persona(&mut self, persona: impl Into<String>) {
        self.persona = persona.into();
    }

    pub fn history(&self) -> Result<Vec<Message>, SessionError> {
        Ok(self.store.load_recent(self.window)?)
    }

    pub fn build_request(&self, text: &str) -> Result<Vec<Message>, SessionError> {
        let mut messages = Vec::with_capacity(self.window + 2);
        messages.push(Message::system(self.persona.as_str()));
        messages.extend(self.store.load_recent(self.window)?);
        messages.push(Message::user(text));
        Ok(messages)
    }

    /// Send `text` to the active backend. Blank input is ignored (`Ok(None)`).
    pub async fn send(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let messages = self.build_request(text)?;
        let reply = match self.registry.chat(&messages, cancel).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Chat via {} failed: {}", self.registry.current_name(), e);
                return Err(e.into());
            }
        };

        self.store
            .append_all(&[Message::user(text), Message::assistant(reply.as_str())])?;
        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{ModelClient, Role};
    use crate::registry::{BackendDescriptor, BackendKind};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct RecordingClient {
        seen: Mutex<Vec<Vec<Message>>>,
        fail: bool,
    }

    #[async_trait]
    impl ModelClient for RecordingClient {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn chat(
            &self,
            messages: &[Message],
            _cancel: &CancellationToken,
        ) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            if self.fail {
                Err(LlmError::Transport {
                    url: "http://down/".to_string(),
                    cause: "connection refused".to_string(),
                })
            } else {
                Ok(format!("reply {}", self.seen.lock().unwrap().len()))
            }
        }
    }

    fn session(dir: &TempDir, fail: bool, window: usize) -> (ChatSession, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient {
            seen: Mutex::new(Vec::new()),
            fail,
        });
        let descriptor = BackendDescriptor {
            name: "recorder".to_string(),
            kind: BackendKind::Network,
            endpoint: None,
        };
        let backend: Arc<dyn ModelClient> = client.clone();
        let registry = BackendRegistry::new(vec![(descriptor, backend)]).unwrap();
        let store = ConversationStore::open(dir.path().join("conversation.jsonl")).unwrap();
        (ChatSession::new(registry, store, "persona", window), client)
    }

    #[tokio::test]
    async fn test_send_builds_request_and_persists() {
        let dir = TempDir::new().unwrap();
        let (session, client) = session(&dir, false, 2);
        let cancel = CancellationToken::new();

        let first = session.send("first", &cancel).await.unwrap();
        assert_eq!(first.as_deref(), Some("reply 1"));
        let second = session.send(" second ", &cancel).await.unwrap();
        assert_eq!(second.as_deref(), Some("reply 2"));

        let seen = client.seen.lock().unwrap();
        let last = &seen[1];
        assert_eq!(last.len(), 4);
        assert_eq!(last[0], Message::system("persona"));
        assert_eq!(last[1], Message::user("first"));
        assert_eq!(last[2], Message::assistant("reply 1"));
        assert_eq!(last[3], Message::user("second"));

        let history = session.history().unwrap();
        assert_eq!(history, vec![Message::user("second"), Message::assistant("reply 2")]);
        assert!(history.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn test_failed_chat_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let (session, _client) = session(&dir, true, 24);

        let err = session
            .send("hello", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Llm(LlmError::Transport { .. })));
        assert!(session.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let dir = TempDir::new().unwrap();
        let (session, client) = session(&dir, false, 24);

        assert_eq!(session.send("   ", &CancellationToken::new()).await.unwrap(), None);
        assert!(client.seen.lock().unwrap().is_empty());
    }
}
