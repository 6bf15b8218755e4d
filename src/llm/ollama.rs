use crate::error::{LlmError, MODEL_MISSING_HINT};
use crate::llm::{normalize_base, wire_messages, Message, ModelClient, WireMessage};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const OLLAMA_NAME: &str = "Local (Ollama)";
const API_SEGMENT: &str = "api";

/// One-shot readiness probe result. Written once per client, under the lock.
#[derive(Debug)]
enum Readiness {
    Unprobed,
    Ready,
    Failed(LlmError),
}

/// Client for a local Ollama daemon.
///
/// Before the first chat the model listing is fetched once to confirm the
/// configured model exists; the outcome is cached for the life of the client.
/// Chats go to `/api/chat` and fall back to `/api/generate` with a flattened
/// prompt when the structured endpoint is unreachable or refuses the request.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    has_api_segment: bool,
    model: String,
    readiness: Mutex<Readiness>,
}

enum StructuredOutcome {
    Reply(String),
    Unavailable(String),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        let (base_url, has_api_segment) = normalize_base(base_url, API_SEGMENT);
        Self {
            client: Client::new(),
            base_url,
            has_api_segment,
            model: model.into(),
            readiness: Mutex::new(Readiness::Unprobed),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> String {
        if self.has_api_segment {
            format!("{}{}", self.base_url, name)
        } else {
            format!("{}{}/{}", self.base_url, API_SEGMENT, name)
        }
    }

    async fn ensure_ready(&self) -> Result<(), LlmError> {
        let mut state = self.readiness.lock().await;
        match &*state {
            Readiness::Ready => return Ok(()),
            Readiness::Failed(e) => return Err(e.clone()),
            Readiness::Unprobed => {}
        }

        let outcome = self.probe().await;
        match &outcome {
            Ok(()) => {
                tracing::debug!("Ollama at {} has model {}", self.base_url, self.model);
                *state = Readiness::Ready;
            }
            Err(e) => {
                tracing::warn!("Ollama readiness check failed: {}", e);
                *state = Readiness::Failed(e.clone());
            }
        }
        outcome
    }

    async fn probe(&self) -> Result<(), LlmError> {
        let url = self.endpoint("tags");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::transport(&self.base_url, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let diagnostic = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body
            };
            return Err(LlmError::Protocol {
                status: status.as_u16(),
                body: diagnostic,
                hint: None,
            });
        }

        let tags: TagsResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse(format!("listing models at {}: {}", self.base_url, e))
        })?;

        let mut available: Vec<String> = tags
            .models
            .into_iter()
            .filter_map(|m| m.name)
            .filter(|n| !n.trim().is_empty())
            .collect();

        if available.iter().any(|n| same_model(n, &self.model)) {
            return Ok(());
        }

        available.sort();
        let suggestion = suggest_model_name(&self.model, &available);
        Err(LlmError::ModelNotFound {
            model: self.model.clone(),
            available,
            suggestion,
        })
    }

    async fn respond(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.ensure_ready().await?;

        match self.try_structured(messages).await? {
            StructuredOutcome::Reply(text) => Ok(text),
            StructuredOutcome::Unavailable(reason) => {
                tracing::debug!("Ollama /chat unavailable ({}), using /generate", reason);
                self.try_legacy(messages).await
            }
        }
    }

    async fn try_structured(&self, messages: &[Message]) -> Result<StructuredOutcome, LlmError> {
        let url = self.endpoint("chat");
        let request = ChatRequest {
            model: &self.model,
            messages: wire_messages(messages),
            stream: false,
        };

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => return Ok(StructuredOutcome::Unavailable(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(StructuredOutcome::Unavailable(format!("status {}", status)));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(StructuredOutcome::Unavailable(e.to_string())),
        };

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::parse(format!("{}: {}", url, e)))?;

        Ok(StructuredOutcome::Reply(
            parsed.message.and_then(|m| m.content).unwrap_or_default(),
        ))
    }

    async fn try_legacy(&self, messages: &[Message]) -> Result<String, LlmError> {
        let url = self.endpoint("generate");
        let prompt = flatten_prompt(messages);
        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::transport(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::transport(&url, e))?;

        if !status.is_success() {
            let hint = (status == StatusCode::NOT_FOUND).then(|| MODEL_MISSING_HINT.to_string());
            return Err(LlmError::Protocol {
                status: status.as_u16(),
                body,
                hint,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::parse(format!("{}: {}", url, e)))?;
        Ok(parsed.response.unwrap_or_default())
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn name(&self) -> &str {
        OLLAMA_NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        // Dropping `respond` mid-probe releases the lock with the state untouched.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = self.respond(messages) => result,
        }
    }
}

fn same_model(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Join every message as `role: content`, separated by blank lines.
pub fn flatten_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Suggest an available name for the common `name.2.5` vs `name2.5` typo.
pub fn suggest_model_name(model: &str, available: &[String]) -> Option<String> {
    let candidate = strip_version_separator(model);
    if candidate == model {
        return None;
    }
    available
        .iter()
        .find(|name| same_model(name, &candidate))
        .cloned()
}

// Drops a '.' sitting between a letter and the digit that starts a version.
fn strip_version_separator(model: &str) -> String {
    let chars: Vec<char> = model.chars().collect();
    let mut out = String::with_capacity(model.len());
    for (i, &c) in chars.iter().enumerate() {
        let between = c == '.'
            && i > 0
            && chars[i - 1].is_alphabetic()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if !between {
            out.push(c);
        }
    }
    out
}
