use crate::error::LlmError;
use crate::llm::{normalize_base, wire_messages, Message, ModelClient, WireMessage};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const VERSION_SEGMENT: &str = "v1";
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const TEMPERATURE: f64 = 0.7;

// Works with the OpenAI API and OpenAI-compatible servers (e.g. LM Studio).
pub struct OpenAICompatibleClient {
    client: Client,
    endpoint: String,
    model: String,
    name: String,
    api_key: Option<SecretString>,
}

impl OpenAICompatibleClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        name: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        let (base, has_version) = normalize_base(base_url, VERSION_SEGMENT);
        let endpoint = if has_version {
            format!("{}{}", base, CHAT_COMPLETIONS_PATH)
        } else {
            format!("{}{}/{}", base, VERSION_SEGMENT, CHAT_COMPLETIONS_PATH)
        };
        Self {
            client: Client::new(),
            endpoint,
            model: model.into(),
            name: name.into(),
            api_key,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: wire_messages(messages),
            temperature: TEMPERATURE,
            stream: false,
        };

        let mut req_builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");

        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.bearer_auth(api_key.expose_secret());
        }

        let response = req_builder
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::transport(&self.endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::transport(&self.endpoint, e))?;

        if !status.is_success() {
            return Err(LlmError::Protocol {
                status: status.as_u16(),
                body,
                hint: None,
            });
        }

        let chat_response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::parse(format!("{}: {}", self.endpoint, e)))?;

        chat_response
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| LlmError::parse(format!("no choices[0].message.content in {}", body)))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelClient for OpenAICompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = self.complete(messages) => result,
        }
    }
}
