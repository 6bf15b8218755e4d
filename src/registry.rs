use crate::config::BackendsConfig;
use crate::error::{ConfigError, LlmError};
use crate::llm::{Message, ModelClient, OfflineClient, OllamaClient, OpenAICompatibleClient};
use reqwest::Client;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const LM_STUDIO_NAME: &str = "Local (LM Studio)";
pub const CLOUD_NAME: &str = "Cloud (API)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Offline,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub name: String,
    pub kind: BackendKind,
    /// Base URL for network backends
    pub endpoint: Option<String>,
}

struct Entry {
    descriptor: BackendDescriptor,
    client: Arc<dyn ModelClient>,
}

/// Ordered set of chat backends with one active selection.
///
/// Entries are fixed at construction. Names are expected to be unique; lookups
/// resolve to the first match. No retry or cross-backend fallback happens here.
pub struct BackendRegistry {
    entries: Vec<Entry>,
    index: usize,
}

impl BackendRegistry {
    pub fn new(
        backends: Vec<(BackendDescriptor, Arc<dyn ModelClient>)>,
    ) -> Result<Self, ConfigError> {
        if backends.is_empty() {
            return Err(ConfigError::MissingRequired("at least one backend".to_string()));
        }
        let entries = backends
            .into_iter()
            .map(|(descriptor, client)| Entry { descriptor, client })
            .collect();
        Ok(Self { entries, index: 0 })
    }

    /// The standard set: local Ollama, local LM Studio, cloud, offline.
    pub fn from_config(
        config: &BackendsConfig,
        cloud_api_key: Option<SecretString>,
    ) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("request_timeout_secs ({})", e)))?;

        let ollama = OllamaClient::new(&config.ollama_base_url, &config.ollama_model)
            .with_client(http.clone());
        let lm_studio = OpenAICompatibleClient::new(
            &config.lm_studio_base_url,
            &config.lm_studio_model,
            LM_STUDIO_NAME,
            None,
        )
        .with_client(http.clone());
        let cloud = OpenAICompatibleClient::new(
            &config.cloud_base_url,
            &config.cloud_model,
            CLOUD_NAME,
            cloud_api_key,
        )
        .with_client(http);
        if !cloud.has_api_key() {
            tracing::info!("No API key for {}, requests will be unauthenticated", CLOUD_NAME);
        }

        Self::new(vec![
            network(ollama.base_url().to_string(), Arc::new(ollama)),
            network(lm_studio.endpoint().to_string(), Arc::new(lm_studio)),
            network(cloud.endpoint().to_string(), Arc::new(cloud)),
            offline(),
        ])
    }

    pub fn current(&self) -> &Arc<dyn ModelClient> {
        &self.entries[self.index].client
    }

    pub fn current_name(&self) -> &str {
        &self.entries[self.index].descriptor.name
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cycle(&mut self) {
        self.index = (self.index + 1) % self.entries.len();
        tracing::info!("Backend: {}", self.current_name());
    }

    /// Activate the first backend named `name`. Unknown names leave the
    /// selection unchanged; the return value reports whether one matched.
    pub fn select_by_name(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|e| e.descriptor.name == name) {
            Some(idx) => {
                self.index = idx;
                tracing::info!("Backend: {}", self.current_name());
                true
            }
            None => {
                tracing::debug!("No backend named {:?}, keeping {}", name, self.current_name());
                false
            }
        }
    }

    pub async fn chat(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        self.current().chat(messages, cancel).await
    }
}

fn network(
    endpoint: String,
    client: Arc<dyn ModelClient>,
) -> (BackendDescriptor, Arc<dyn ModelClient>) {
    let descriptor = BackendDescriptor {
        name: client.name().to_string(),
        kind: BackendKind::Network,
        endpoint: Some(endpoint),
    };
    (descriptor, client)
}

fn offline() -> (BackendDescriptor, Arc<dyn ModelClient>) {
    let client: Arc<dyn ModelClient> = Arc::new(OfflineClient::new());
    let descriptor = BackendDescriptor {
        name: client.name().to_string(),
        kind: BackendKind::Offline,
        endpoint: None,
    };
    (descriptor, client)
}
