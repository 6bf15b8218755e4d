use crate::error::ConfigError;
use directories::BaseDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const HOME_ENV: &str = "MAGUS_HOME";
const HOME_DIR_NAME: &str = ".magus";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub persona_file: String,
    pub memory: MemoryConfig,
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub file: String,
    pub max_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub lm_studio_base_url: String,
    pub lm_studio_model: String,
    pub cloud_base_url: String,
    pub cloud_model: String,
    pub cloud_api_key_env: Option<String>,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    /// Read `path`, writing the defaults there first if it does not exist.
    /// An unreadable or malformed file falls back to the defaults.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_string_pretty(&config)?)?;
            return Ok(config);
        }

        let parsed = fs::read_to_string(path)
            .map_err(ConfigError::from)
            .and_then(|text| serde_json::from_str::<Self>(&text).map_err(ConfigError::from));

        match parsed {
            Ok(config) => config.validated(),
            Err(e) => {
                tracing::warn!("Ignoring config at {:?}: {}", path, e);
                Ok(Self::default())
            }
        }
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.memory.file.trim().is_empty() {
            return Err(ConfigError::MissingRequired("memory.file".into()));
        }
        if self.backends.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("backends.request_timeout_secs".into()));
        }
        Ok(self)
    }

    pub fn memory_path(&self, home: &Path) -> PathBuf {
        home.join(&self.memory.file)
    }
}

impl BackendsConfig {
    /// Look up the cloud API key in the configured environment variable.
    pub fn resolve_cloud_api_key(&self) -> Option<SecretString> {
        let var = self.cloud_api_key_env.as_deref()?.trim();
        if var.is_empty() {
            return None;
        }
        std::env::var(var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
    }
}

/// `$MAGUS_HOME`, else `~/.magus`.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(HOME_DIR_NAME))
        .ok_or_else(|| ConfigError::MissingRequired("home directory".into()))
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

pub fn ensure_home(home: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(home.join("personas"))?;
    fs::create_dir_all(home.join("memory"))?;
    Ok(())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persona_file: "personas/persona1.md".to_string(),
            memory: MemoryConfig::default(),
            backends: BackendsConfig::default(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            file: "memory/conversation.jsonl".to_string(),
            max_messages: 24,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
            ollama_model: "qwen2.5:7b".to_string(),
            lm_studio_base_url: "http://127.0.0.1:1234/v1".to_string(),
            lm_studio_model: "llama-3.1-8b-instruct".to_string(),
            cloud_base_url: "https://api.openai.com/v1".to_string(),
            cloud_model: "gpt-4o-mini".to_string(),
            cloud_api_key_env: Some("OPENAI_API_KEY".to_string()),
            request_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.memory.max_messages, 24);
        assert_eq!(config.backends.ollama_model, "qwen2.5:7b");
        assert_eq!(config.backends.cloud_api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = config_path(dir.path());
        let config = AppConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.persona_file, "personas/persona1.md");

        let reloaded = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(reloaded.backends.cloud_model, config.backends.cloud_model);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = config_path(dir.path());
        let partial = r#"{"backends":{"ollama_model":"llama3:8b"},"memory":{"max_messages":8}}"#;
        fs::write(&path, partial).unwrap();

        let config = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(config.backends.ollama_model, "llama3:8b");
        assert_eq!(config.backends.ollama_base_url, "http://127.0.0.1:11434");
        assert_eq!(config.memory.max_messages, 8);
        assert_eq!(config.memory.file, "memory/conversation.jsonl");
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = config_path(dir.path());
        fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(config.memory.max_messages, 24);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        let path = config_path(dir.path());
        fs::write(&path, r#"{"backends":{"request_timeout_secs":0}}"#).unwrap();
        assert!(matches!(
            AppConfig::load_or_create(&path),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_resolve_cloud_api_key() {
        let mut backends = BackendsConfig {
            cloud_api_key_env: Some("MAGUS_TEST_CLOUD_KEY".to_string()),
            ..BackendsConfig::default()
        };
        std::env::set_var("MAGUS_TEST_CLOUD_KEY", "sk-123");
        let key = backends.resolve_cloud_api_key().unwrap();
        assert_eq!(key.expose_secret(), "sk-123");

        std::env::set_var("MAGUS_TEST_CLOUD_KEY", "  ");
        assert!(backends.resolve_cloud_api_key().is_none());
        std::env::remove_var("MAGUS_TEST_CLOUD_KEY");

        backends.cloud_api_key_env = None;
        assert!(backends.resolve_cloud_api_key().is_none());
    }

    #[test]
    fn test_ensure_home_creates_layout() {
        let dir = TempDir::new().unwrap();
        ensure_home(dir.path()).unwrap();
        assert!(dir.path().join("personas").is_dir());
        assert!(dir.path().join("memory").is_dir());
    }
}
