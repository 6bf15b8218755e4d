use crate::llm::Role;
use thiserror::Error;

const NO_MODELS_MARKER: &str = "(no models listed; pull one with `ollama pull <model>`)";
pub const MODEL_MISSING_HINT: &str = "model name may be missing locally";

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("could not reach {url}: {cause}")]
    Transport { url: String, cause: String },

    #[error("server returned {status}: {body}{}", hint_suffix(.hint))]
    Protocol {
        status: u16,
        body: String,
        hint: Option<String>,
    },

    #[error(
        "model '{model}' not found. Available: {}.{}",
        available_list(.available),
        suggestion_suffix(.suggestion)
    )]
    ModelNotFound {
        model: String,
        available: Vec<String>,
        suggestion: Option<String>,
    },

    #[error("unexpected response: {context}")]
    Parse { context: String },

    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn transport(url: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            cause: cause.to_string(),
        }
    }

    pub fn parse(context: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!(" ({})", h))
        .unwrap_or_default()
}

fn available_list(available: &[String]) -> String {
    if available.is_empty() {
        NO_MODELS_MARKER.to_string()
    } else {
        available.join(", ")
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" Did you mean '{}'?", s))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0} messages are never persisted")]
    NotPersistable(Role),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config: {0}")]
    MissingRequired(String),

    #[error("invalid value for {0}")]
    InvalidValue(String),

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_lists_models_and_suggestion() {
        let err = LlmError::ModelNotFound {
            model: "qwen.2.5:7b".to_string(),
            available: vec!["llama3:8b".to_string(), "qwen2.5:7b".to_string()],
            suggestion: Some("qwen2.5:7b".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("llama3:8b, qwen2.5:7b"));
        assert!(text.ends_with("Did you mean 'qwen2.5:7b'?"));
    }

    #[test]
    fn test_model_not_found_empty_listing() {
        let err = LlmError::ModelNotFound {
            model: "m".to_string(),
            available: Vec::new(),
            suggestion: None,
        };
        assert!(err.to_string().contains("no models listed"));
    }

    #[test]
    fn test_protocol_error_hint() {
        let err = LlmError::Protocol {
            status: 404,
            body: "not found".to_string(),
            hint: Some(MODEL_MISSING_HINT.to_string()),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.to_string(),
            "server returned 404: not found (model name may be missing locally)"
        );

        let plain = LlmError::Protocol {
            status: 500,
            body: "boom".to_string(),
            hint: None,
        };
        assert_eq!(plain.to_string(), "server returned 500: boom");
    }

    #[test]
    fn test_not_persistable_names_role() {
        let err = StoreError::NotPersistable(Role::System);
        assert_eq!(err.to_string(), "system messages are never persisted");
    }
}
