pub mod config;
pub mod error;
pub mod llm;
pub mod persona;
pub mod registry;
pub mod session;
pub mod store;

pub use error::{ConfigError, LlmError, SessionError, StoreError};
pub use llm::{Message, ModelClient, Role};
pub use registry::{BackendDescriptor, BackendKind, BackendRegistry};
pub use session::ChatSession;
pub use store::ConversationStore;
