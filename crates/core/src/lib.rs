pub mod config;
pub mod errors;
pub mod knowledge;
pub mod mrkdwn;
pub mod secrets;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::{BackendError, BackendErrorKind, ResolutionError, UsageError};
pub use knowledge::{AnswerPayload, Citation, GuardrailAction, KnowledgeClient, RetrievedReference};
pub use secrets::{unwrap_parameter_value, ParameterStore, SecretResolver};
