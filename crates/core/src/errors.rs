use thiserror::Error;

/// Invocation arrived without the free text the command needs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("`{command}` was invoked without a question")]
pub struct UsageError {
    pub command: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendErrorKind {
    Transport,
    Timeout,
    Service,
    MalformedResponse,
}

impl BackendErrorKind {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Service => "service",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

/// Failure of the knowledge answering backend. `Display` is the raw description so it
/// can be interpolated into the user-facing reply unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{description}")]
pub struct BackendError {
    kind: BackendErrorKind,
    description: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, description: impl Into<String>) -> Self {
        Self { kind, description: description.into() }
    }

    pub fn transport(description: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Transport, description)
    }

    pub fn timeout(description: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, description)
    }

    pub fn service(description: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Service, description)
    }

    pub fn malformed(description: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::MalformedResponse, description)
    }

    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("parameter store unreachable while resolving `{name}`: {description}")]
    Unreachable { name: String, description: String },
    #[error("parameter `{name}` does not exist")]
    NotFound { name: String },
    #[error("parameter `{name}` has no value")]
    Empty { name: String },
}

impl ResolutionError {
    pub fn name(&self) -> &str {
        match self {
            Self::Unreachable { name, .. } | Self::NotFound { name } | Self::Empty { name } => name,
        }
    }
}
