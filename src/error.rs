//! Error taxonomy shared by every layer of the orchestration core.

use thiserror::Error;

/// Result type alias using the core's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Severity classes referenced by the circuit breaker, retry policy, and
/// `QueryResponse.errors[]` reporting. Every [`Error`] variant maps to
/// exactly one kind via [`Error::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network blips, rate limits. Recovered locally by retry-with-backoff.
    Transient,
    /// Agent failure with a viable fallback (alternate agent, cached result).
    Recoverable,
    /// Storage corruption, config violation, unsupported reasoning mode.
    Critical,
    /// Cooperative cancellation.
    Cancelled,
    /// Query- or call-scoped deadline exceeded.
    Timeout,
}

/// Errors that can occur during orchestration core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("agent '{agent}' failed: {message}")]
    AgentExecution {
        agent: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("model adapter error ({provider}): {message}")]
    ModelAdapter { provider: String, message: String },

    #[error("search backend '{backend}' error: {message}")]
    SearchBackend { backend: String, message: String },

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("claim store error: {0}")]
    StorageError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported reasoning mode: {0}")]
    ReasoningModeError(String),

    #[error("planner produced a cyclic task graph")]
    PlannerCycle,

    #[error("token budget exhausted: {resource}")]
    BudgetExhausted { resource: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn agent_execution(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentExecution {
            agent: agent.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn agent_execution_with_source(
        agent: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::AgentExecution {
            agent: agent.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn model_adapter(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelAdapter {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn search_backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SearchBackend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn budget_exhausted(resource: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            resource: resource.into(),
        }
    }

    /// Classify this error into the taxonomy defined by the error-handling
    /// design: every concrete variant maps to exactly one severity class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AgentExecution { .. } => ErrorKind::Recoverable,
            Error::ModelAdapter { .. } => ErrorKind::Transient,
            Error::SearchBackend { .. } => ErrorKind::Transient,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::StorageError(_) => ErrorKind::Critical,
            Error::Serialization(_) => ErrorKind::Critical,
            Error::Sqlite(_) => ErrorKind::Critical,
            Error::Config(_) => ErrorKind::Critical,
            Error::ReasoningModeError(_) => ErrorKind::Critical,
            Error::PlannerCycle => ErrorKind::Critical,
            Error::BudgetExhausted { .. } => ErrorKind::Recoverable,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Critical,
        }
    }

    /// The component-facing type tag used in `QueryResponse.errors[].type`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Error::AgentExecution { .. } => "AgentError",
            Error::ModelAdapter { .. } => "ModelAdapterError",
            Error::SearchBackend { .. } => "SearchBackendError",
            Error::Timeout { .. } => "TimeoutError",
            Error::StorageError(_) => "StorageError",
            Error::Serialization(_) => "SerializationError",
            Error::Sqlite(_) => "StorageError",
            Error::Config(_) => "ConfigError",
            Error::ReasoningModeError(_) => "ReasoningModeError",
            Error::PlannerCycle => "PlannerCycleError",
            Error::BudgetExhausted { .. } => "BudgetExhaustedError",
            Error::Cancelled => "CancelledError",
            Error::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classifies_as_timeout() {
        assert_eq!(Error::timeout(10).kind(), ErrorKind::Timeout);
    }

    #[test]
    fn storage_errors_are_critical() {
        assert_eq!(
            Error::StorageError("disk full".into()).kind(),
            ErrorKind::Critical
        );
    }

    #[test]
    fn reasoning_mode_error_fails_fast_as_critical() {
        let err = Error::ReasoningModeError("quantum".into());
        assert_eq!(err.kind(), ErrorKind::Critical);
        assert_eq!(err.type_tag(), "ReasoningModeError");
    }
}
