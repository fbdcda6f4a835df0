//! Error types for the relay.
//!
//! A single enum covers configuration and I/O failures as well as the
//! per-request taxonomy of the query pipeline and the RPC gateway.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the relay.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// Errors are represented and propagated, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prompt rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The generation engine could not be reached or rejected the request
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The generation engine did not answer in time
    #[error("Engine timed out after {0:?}")]
    EngineTimeout(Duration),

    /// A generation step of the pipeline failed; no answer is produced
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The retrieval backend failed or timed out
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Inbound message body could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Inbound message names no reply destination
    #[error("Unroutable request: {0}")]
    UnroutableRequest(String),

    /// Broker connection could not be established or was lost
    #[error("Broker connection error: {0}")]
    BrokerConnection(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Errors after which the message is dropped without a reply.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            AppError::MalformedMessage(_) | AppError::UnroutableRequest(_)
        )
    }

    /// Errors that concern the broker connection rather than one message.
    pub fn is_connection(&self) -> bool {
        matches!(self, AppError::BrokerConnection(_))
    }

    /// Wrap an engine failure as a pipeline-level generation failure.
    pub fn into_generation_failed(self) -> AppError {
        match self {
            AppError::GenerationFailed(_) => self,
            other => AppError::GenerationFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
