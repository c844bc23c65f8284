//! Error types for the engine

use thiserror::Error;

/// Engine error
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Strategy already registered for symbol {0}")]
    DuplicateStrategy(String),

    #[error("{kind} already engaged: {id}")]
    DuplicateCollaborator { kind: &'static str, id: String },

    #[error("Invalid bucket size: {0}")]
    InvalidBucketSize(usize),

    #[error("Unknown calculation: {0}")]
    UnknownCalculation(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Market client not found: {0}")]
    MarketClientNotFound(String),

    #[error("API not found: {0}")]
    ApiNotFound(String),

    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::engine::EngineState,
    },

    #[error("Event queue closed")]
    QueueClosed,

    #[error("Event queue full")]
    QueueFull,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Market client error: {0}")]
    MarketClient(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Configuration errors surface at setup time and are never retried.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::ConfigLoad(_)
                | EngineError::DuplicateStrategy(_)
                | EngineError::DuplicateCollaborator { .. }
                | EngineError::InvalidBucketSize(_)
                | EngineError::UnknownCalculation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
