//! Error types for the data access layer
//!
//! Errors fall into four families: configuration errors raised while a
//! criteria is being built, execution errors coming back from the database,
//! connection errors from the resource manager, and validation errors raised
//! by caller supplied interceptors.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for data access operations
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Invalid metadata, malformed fetch path or exceeded join depth
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A field name with no persistent field behind it
    #[error("Invalid field '{field}' for entity '{entity}'")]
    InvalidField { entity: String, field: String },

    /// A condition template that cannot be scanned
    #[error("Invalid criteria. Check the conditions syntax: {0}")]
    MalformedCondition(String),

    /// Caller input rejected before reaching the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raw driver error
    #[error("Database error: {0}")]
    Database(String),

    /// Driver error wrapped with the operation that triggered it
    #[error("Occurred a problem in the {operation}: {message}")]
    Execution {
        operation: &'static str,
        message: String,
    },

    /// A write by identity touched no rows
    #[error("No record was {operation}.")]
    NoRecordAffected { operation: &'static str },

    /// Update or delete of an entity that was never persisted
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    /// Failure to acquire or finalize the physical connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Business rule violation raised by an interceptor
    #[error("Validation error: {0}")]
    Validation(String),

    /// Interceptor infrastructure failure
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// Value conversion failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Attach operation context to driver errors, leaving every other kind untouched
    pub fn in_operation(self, operation: &'static str) -> Self {
        match self {
            ModelError::Database(message) => ModelError::Execution { operation, message },
            other => other,
        }
    }

    /// Whether this error was raised while building metadata or criteria
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ModelError::Configuration(_)
                | ModelError::InvalidField { .. }
                | ModelError::MalformedCondition(_)
        )
    }

    pub(crate) fn invalid_field(entity: &str, field: &str) -> Self {
        ModelError::InvalidField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}
