//! Error types for listener container operations.

use thiserror::Error;

/// Boxed error produced by message listeners and broker collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for all container lifecycle and dispatch operations
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Message '{message_id}' rejected: listener container is stopping")]
    RejectedWhileStopping { message_id: String },

    #[error("Listener execution failed: {source}")]
    ListenerExecutionFailed {
        #[source]
        source: BoxError,
    },

    #[error("Broker access failed during {operation}: {source}")]
    BrokerAccess {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Listener container has been shut down and cannot be restarted")]
    ContainerShutDown,
}

impl ListenerError {
    /// Wrap a failure raised by a message listener.
    ///
    /// A failure that already is a `ListenerExecutionFailed` is returned as is,
    /// so nested dispatch layers never wrap the same cause twice.
    pub fn wrap_listener_failure(error: BoxError) -> Self {
        match error.downcast::<ListenerError>() {
            Ok(listener_error) => match *listener_error {
                failure @ ListenerError::ListenerExecutionFailed { .. } => failure,
                other => ListenerError::ListenerExecutionFailed {
                    source: Box::new(other),
                },
            },
            Err(source) => ListenerError::ListenerExecutionFailed { source },
        }
    }

    /// Translate a collaborator failure into the generic broker access kind
    pub fn broker_access(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::BrokerAccess {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Check if the error is a configuration problem that no retry can fix
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::Validation(_) => true,
            Self::RejectedWhileStopping { .. } => false,
            Self::ListenerExecutionFailed { .. } => false,
            Self::BrokerAccess { .. } => false,
            Self::ContainerShutDown => true,
        }
    }

    /// Check if the broker-facing caller should requeue the message
    pub fn should_requeue(&self) -> bool {
        matches!(
            self,
            Self::RejectedWhileStopping { .. }
                | Self::ListenerExecutionFailed { .. }
                | Self::BrokerAccess { .. }
        )
    }

    /// Check if the error came out of the message listener itself
    pub fn is_listener_failure(&self) -> bool {
        matches!(self, Self::ListenerExecutionFailed { .. })
    }
}

/// Configuration errors detected while validating a container
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Conflicting configuration: {message}")]
    Conflict { message: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors for identifiers
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Errors during message body serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
