//! Error types for conference operations

use thiserror::Error;

/// Result type for conference operations
pub type Result<T> = std::result::Result<T, ConferenceError>;

/// Errors reported synchronously by conference operations
///
/// Asynchronous failures (focus call errors, failed transfers) are never
/// returned here; they arrive later as call notifications and show up in
/// subsequent `is_in`/`size` queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConferenceError {
    /// The call or conference is not in a state that permits the operation
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// No participant matches the given call or address
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The signaling layer failed to place, transfer or refer a call
    #[error("Transport error: {message}")]
    TransportError { message: String },

    /// Sound device resources are held by another call
    #[error("Resource locked: {message}")]
    ResourceLocked { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A SIP address could not be parsed
    #[error("Invalid SIP address: {input}")]
    InvalidAddress { input: String },

    /// The conference host task is gone
    #[error("Conference host has shut down")]
    HostClosed,
}

impl ConferenceError {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    /// Create a resource locked error
    pub fn resource_locked(message: impl Into<String>) -> Self {
        Self::ResourceLocked {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(input: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
        }
    }

    /// Whether the caller may retry once a pending transition completes
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::ResourceLocked { .. })
    }
}

impl From<config::ConfigError> for ConferenceError {
    fn from(err: config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ConferenceError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::HostClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ConferenceError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::HostClosed
    }
}
