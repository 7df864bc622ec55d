//! Error types and handling for Auriga
//!
//! This module defines the error types used throughout the crate,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Auriga operations
pub type Result<T> = std::result::Result<T, AurigaError>;

/// Main error type for Auriga
#[derive(Debug, Error)]
pub enum AurigaError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Transport-level errors (connection, TLS, non-2xx status)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Errors reported by the remote vehicle API
    #[error("API error: {message}")]
    Api { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// An expected key was absent from a response body
    #[error("Missing field: {field}")]
    MissingField { field: String },

    /// A response field was present but had the wrong JSON type
    #[error("Type mismatch: {field} is not {expected}")]
    TypeMismatch { field: String, expected: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AurigaError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AurigaError::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AurigaError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        AurigaError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        AurigaError::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        AurigaError::Auth {
            message: message.into(),
        }
    }

    /// Create a new missing-field error
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        AurigaError::MissingField {
            field: field.into(),
        }
    }

    /// Create a new type-mismatch error
    pub fn type_mismatch<S: Into<String>>(field: S, expected: S) -> Self {
        AurigaError::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AurigaError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AurigaError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AurigaError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AurigaError {
    fn from(err: std::io::Error) -> Self {
        AurigaError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AurigaError {
    fn from(err: serde_yaml::Error) -> Self {
        AurigaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AurigaError {
    fn from(err: serde_json::Error) -> Self {
        AurigaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AurigaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AurigaError::timeout(err.to_string())
        } else {
            AurigaError::network(err.to_string())
        }
    }
}
