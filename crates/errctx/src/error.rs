//! Error types for registry setup and configuration.
//!
//! The builder API on [`ErrorContext`](crate::ErrorContext) never returns
//! these; misuse there degrades to no-ops. Only fallible setup paths do.
use thiserror::Error;

/// Result type for setup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or building a [`Registry`](crate::Registry)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// An environment variable holds a value that cannot be parsed
    #[error("Invalid value '{value}' for environment variable {var}")]
    InvalidEnv {
        /// The variable name
        var: &'static str,
        /// The raw value found in the environment
        value: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an environment parsing error
    pub fn invalid_env<S: Into<String>>(var: &'static str, value: S) -> Self {
        Self::InvalidEnv {
            var,
            value: value.into(),
        }
    }
}
