//! Error types for windowgate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for windowgate operations.
#[derive(Error, Debug)]
pub enum WindowgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller passed a subject or policy the limiter refuses to work with
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The subject has used up its quota for the current window
    #[error("Too many requests for '{subject}', retry after {}ms", retry_after.as_millis())]
    TooManyRequests {
        subject: String,
        retry_after: Duration,
    },

    /// Background task errors
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for WindowgateError {
    fn from(err: ::config::ConfigError) -> Self {
        WindowgateError::Config(err.to_string())
    }
}

/// Result type alias for windowgate operations.
pub type Result<T> = std::result::Result<T, WindowgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_requests_message() {
        let err = WindowgateError::TooManyRequests {
            subject: "u1".to_string(),
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "Too many requests for 'u1', retry after 1500ms");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: WindowgateError = io.into();
        assert!(matches!(err, WindowgateError::Io(_)));
    }
}
