//! Error types for wildprompt
//!
//! This module defines all error types used throughout the wildcard engine.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for wildcard engine operations.
#[derive(Error, Debug)]
pub enum WildError {
    /// Configuration-related errors (invalid config, unreadable config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A wildcard source file could not be read or decoded.
    #[error("Source error: {path}: {message}")]
    Source { path: PathBuf, message: String },

    /// A structured (.yaml/.yml) source failed to parse.
    #[error("Structured source error: {path}: {source}")]
    Structured {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization errors outside a specific source file
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Resource not found (wildcard keys, config files, etc.)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A specialized `Result` type for wildcard engine operations.
pub type Result<T> = std::result::Result<T, WildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WildError::Config("missing wildcard directory".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing wildcard directory"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let wild_err: WildError = io_err.into();
        assert!(matches!(wild_err, WildError::Io(_)));
    }

    #[test]
    fn test_source_error_display() {
        let err = WildError::Source {
            path: PathBuf::from("/wildcards/fruit.txt"),
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("fruit.txt"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
