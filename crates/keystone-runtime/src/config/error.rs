//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension has no enabled format feature.
    #[error("Unsupported or disabled configuration file format: .{0}")]
    UnsupportedFormat(String),

    /// A source could not be parsed or extracted into [`KeystoneConfig`](super::KeystoneConfig).
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A value parsed but is not acceptable.
    #[error("Invalid configuration: {message}")]
    Validation { message: String },

    /// A plugin section is keyed by something that cannot be a plugin id.
    #[error("Invalid plugin id in configuration: '{0}'")]
    InvalidPluginId(String),
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
