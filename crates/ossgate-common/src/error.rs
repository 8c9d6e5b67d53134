//! Error types for configuration handling

use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration error
#[derive(Debug, Error)]
pub enum Error {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required config value: {0}")]
    MissingValue(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
