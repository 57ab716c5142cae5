//! Common error types for the board group manager

use thiserror::Error;

/// Common result type for bgm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the bgm crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML config file could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML config could not be serialized
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}
