//! Error types for Docproof

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Docproof Error
pub type Result<T> = std::result::Result<T, Error>;

/// Docproof error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Unable to write configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid scan root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Root that does not exist.
    pub fn root_missing(path: impl Into<PathBuf>) -> Self {
        Error::InvalidRoot {
            path: path.into(),
            reason: "path does not exist".to_string(),
        }
    }

    /// Root that exists but is not a directory.
    pub fn root_not_dir(path: impl Into<PathBuf>) -> Self {
        Error::InvalidRoot {
            path: path.into(),
            reason: "path is not a directory".to_string(),
        }
    }
}
