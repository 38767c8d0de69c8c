//! Docproof Common Library
//!
//! Shared types, configuration, and errors for the Docproof validator.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CommandPolicy, DestructivePattern, ValidatorConfig, VisualSettings};
pub use error::{Error, Result};
pub use types::*;

/// Docproof version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file for a scan root
pub fn default_config_path(root: &std::path::Path) -> std::path::PathBuf {
    root.join(config::CONFIG_FILE_NAME)
}
