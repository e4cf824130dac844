//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ListenerOptions;
use crate::config::validation::{validate_options, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate listener options from a TOML file.
pub fn load_options(path: &Path) -> Result<ListenerOptions, ConfigError> {
    let content = fs::read_to_string(path)?;
    let options: ListenerOptions = toml::from_str(&content)?;

    validate_options(&options).map_err(ConfigError::Validation)?;

    Ok(options)
}
