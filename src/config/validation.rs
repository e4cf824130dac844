//! Configuration validation.

use thiserror::Error;

use crate::config::schema::ListenerOptions;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("backlog must be at least 1")]
    ZeroBacklog,
}

/// Validate listener options, collecting every violation.
pub fn validate_options(options: &ListenerOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if options.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if options.backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
