//! Configuration management.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_options, ConfigError};
pub use schema::ListenerOptions;
pub use validation::{validate_options, ValidationError};
