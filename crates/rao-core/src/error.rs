//! Unified error type for the remedial-action optimizer.
//!
//! Domain-specific errors (the linear problem's own error enum, for example)
//! convert into [`RaoError`] so callers can handle failures uniformly at API
//! boundaries.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{LinearOptimizerParameters, RaoResult};
//!
//! fn load(path: &std::path::Path) -> RaoResult<LinearOptimizerParameters> {
//!     let parameters = LinearOptimizerParameters::load_from(path)?;
//!     parameters.validate()?;
//!     Ok(parameters)
//! }
//! ```

use thiserror::Error;

/// Unified error type for all optimizer operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (parameter files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for RaoError {
    fn from(err: toml::de::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for RaoError {
    fn from(err: toml::ser::Error) -> Self {
        RaoError::Other(format!("cannot serialize parameters: {err}"))
    }
}
