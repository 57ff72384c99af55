//! Error types for the CryoSamba wizard core.
//!
//! Uses `thiserror` for public API error types. `ValidationError` covers
//! operator input that is rejected and re-prompted; `WizardError` covers
//! everything that can end a flow or reach the command boundary.

use std::path::PathBuf;

/// Top-level error type for the wizard core.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Experiment '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Experiment '{name}' not found")]
    NotFound { name: String },

    #[error("No accelerators were selected")]
    NoSelection,

    #[error("External process '{program}' failed: {message}")]
    ExternalProcess { program: String, message: String },

    #[error("Prompt failed: {message}")]
    Prompt { message: String },

    #[error("Interrupted by the operator")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Rejected operator input. Always recoverable by asking again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a valid integer.")]
    NotAnInteger { input: String },

    #[error("Please enter a valid number.")]
    NotANumber { input: String },

    #[error("Please enter a value between {min} and {max}.")]
    OutOfRange { min: String, max: String },

    #[error("Please enter an integer value multiple of {step}.")]
    NotMultiple { step: i64 },

    #[error("A value is required.")]
    Empty,

    #[error("Data path {path} is invalid. Try again.")]
    DataPathMissing { path: PathBuf },

    #[error("Extension {extension} is not supported. Try another path.")]
    UnsupportedExtension { extension: String },

    #[error(
        "Folder {path} does not contain any tif files. Only sequences of tif files are currently supported. Try another path."
    )]
    NoSliceFiles { path: PathBuf },

    #[error("Experiment name '{name}' is not allowed: {reason}")]
    InvalidName { name: String, reason: String },
}

/// Errors from loading wizard settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// A type alias for results using the top-level `WizardError`.
pub type Result<T> = std::result::Result<T, WizardError>;
