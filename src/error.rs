//! Error types for the tiered cache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The sizing engine could not measure a key or value
    #[error("Size measurement failed: {0}")]
    SizeMeasurementFailure(String),

    /// The copy strategy could not produce a copy
    #[error("Copy failed: {0}")]
    CopyFailure(String),

    /// A resource pool descriptor was structurally invalid
    #[error("Configuration rejected: {0}")]
    ConfigurationRejected(String),

    // =========================================================================
    // Settings Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML settings parse error
    #[error("Failed to parse YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON settings parse error
    #[error("Failed to parse JSON settings: {0}")]
    Json(#[from] serde_json::Error),
}
