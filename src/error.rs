//! Error types for fixture generation.
//!
//! Every failure in the library surfaces as a [`FixtureError`]. Failures that
//! happen while producing a specific fixture are wrapped in
//! [`FixtureError::FixtureFailed`] so callers can tell which fixture broke.

use std::process::ExitStatus;
use thiserror::Error;

/// The main error type for fixture generation.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Filesystem operation failed
    #[error("Storage I/O error: {0}")]
    StorageError(#[from] std::io::Error),

    /// The external PKI tool could not be started
    #[error("Failed to run {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external PKI tool exited unsuccessfully
    #[error("{program} {subcommand} exited with {status}: {stderr}")]
    ToolError {
        program: String,
        subcommand: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Certificate generation or signing error
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Invalid key format or content
    #[error("Invalid key: {0}")]
    InvalidKeyError(String),

    /// PEM encoding/decoding error
    #[error("PEM error: {0}")]
    PemError(String),

    /// Invalid input data (subjects, extension files)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A single fixture could not be produced
    #[error("fixture generation failed for {name}: {source}")]
    FixtureFailed {
        name: String,
        #[source]
        source: Box<FixtureError>,
    },
}

impl FixtureError {
    /// Wrap an error with the name of the fixture being generated.
    pub fn for_fixture(name: &str, source: FixtureError) -> Self {
        FixtureError::FixtureFailed {
            name: name.to_string(),
            source: Box::new(source),
        }
    }
}

/// A specialized Result type for fixture generation.
pub type Result<T> = std::result::Result<T, FixtureError>;
