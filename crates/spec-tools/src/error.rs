//! Error types for `unrelated-spec-tools`.

use thiserror::Error;

/// Main error type for spec query tooling.
#[derive(Error, Debug)]
pub enum SpecToolsError {
    /// Configuration errors (invalid config, missing fields, conflicts).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Exact-match lookups that missed (path, method, or schema name).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller-supplied arguments (unknown section, bad pattern).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Spec error: failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("Spec error: failed to read spec body from '{url}': {message}")]
    SpecReadBody { url: String, message: String },

    #[error("Spec error: unexpected HTTP status {status} fetching '{url}'")]
    SpecStatus { url: String, status: u16 },

    #[error("Spec error: body from '{location}' is neither valid JSON nor valid YAML: {message}")]
    SpecParse { location: String, message: String },

    /// A coalesced refresh failed and no previously cached document was available.
    #[error("Spec refresh failed: {message}")]
    SpecRefresh { message: String },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for spec tooling operations.
pub type Result<T> = std::result::Result<T, SpecToolsError>;
