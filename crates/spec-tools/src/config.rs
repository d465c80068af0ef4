//! Configuration for a spec source.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the `OpenAPI` document this process serves queries over.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecSourceConfig {
    /// Spec location (URL).
    pub spec: String,

    /// Cache freshness window, in seconds. Past this age the next query triggers a
    /// refetch; the stale document remains usable as a fallback.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Authentication used when fetching the spec.
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Optional cap on the spec body size, in bytes.
    #[serde(default)]
    pub max_response_bytes: Option<usize>,
}

impl SpecSourceConfig {
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            ttl_secs: default_ttl_secs(),
            auth: None,
            max_response_bytes: None,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_ttl_secs() -> u64 {
    300
}

/// Authentication configuration for the spec fetch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Bearer token in the `Authorization` header.
    Bearer { token: String },
    /// Arbitrary header name/value.
    Header { name: String, value: String },
    /// HTTP basic auth.
    Basic { username: String, password: String },
    /// API key appended as a query parameter.
    Query { name: String, value: String },
    /// Explicitly unauthenticated.
    None,
}
