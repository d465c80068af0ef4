//! Spec document retrieval and format sniffing.
//!
//! The cache only sees [`SpecFetcher`]; tests inject in-process fetchers so no network
//! or wall-clock is involved. [`HttpSpecFetcher`] is the production implementation.

use crate::config::{AuthConfig, SpecSourceConfig};
use crate::error::{Result, SpecToolsError};
use async_trait::async_trait;
use serde_json::Value;

/// Raw fetch result: body text plus whatever content-type hint the server gave.
#[derive(Debug, Clone)]
pub struct FetchedSpec {
    pub body: String,
    pub content_type: Option<String>,
}

/// Source of raw spec documents.
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchedSpec>;
}

/// Fetches the spec over HTTP(S) with optional auth and a body size cap.
pub struct HttpSpecFetcher {
    url: String,
    auth: Option<AuthConfig>,
    max_response_bytes: Option<usize>,
    client: reqwest::Client,
}

impl HttpSpecFetcher {
    #[must_use]
    pub fn new(config: &SpecSourceConfig) -> Self {
        Self {
            url: config.spec.clone(),
            auth: config.auth.clone(),
            max_response_bytes: config.max_response_bytes,
            client: reqwest::Client::new(),
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(AuthConfig::Bearer { token }) => request.bearer_auth(token),
            Some(AuthConfig::Header { name, value }) => request.header(name, value),
            Some(AuthConfig::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(AuthConfig::Query { name, value }) => request.query(&[(name, value)]),
            Some(AuthConfig::None) | None => request,
        }
    }

    async fn read_body_limited(&self, mut response: reqwest::Response) -> Result<String> {
        let Some(max) = self.max_response_bytes else {
            return response
                .text()
                .await
                .map_err(|e| SpecToolsError::SpecReadBody {
                    url: self.url.clone(),
                    message: e.to_string(),
                });
        };

        if let Some(len) = response.content_length()
            && len > max as u64
        {
            return Err(SpecToolsError::SpecReadBody {
                url: self.url.clone(),
                message: format!("response too large: {len} bytes (limit {max})"),
            });
        }

        let mut out: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SpecToolsError::SpecReadBody {
                url: self.url.clone(),
                message: e.to_string(),
            })?
        {
            if out.len().saturating_add(chunk.len()) > max {
                return Err(SpecToolsError::SpecReadBody {
                    url: self.url.clone(),
                    message: format!("response too large: exceeded {max} bytes"),
                });
            }
            out.extend_from_slice(&chunk);
        }

        String::from_utf8(out).map_err(|_| SpecToolsError::SpecReadBody {
            url: self.url.clone(),
            message: "response is not valid UTF-8".to_string(),
        })
    }
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self) -> Result<FetchedSpec> {
        tracing::info!(url = %self.url, "fetching OpenAPI spec");

        let request = self.apply_auth(self.client.get(&self.url));
        let response = request
            .send()
            .await
            .map_err(|e| SpecToolsError::SpecFetch {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpecToolsError::SpecStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = self.read_body_limited(response).await?;

        Ok(FetchedSpec { body, content_type })
    }
}

/// Parse a fetched body into a document, sniffing the format from the content-type.
///
/// A hint mentioning `json` tries JSON first, `yaml`/`yml` tries YAML first, and no
/// hint tries JSON then YAML. The hint orders the attempts but never disables the
/// fallback; only both parsers failing is fatal.
pub fn parse_spec_body(body: &str, content_type: Option<&str>, location: &str) -> Result<Value> {
    let hint = content_type.unwrap_or("").to_ascii_lowercase();
    let yaml_first = !hint.contains("json") && (hint.contains("yaml") || hint.contains("yml"));

    let parsed = if yaml_first {
        serde_yaml::from_str::<Value>(body)
            .map_err(|e| e.to_string())
            .or_else(|_| serde_json::from_str::<Value>(body).map_err(|e| e.to_string()))
    } else {
        serde_json::from_str::<Value>(body)
            .map_err(|e| e.to_string())
            .or_else(|_| serde_yaml::from_str::<Value>(body).map_err(|e| e.to_string()))
    };

    parsed.map_err(|message| SpecToolsError::SpecParse {
        location: location.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_with_json_hint() {
        let v = parse_spec_body(r#"{"openapi":"3.0.0"}"#, Some("application/json"), "t").unwrap();
        assert_eq!(v["openapi"], json!("3.0.0"));
    }

    #[test]
    fn test_parse_yaml_with_yaml_hint() {
        let v = parse_spec_body("openapi: '3.0.0'", Some("application/yaml"), "t").unwrap();
        assert_eq!(v["openapi"], json!("3.0.0"));
    }

    #[test]
    fn test_parse_yaml_without_hint_falls_back() {
        let v = parse_spec_body("openapi: '3.0.0'\ninfo:\n  title: x", None, "t").unwrap();
        assert_eq!(v["info"]["title"], json!("x"));
    }

    #[test]
    fn test_parse_json_despite_yaml_hint() {
        // Mislabeled but still parseable: the hint only orders the attempts.
        let v = parse_spec_body(r#"{"a": 1}"#, Some("text/yaml"), "t").unwrap();
        assert_eq!(v["a"], json!(1));
    }

    #[test]
    fn test_unparseable_body_is_fatal() {
        let err = parse_spec_body("{not: json: nor: yaml: [", Some("application/json"), "spec-url")
            .unwrap_err();
        assert!(matches!(err, SpecToolsError::SpecParse { .. }));
        assert!(err.to_string().contains("spec-url"));
    }
}
