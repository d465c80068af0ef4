//! Query operations over the cached document and indexes.
//!
//! Every operation goes through [`SpecCache::entry`] first, so the freshness and
//! fallback rules in [`crate::cache`] apply uniformly; nothing here reads the document
//! outside a cache entry.

use crate::cache::SpecCache;
use crate::error::{Result, SpecToolsError};
use crate::index::{EndpointEntry, METHOD_ORDER, SchemaEntry};
use crate::resolver::{DEFAULT_MAX_DEPTH, RefResolver};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Page size applied when a search gives no explicit limit.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Valid `section` values for [`SpecExplorer::spec_section`].
pub const SECTIONS: [&str; 6] = ["info", "paths", "components", "tags", "servers", "full"];

/// Endpoint search criteria. All filters are optional and compose as logical AND.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointFilter {
    /// Case-insensitive regex matched against the endpoint path.
    pub path_pattern: Option<String>,
    /// Exact HTTP verb, matched case-insensitively.
    pub method: Option<String>,
    /// Tag set; an endpoint matches when it shares at least one tag (OR semantics).
    pub tags: Option<Vec<String>>,
    /// Case-insensitive regex matched against the summary or the description.
    pub description: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Schema search criteria.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaFilter {
    /// Case-insensitive regex matched against the schema name.
    pub name_pattern: Option<String>,
    /// Case-insensitive substring matched against any property name.
    pub property_name: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Filtered count before slicing, independent of limit/offset.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct EndpointPage {
    pub endpoints: Vec<EndpointEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct SchemaPage {
    pub schemas: Vec<SchemaEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct EndpointDetails {
    /// The operation object, with path-level and operation-level parameters merged.
    pub endpoint: Value,
}

#[derive(Debug, Serialize)]
pub struct SchemaDetails {
    pub name: String,
    pub schema: Value,
}

/// Query engine over one [`SpecCache`].
pub struct SpecExplorer {
    cache: Arc<SpecCache>,
}

impl SpecExplorer {
    #[must_use]
    pub fn new(cache: Arc<SpecCache>) -> Self {
        Self { cache }
    }

    /// Filter the endpoint index and return one page of matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a supplied pattern is not a valid regex or the document
    /// cannot be loaded.
    pub async fn search_endpoints(&self, filter: &EndpointFilter) -> Result<EndpointPage> {
        let entry = self.cache.entry().await?;
        let mut matches: Vec<&EndpointEntry> = entry.endpoints.iter().collect();

        if let Some(pattern) = &filter.path_pattern {
            let re = ci_regex(pattern, "pathPattern")?;
            matches.retain(|e| re.is_match(&e.path));
        }
        if let Some(method) = &filter.method {
            matches.retain(|e| e.method.eq_ignore_ascii_case(method));
        }
        if let Some(tags) = &filter.tags
            && !tags.is_empty()
        {
            matches.retain(|e| {
                e.tags
                    .as_ref()
                    .is_some_and(|entry_tags| entry_tags.iter().any(|t| tags.contains(t)))
            });
        }
        if let Some(pattern) = &filter.description {
            let re = ci_regex(pattern, "description")?;
            matches.retain(|e| {
                e.summary.as_deref().is_some_and(|s| re.is_match(s))
                    || e.description.as_deref().is_some_and(|d| re.is_match(d))
            });
        }

        let (endpoints, pagination) = paginate(matches, filter.limit, filter.offset);
        Ok(EndpointPage {
            endpoints,
            pagination,
        })
    }

    /// Filter the schema index and return one page of matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the name pattern is not a valid regex or the document
    /// cannot be loaded.
    pub async fn search_schemas(&self, filter: &SchemaFilter) -> Result<SchemaPage> {
        let entry = self.cache.entry().await?;
        let mut matches: Vec<&SchemaEntry> = entry.schemas.iter().collect();

        if let Some(pattern) = &filter.name_pattern {
            let re = ci_regex(pattern, "namePattern")?;
            matches.retain(|s| re.is_match(&s.name));
        }
        if let Some(property) = &filter.property_name {
            let needle = property.to_lowercase();
            matches.retain(|s| {
                s.property_names
                    .as_ref()
                    .is_some_and(|props| props.iter().any(|p| p.to_lowercase().contains(&needle)))
            });
        }

        let (schemas, pagination) = paginate(matches, filter.limit, filter.offset);
        Ok(SchemaPage {
            schemas,
            pagination,
        })
    }

    /// Look up one operation by exact path and (case-insensitive) verb.
    ///
    /// Path-level `parameters` come first, then operation-level ones; duplicates are
    /// not collapsed. The merged field is omitted entirely when empty.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::NotFound`] if the path or the verb has no exact
    /// match.
    pub async fn endpoint_details(
        &self,
        path: &str,
        method: &str,
        resolve_refs: bool,
    ) -> Result<EndpointDetails> {
        let entry = self.cache.entry().await?;
        let document = &entry.document;

        let path_item = document
            .get("paths")
            .and_then(|p| p.get(path))
            .and_then(Value::as_object)
            .ok_or_else(|| SpecToolsError::NotFound(format!("No '{path}' path in the spec")))?;

        let operation = METHOD_ORDER
            .iter()
            .copied()
            .filter(|verb| verb.eq_ignore_ascii_case(method))
            .find_map(|verb| path_item.get(verb).and_then(Value::as_object))
            .ok_or_else(|| {
                SpecToolsError::NotFound(format!(
                    "No {} operation on '{path}'",
                    method.to_uppercase()
                ))
            })?;

        let mut merged: Vec<Value> = Vec::new();
        if let Some(params) = path_item.get("parameters").and_then(Value::as_array) {
            merged.extend(params.iter().cloned());
        }
        if let Some(params) = operation.get("parameters").and_then(Value::as_array) {
            merged.extend(params.iter().cloned());
        }

        let mut result = operation.clone();
        if merged.is_empty() {
            result.remove("parameters");
        } else {
            result.insert("parameters".to_string(), Value::Array(merged));
        }

        let mut endpoint = Value::Object(result);
        if resolve_refs {
            endpoint = RefResolver::new().resolve_deep(document, &endpoint, DEFAULT_MAX_DEPTH);
        }

        Ok(EndpointDetails { endpoint })
    }

    /// Look up one named schema from `components.schemas`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::NotFound`] if no schema has that exact name.
    pub async fn schema_details(
        &self,
        name: &str,
        resolve_refs: bool,
        max_depth: usize,
    ) -> Result<SchemaDetails> {
        let entry = self.cache.entry().await?;
        let document = &entry.document;

        let schema = document
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(|s| s.get(name))
            .ok_or_else(|| {
                SpecToolsError::NotFound(format!(
                    "Schema '{name}' not found in components.schemas"
                ))
            })?;

        let schema = if resolve_refs {
            RefResolver::new().resolve_deep(document, schema, max_depth)
        } else {
            schema.clone()
        };

        Ok(SchemaDetails {
            name: name.to_string(),
            schema,
        })
    }

    /// Return one top-level section of the document, or the whole document.
    ///
    /// `path_filter` (a case-insensitive regex on path keys) applies to the `paths`
    /// section and to the `paths` map inside `full`; other sections ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::InvalidArgument`] for an unknown section name.
    pub async fn spec_section(
        &self,
        section: Option<&str>,
        path_filter: Option<&str>,
    ) -> Result<Value> {
        let entry = self.cache.entry().await?;
        let document = &entry.document;
        let section = section.unwrap_or("full");

        match section {
            "full" => match path_filter {
                Some(pattern) => {
                    let re = ci_regex(pattern, "pathFilter")?;
                    let mut doc = document.as_object().cloned().unwrap_or_default();
                    if let Some(paths) = document.get("paths").and_then(Value::as_object) {
                        doc.insert("paths".to_string(), Value::Object(filter_paths(paths, &re)));
                    }
                    Ok(Value::Object(doc))
                }
                None => Ok(document.clone()),
            },
            "paths" => {
                let paths = document.get("paths").cloned().unwrap_or(Value::Null);
                match (path_filter, paths.as_object()) {
                    (Some(pattern), Some(map)) => {
                        let re = ci_regex(pattern, "pathFilter")?;
                        Ok(Value::Object(filter_paths(map, &re)))
                    }
                    _ => Ok(paths),
                }
            }
            "info" | "components" | "tags" | "servers" => {
                Ok(document.get(section).cloned().unwrap_or(Value::Null))
            }
            other => Err(SpecToolsError::InvalidArgument(format!(
                "unknown section '{other}'; valid sections are: {}",
                SECTIONS.join(", ")
            ))),
        }
    }
}

fn filter_paths(paths: &Map<String, Value>, re: &Regex) -> Map<String, Value> {
    paths
        .iter()
        .filter(|(key, _)| re.is_match(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn ci_regex(pattern: &str, arg: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            SpecToolsError::InvalidArgument(format!("invalid {arg} pattern '{pattern}': {e}"))
        })
}

fn paginate<T: Clone>(
    matches: Vec<&T>,
    limit: Option<usize>,
    offset: Option<usize>,
) -> (Vec<T>, Pagination) {
    let total = matches.len();
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = offset.unwrap_or(0);
    let page: Vec<T> = matches
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();
    let has_more = offset + page.len() < total;
    (
        page,
        Pagination {
            total,
            limit,
            offset,
            has_more,
        },
    )
}
