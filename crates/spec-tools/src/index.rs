//! Flat search indexes built once per fetched document.
//!
//! Both builders do a single pass over the raw document and capture literal field
//! values only; `$ref`s are never followed here. Search therefore matches what the
//! document says verbatim, and resolution happens at detail-retrieval time.

use serde::Serialize;
use serde_json::Value;

/// HTTP verbs recognized on a path item, in index emission order.
pub const METHOD_ORDER: [&str; 8] = [
    "get", "post", "put", "patch", "delete", "options", "head", "trace",
];

/// One searchable (path, verb) operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointEntry {
    pub path: String,
    /// Uppercase verb, e.g. `GET`.
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

/// One searchable named schema from `components.schemas`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEntry {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Scan `paths` into one entry per (path, verb) pair, paths in document order and
/// verbs in [`METHOD_ORDER`]. Null path items and absent verbs are skipped silently.
#[must_use]
pub fn build_endpoint_index(document: &Value) -> Vec<EndpointEntry> {
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (path, path_item) in paths {
        let Some(path_item) = path_item.as_object() else {
            continue;
        };
        for method in METHOD_ORDER {
            let Some(operation) = path_item.get(method).and_then(Value::as_object) else {
                continue;
            };
            entries.push(EndpointEntry {
                path: path.clone(),
                method: method.to_uppercase(),
                summary: string_field(operation.get("summary")),
                description: string_field(operation.get("description")),
                tags: operation.get("tags").and_then(Value::as_array).map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                }),
                operation_id: string_field(operation.get("operationId")),
            });
        }
    }
    entries
}

/// Scan `components.schemas` into one entry per named schema, in document order.
///
/// Schemas whose top level is itself a `$ref` object are skipped: they carry no
/// searchable fields of their own and stay reachable through detail lookup.
#[must_use]
pub fn build_schema_index(document: &Value) -> Vec<SchemaEntry> {
    let Some(schemas) = document
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (name, schema) in schemas {
        let Some(schema) = schema.as_object() else {
            continue;
        };
        if schema.contains_key("$ref") {
            continue;
        }
        entries.push(SchemaEntry {
            name: name.clone(),
            schema_type: string_field(schema.get("type")),
            property_names: schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| props.keys().cloned().collect()),
            description: string_field(schema.get("description")),
        });
    }
    entries
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}
