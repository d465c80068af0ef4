//! `$ref` resolution over a parsed spec document.
//!
//! Only internal, document-rooted pointers (`#/...`) are resolvable. Anything else
//! (external file/URL refs, malformed fragments, pointers whose target is missing) is
//! substituted inline with an unresolved marker value rather than raised as an error.
//! Reference cycles surface the same way, as circular markers, so deep resolution
//! always terminates and never aborts the surrounding operation.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Default number of `$ref` indirections [`RefResolver::resolve_deep`] will follow.
///
/// Depth counts reference hops, not container nesting: a deeply nested schema with no
/// refs is walked in full regardless of this limit.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Marker substituted for a `$ref` whose pointer cannot be followed.
#[must_use]
pub fn unresolved_marker(reference: &str) -> Value {
    json!({ "$unresolved": reference })
}

/// Marker substituted when a `$ref` cycle is re-entered during deep resolution.
#[must_use]
pub fn circular_marker(reference: &str) -> Value {
    json!({ "$circular": reference })
}

/// Resolve a single `#/...` pointer against the document root.
///
/// Each segment is percent-decoded, then un-escaped with `~1` -> `/` followed by
/// `~0` -> `~` (plain substring replacement; `~1` must be rewritten first, otherwise
/// the escaped sequence `~01` would decode to `/` instead of `~1`).
///
/// Returns the targeted value, or an unresolved marker if the pointer does not start
/// with `#/`, a segment is missing, or an intermediate node is not a container.
#[must_use]
pub fn resolve_pointer(document: &Value, reference: &str) -> Value {
    let Some(path) = reference.strip_prefix("#/") else {
        return unresolved_marker(reference);
    };

    let mut current = document;
    for raw in path.split('/') {
        let segment = decode_segment(raw);
        let next = match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return unresolved_marker(reference),
        }
    }

    current.clone()
}

fn decode_segment(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8_lossy()
        .replace("~1", "/")
        .replace("~0", "~")
}

/// Deep `$ref` expansion with cycle detection and depth limiting.
///
/// One instance tracks the active resolution path for a single top-level
/// [`Self::resolve_deep`] call; the set is reset on entry, so an instance may be
/// reused for sequential resolutions but must not be shared by interleaved ones.
#[derive(Debug, Default)]
pub struct RefResolver {
    in_progress: HashSet<String>,
}

impl RefResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `value`, substituting every resolvable `$ref` with its target, up to
    /// `max_depth` reference hops. Substituting a ref consumes one depth level;
    /// descending into plain containers does not. At the depth limit the raw
    /// (possibly still-ref) value is returned unchanged.
    pub fn resolve_deep(&mut self, document: &Value, value: &Value, max_depth: usize) -> Value {
        self.in_progress.clear();
        self.resolve_at(document, value, max_depth, 0)
    }

    fn resolve_at(
        &mut self,
        document: &Value,
        value: &Value,
        max_depth: usize,
        depth: usize,
    ) -> Value {
        if depth >= max_depth {
            return value.clone();
        }

        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_at(document, item, max_depth, depth))
                    .collect(),
            ),
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    return self.resolve_ref(document, reference, max_depth, depth);
                }
                let mut out = Map::new();
                for (key, field) in map {
                    out.insert(key.clone(), self.resolve_at(document, field, max_depth, depth));
                }
                Value::Object(out)
            }
            // Null and scalars pass through untouched.
            other => other.clone(),
        }
    }

    fn resolve_ref(
        &mut self,
        document: &Value,
        reference: &str,
        max_depth: usize,
        depth: usize,
    ) -> Value {
        // Only the *active* path counts as a cycle: the pointer is unmarked after the
        // recursive call returns, so a diamond-shaped ref graph expands twice rather
        // than tripping the detector.
        if self.in_progress.contains(reference) {
            return circular_marker(reference);
        }

        self.in_progress.insert(reference.to_string());
        let target = resolve_pointer(document, reference);
        let resolved = self.resolve_at(document, &target, max_depth, depth + 1);
        self.in_progress.remove(reference);
        resolved
    }
}
