//! Structured (.yaml/.yml) wildcard sources
//!
//! A structured source is a nested key/value document. Every leaf list,
//! string, and number becomes its own wildcard key; every map level —
//! including the file root — additionally aggregates all descendant leaf
//! values under its own key. Because the key space only exists inside the
//! file content, structured sources are always parsed in full at catalog
//! build time, in both operating modes.

use std::path::Path;
use std::sync::Arc;

use serde_yaml::Value;

use crate::error::{Result, WildError};

use super::normalize_key;
use super::source::decode_permissive;

/// Parse a structured source file and flatten it into `(key, candidates)`
/// pairs. Keys are prefixed with `root_key` (the normalized file stem), so
/// `colors.yaml` containing `warm: [red, orange]` yields `colors/warm` and
/// the aggregate key `colors`. Entries are emitted in document order with
/// each aggregate after its children; the file-root aggregate comes last.
pub fn flatten_file(path: &Path, root_key: &str) -> Result<Vec<(String, Arc<Vec<String>>)>> {
    let bytes = std::fs::read(path).map_err(|e| WildError::Source {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let text = decode_permissive(bytes);

    let doc: Value = serde_yaml::from_str(&text).map_err(|e| WildError::Structured {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut out = Vec::new();
    flatten_value(&doc, root_key, &mut out);
    Ok(out)
}

/// Recursively flatten one node, returning the leaf values beneath it.
fn flatten_value(
    value: &Value,
    key: &str,
    out: &mut Vec<(String, Arc<Vec<String>>)>,
) -> Vec<String> {
    match value {
        Value::Mapping(map) => {
            let mut aggregate = Vec::new();
            for (k, v) in map {
                let Some(segment) = scalar_to_string(k) else {
                    continue;
                };
                let sub_key = normalize_key(&format!("{}/{}", key, segment));
                aggregate.extend(flatten_value(v, &sub_key, out));
            }
            if !aggregate.is_empty() {
                out.push((key.to_string(), Arc::new(aggregate.clone())));
            }
            aggregate
        }
        Value::Sequence(seq) => {
            let values: Vec<String> = seq.iter().filter_map(scalar_to_string).collect();
            if !values.is_empty() {
                out.push((key.to_string(), Arc::new(values.clone())));
            }
            values
        }
        other => match scalar_to_string(other) {
            Some(s) => {
                out.push((key.to_string(), Arc::new(vec![s.clone()])));
                vec![s]
            }
            None => Vec::new(),
        },
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
