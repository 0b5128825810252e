//! Schema drift detection.
//!
//! Compares what an index is expected to look like against what the engine
//! reports. The first mismatch wins, walking the expected schema in
//! declaration order.

use super::{IndexDescriptor, JsonMap};
use crate::engine::LiveIndexState;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// First mismatch found between expectation and live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDrift {
    /// Dotted key path, e.g. `mappings.channel_overwrites.autodelete_days`
    pub path: String,
    pub expected: Value,
    /// `None` when the key is missing from the live index
    pub found: Option<Value>,
}

impl fmt::Display for SchemaDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(f, "{}: expected {}, found {}", self.path, self.expected, found),
            None => write!(f, "{}: expected {}, missing", self.path, self.expected),
        }
    }
}

/// Returns the first drift between `descriptor` and `live`, if any.
pub fn validate(descriptor: &IndexDescriptor, live: &LiveIndexState) -> Option<SchemaDrift> {
    let drift = descriptor
        .expected_mapping
        .as_ref()
        .and_then(|expected| validate_mapping(expected, &live.mapping))
        .or_else(|| {
            descriptor
                .expected_settings
                .as_ref()
                .and_then(|expected| compare_flat("settings", expected, &live.settings))
        });

    if let Some(drift) = &drift {
        tracing::info!(index = %descriptor.name, %drift, "Schema drift detected");
    }
    drift
}

fn validate_mapping(expected: &JsonMap, live: &JsonMap) -> Option<SchemaDrift> {
    for (key, value) in expected {
        if let Some(nested) = nested_properties(value) {
            let live_nested = live
                .get(key)
                .and_then(|field| field.get("properties"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let prefix = format!("mappings.{}", key);
            if let Some(drift) = compare_flat(&prefix, nested, &live_nested) {
                return Some(drift);
            }
            continue;
        }

        let path = format!("mappings.{}", key);
        if let Some(drift) = compare_value(path, value, live.get(key)) {
            return Some(drift);
        }
    }
    None
}

/// An object field is a value whose only key is `properties`.
fn nested_properties(value: &Value) -> Option<&JsonMap> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get("properties")?.as_object()
}

fn compare_flat(prefix: &str, expected: &JsonMap, live: &JsonMap) -> Option<SchemaDrift> {
    expected
        .iter()
        .find_map(|(key, value)| compare_value(format!("{}.{}", prefix, key), value, live.get(key)))
}

fn compare_value(path: String, expected: &Value, found: Option<&Value>) -> Option<SchemaDrift> {
    match found {
        Some(found) if found == expected => None,
        found => Some(SchemaDrift {
            path,
            expected: expected.clone(),
            found: found.cloned(),
        }),
    }
}
