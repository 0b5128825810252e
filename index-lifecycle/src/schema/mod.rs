//! Expected index schemas.
//!
//! The schema resource is a JSON document listing, per logical index, the
//! expected mapping tree and settings:
//!
//! ```json
//! {"index_config": [{"index_name": "video", "expected_map": {...}, "expected_set": {...}}]}
//! ```

pub mod validate;

use crate::utils::errors::{LifecycleError, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::Path;

pub use validate::{validate, SchemaDrift};

/// Field name → type-spec tree, or setting key → value.
pub type JsonMap = Map<String, Value>;

/// Static description of one logical index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexDescriptor {
    #[serde(rename = "index_name")]
    pub name: String,

    #[serde(rename = "expected_map", default, deserialize_with = "non_empty_map")]
    pub expected_mapping: Option<JsonMap>,

    #[serde(rename = "expected_set", default, deserialize_with = "non_empty_map")]
    pub expected_settings: Option<JsonMap>,
}

impl IndexDescriptor {
    /// Blank index creation payload. Absent parts are left to engine defaults.
    pub fn creation_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(settings) = &self.expected_settings {
            body.insert("settings".to_string(), Value::Object(settings.clone()));
        }
        if let Some(mapping) = &self.expected_mapping {
            body.insert("mappings".to_string(), json!({ "properties": mapping }));
        }
        Value::Object(body)
    }
}

/// `{}` and `null` count as "not specified".
fn non_empty_map<'de, D>(deserializer: D) -> std::result::Result<Option<JsonMap>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map = Option::<JsonMap>::deserialize(deserializer)?;
    Ok(map.filter(|m| !m.is_empty()))
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    index_config: Vec<IndexDescriptor>,
}

/// All configured index descriptors, in declaration order.
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    indices: Vec<IndexDescriptor>,
}

impl SchemaSpec {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LifecycleError::Schema(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: SchemaFile = serde_json::from_str(content)
            .map_err(|e| LifecycleError::Schema(format!("malformed schema resource: {}", e)))?;
        Self::new(file.index_config)
    }

    pub fn new(indices: Vec<IndexDescriptor>) -> Result<Self> {
        if indices.is_empty() {
            return Err(LifecycleError::Schema("no indices configured".into()));
        }

        let mut seen = HashSet::new();
        for index in &indices {
            if index.name.trim().is_empty() {
                return Err(LifecycleError::Schema("index name must not be empty".into()));
            }
            if !seen.insert(index.name.as_str()) {
                return Err(LifecycleError::Schema(format!(
                    "index {} is configured twice",
                    index.name
                )));
            }
        }

        Ok(Self { indices })
    }

    pub fn indices(&self) -> &[IndexDescriptor] {
        &self.indices
    }
}
