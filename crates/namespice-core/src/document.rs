//! Untyped resource documents
//!
//! A [`Document`] is an open-ended tree of null, boolean, number, string,
//! ordered list and ordered mapping nodes. Templates carried by a class
//! policy and the objects read back from the cluster are both documents;
//! nothing beyond the standard object metadata accessors is assumed about
//! their shape.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::Result;

/// Untyped resource document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub JsonValue);

impl Document {
    /// Parse a document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Get a value by dotted path (e.g., "metadata.name")
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get a string value by dotted path
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(JsonValue::as_str)
    }

    /// Set a value by dotted path, creating intermediate mappings
    pub fn set(&mut self, path: &str, value: JsonValue) {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Whether the root node is a mapping
    pub fn is_mapping(&self) -> bool {
        self.0.is_object()
    }

    /// `apiVersion` field
    pub fn api_version(&self) -> Option<&str> {
        self.get_str("apiVersion")
    }

    /// `kind` field
    pub fn kind(&self) -> Option<&str> {
        self.get_str("kind")
    }

    /// `metadata.name`
    pub fn name(&self) -> Option<&str> {
        self.get_str("metadata.name")
    }

    /// `metadata.namespace`
    pub fn namespace(&self) -> Option<&str> {
        self.get_str("metadata.namespace")
    }

    /// `metadata.labels`, ignoring non-string values
    pub fn labels(&self) -> BTreeMap<String, String> {
        match self.get("metadata.labels") {
            Some(JsonValue::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Single label value
    pub fn label(&self, key: &str) -> Option<&str> {
        match self.get("metadata.labels") {
            Some(JsonValue::Object(map)) => map.get(key).and_then(JsonValue::as_str),
            _ => None,
        }
    }

    /// Set `metadata.namespace`
    pub fn set_namespace(&mut self, namespace: &str) {
        self.set("metadata.namespace", JsonValue::String(namespace.to_string()));
    }

    /// Drop `metadata.namespace`, if any
    pub fn clear_namespace(&mut self) {
        if let Some(JsonValue::Object(metadata)) = self.0.get_mut("metadata") {
            metadata.shift_remove("namespace");
        }
    }

    /// Set one label, keeping every other label in place
    ///
    /// A `metadata.labels` node that is not a mapping is replaced.
    pub fn set_label(&mut self, key: &str, value: &str) {
        if !self.0.is_object() {
            self.0 = JsonValue::Object(serde_json::Map::new());
        }
        if let JsonValue::Object(root) = &mut self.0 {
            let metadata = root
                .entry("metadata")
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            if !metadata.is_object() {
                *metadata = JsonValue::Object(serde_json::Map::new());
            }
            if let JsonValue::Object(metadata) = metadata {
                let labels = metadata
                    .entry("labels")
                    .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
                if !labels.is_object() {
                    *labels = JsonValue::Object(serde_json::Map::new());
                }
                if let JsonValue::Object(labels) = labels {
                    labels.insert(key.to_string(), JsonValue::String(value.to_string()));
                }
            }
        }
    }
}

impl From<JsonValue> for Document {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert(key.to_string(), new_value);
        } else {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}
