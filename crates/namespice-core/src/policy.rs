//! Class policies and the namespace view the compiler works on

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::document::Document;

/// Named set of resource templates a namespace opts into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default)]
    pub resources: Vec<Document>,
}

impl ClassPolicy {
    pub fn new(name: impl Into<String>, resources: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            resource_version: None,
            resources,
        }
    }
}

/// The parts of a namespace the controller reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceInfo {
    pub name: String,
    pub resource_version: Option<String>,
    pub annotations: BTreeMap<String, String>,
}

impl NamespaceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style annotation setter
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Class names listed in the policy annotation, in annotation order
    ///
    /// A missing annotation means no classes.
    pub fn classes(&self, annotation_key: &str) -> Vec<String> {
        self.annotations
            .get(annotation_key)
            .map(|v| parse_class_list(v))
            .unwrap_or_default()
    }

    /// Whether the policy annotation lists `class`
    pub fn has_class(&self, annotation_key: &str, class: &str) -> bool {
        self.classes(annotation_key).iter().any(|c| c == class)
    }
}

/// Parse a comma-separated class list
///
/// Entries are trimmed and empty entries dropped. Commas inside names are
/// not supported.
pub fn parse_class_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
