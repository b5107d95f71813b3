//! Cluster resource bindings
//!
//! `NamespaceClass` is a cluster-scoped custom resource
//! (`namespaceclasses.namespice.io/v1`) whose body is a list of arbitrary
//! resource templates. It is bound to the client through an explicit
//! [`kube::Resource`] implementation rather than a generated type.

use std::borrow::Cow;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};

use namespice_core::{ClassPolicy, Document, NamespaceInfo};

use crate::error::Result;

/// API group of the NamespaceClass resource
pub const GROUP: &str = "namespice.io";
/// API version of the NamespaceClass resource
pub const VERSION: &str = "v1";
/// Kind of the NamespaceClass resource
pub const KIND: &str = "NamespaceClass";
/// Plural resource name
pub const PLURAL: &str = "namespaceclasses";

/// A class policy as stored in the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceClass {
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Resource templates, one document each
    #[serde(default)]
    pub resources: Vec<Document>,
}

impl Resource for NamespaceClass {
    type DynamicType = ();
    type Scope = k8s_openapi::ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(PLURAL)
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl NamespaceClass {
    /// Create a class with a name and templates
    pub fn new(name: &str, resources: Vec<Document>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            resources,
        }
    }

    /// Copy into the core policy model
    pub fn to_policy(&self) -> ClassPolicy {
        ClassPolicy {
            name: self.name_any(),
            resource_version: self.resource_version(),
            resources: self.resources.clone(),
        }
    }
}

/// Read the parts of a namespace the controller cares about
pub fn namespace_info(ns: &Namespace) -> NamespaceInfo {
    NamespaceInfo {
        name: ns.name_any(),
        resource_version: ns.resource_version(),
        annotations: ns.annotations().clone(),
    }
}

/// Parse NamespaceClass documents from a (multi-document) YAML string
///
/// Documents that are empty or of another kind are ignored.
pub fn classes_from_yaml(yaml: &str) -> Result<Vec<NamespaceClass>> {
    let mut classes = Vec::new();

    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(doc)?;
        if value.is_null() {
            continue;
        }
        if value.get("kind").and_then(serde_yaml::Value::as_str) != Some(KIND) {
            continue;
        }
        classes.push(serde_yaml::from_value(value)?);
    }

    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_resource_identity() {
        assert_eq!(NamespaceClass::kind(&()), "NamespaceClass");
        assert_eq!(NamespaceClass::api_version(&()), "namespice.io/v1");
        assert_eq!(NamespaceClass::plural(&()), "namespaceclasses");
    }

    #[test]
    fn test_deserialize_from_api_json() {
        let class: NamespaceClass = serde_json::from_str(
            r#"{
                "apiVersion": "namespice.io/v1",
                "kind": "NamespaceClass",
                "metadata": {"name": "net", "resourceVersion": "42"},
                "resources": [
                    {"apiVersion": "networking.k8s.io/v1", "kind": "NetworkPolicy", "metadata": {"name": "deny-all"}}
                ]
            }"#,
        )
        .unwrap();

        let policy = class.to_policy();
        assert_eq!(policy.name, "net");
        assert_eq!(policy.resource_version.as_deref(), Some("42"));
        assert_eq!(policy.resources.len(), 1);
        assert_eq!(policy.resources[0].name(), Some("deny-all"));
    }

    #[test]
    fn test_missing_resources_is_empty() {
        let class: NamespaceClass =
            serde_json::from_str(r#"{"metadata": {"name": "empty"}}"#).unwrap();
        assert!(class.to_policy().resources.is_empty());
    }

    #[test]
    fn test_namespace_info() {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("team-a".to_string()),
                resource_version: Some("7".to_string()),
                annotations: Some(BTreeMap::from([(
                    "namespice.io/class".to_string(),
                    "net,quota".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        let info = namespace_info(&ns);
        assert_eq!(info.name, "team-a");
        assert_eq!(info.resource_version.as_deref(), Some("7"));
        assert_eq!(info.classes("namespice.io/class"), vec!["net", "quota"]);
    }

    #[test]
    fn test_classes_from_yaml() {
        let yaml = r#"
apiVersion: namespice.io/v1
kind: NamespaceClass
metadata:
  name: net
resources:
  - apiVersion: networking.k8s.io/v1
    kind: NetworkPolicy
    metadata:
      name: deny-all
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: unrelated
---
apiVersion: namespice.io/v1
kind: NamespaceClass
metadata:
  name: quota
resources: []
"#;
        let classes = classes_from_yaml(yaml).unwrap();
        let names: Vec<String> = classes.iter().map(|c| c.name_any()).collect();
        assert_eq!(names, vec!["net", "quota"]);
    }
}
