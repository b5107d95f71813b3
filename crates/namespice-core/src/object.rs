//! Managed objects and their identity
//!
//! Two objects are the same object when group, version, kind, namespace and
//! name all match. Labels and body never take part in identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::document::Document;
use crate::error::{CoreError, Result};

/// Group-Version-Kind of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Build from an `apiVersion` string and a kind
    ///
    /// - "apps/v1" -> group="apps", version="v1"
    /// - "v1" -> group="", version="v1" (core API)
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.rsplit_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };

        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    /// The `apiVersion` form ("group/version", or "version" for the core group)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Identity of a managed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub gvk: GroupVersionKind,
    /// None for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.gvk.kind, self.name),
            None => write!(f, "{}/{}", self.gvk.kind, self.name),
        }
    }
}

/// A concrete resource instance: identity plus full document
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    key: ObjectKey,
    document: Document,
}

impl ManagedObject {
    /// Build from a document carrying `apiVersion`, `kind` and `metadata.name`
    pub fn from_document(document: Document) -> Result<Self> {
        if !document.is_mapping() {
            return Err(CoreError::InvalidObject {
                message: "document is not a mapping".to_string(),
            });
        }
        let api_version = document.api_version().ok_or_else(|| missing("apiVersion"))?;
        let kind = document.kind().ok_or_else(|| missing("kind"))?;
        let name = document.name().ok_or_else(|| missing("metadata.name"))?;

        let key = ObjectKey {
            gvk: GroupVersionKind::from_api_version(api_version, kind),
            namespace: document.namespace().map(str::to_string),
            name: name.to_string(),
        };

        Ok(Self { key, document })
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn gvk(&self) -> &GroupVersionKind {
        &self.key.gvk
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.key.namespace.as_deref()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Same object without a namespace, as a cluster-scoped kind is stored
    pub fn into_cluster_scoped(mut self) -> Self {
        if self.key.namespace.take().is_some() {
            self.document.clear_namespace();
        }
        self
    }

    /// Value of the ownership label, i.e. the originating class
    pub fn owner(&self, label_key: &str) -> Option<&str> {
        self.document.label(label_key)
    }
}

fn missing(field: &str) -> CoreError {
    CoreError::InvalidObject {
        message: format!("missing {}", field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gvk_from_api_version() {
        let gvk = GroupVersionKind::from_api_version("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");

        let core = GroupVersionKind::from_api_version("v1", "ConfigMap");
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");
        assert_eq!(core.api_version(), "v1");

        let net = GroupVersionKind::from_api_version("networking.k8s.io/v1", "NetworkPolicy");
        assert_eq!(net.api_version(), "networking.k8s.io/v1");
        assert_eq!(net.to_string(), "networking.k8s.io/v1, Kind=NetworkPolicy");
    }

    #[test]
    fn test_from_document() {
        let obj = ManagedObject::from_document(Document(json!({
            "apiVersion": "v1",
            "kind": "ResourceQuota",
            "metadata": {"name": "quota", "namespace": "team-a", "labels": {"namespice.io/class": "quota"}}
        })))
        .unwrap();

        assert_eq!(obj.name(), "quota");
        assert_eq!(obj.namespace(), Some("team-a"));
        assert_eq!(obj.owner("namespice.io/class"), Some("quota"));
        assert_eq!(obj.key().to_string(), "team-a/ResourceQuota/quota");
    }

    #[test]
    fn test_from_document_missing_fields() {
        let no_name = Document(json!({"apiVersion": "v1", "kind": "ConfigMap"}));
        assert!(matches!(
            ManagedObject::from_document(no_name),
            Err(CoreError::InvalidObject { .. })
        ));

        let not_mapping = Document(json!("just a string"));
        assert!(ManagedObject::from_document(not_mapping).is_err());
    }

    #[test]
    fn test_identity_ignores_labels_and_body() {
        let a = ManagedObject::from_document(Document(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "cfg", "namespace": "ns1", "labels": {"x": "1"}},
            "data": {"a": "b"}
        })))
        .unwrap();
        let b = ManagedObject::from_document(Document(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "cfg", "namespace": "ns1", "labels": {"x": "2"}},
            "data": {"c": "d"}
        })))
        .unwrap();

        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn test_cluster_scoped_identity_matches_listed_object() {
        let stamped = ManagedObject::from_document(Document(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {"name": "viewer", "namespace": "team-a", "labels": {"namespice.io/class": "rbac"}}
        })))
        .unwrap();
        let listed = ManagedObject::from_document(Document(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {"name": "viewer", "labels": {"namespice.io/class": "rbac"}}
        })))
        .unwrap();
        assert_ne!(stamped.key(), listed.key());

        let scoped = stamped.into_cluster_scoped();
        assert_eq!(scoped.key(), listed.key());
        assert_eq!(scoped.document().namespace(), None);
        assert_eq!(scoped.key().to_string(), "ClusterRole/viewer");
        assert_eq!(scoped.owner("namespice.io/class"), Some("rbac"));
    }
}
