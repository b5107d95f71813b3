//! Cluster access for the scanner and the executor
//!
//! The engine only needs a handful of verbs from the API server: discovery
//! of every resource type, kind-to-endpoint mapping, and label-filtered
//! list, create, update and delete on dynamic objects. They sit behind
//! [`ClusterApi`] so the engine runs against a real cluster
//! ([`KubeCluster`]) or an in-memory one ([`MockCluster`]).

mod client;
mod mock;

pub use client::{FIELD_MANAGER, KubeCluster};
pub use mock::{MockCluster, Operation, OperationCounts};

use std::borrow::Cow;

use async_trait::async_trait;
use kube::discovery::ApiResource;

use namespice_core::{GroupVersionKind, ManagedObject};

use crate::error::Result;

/// A discovered, addressable resource type
#[derive(Debug, Clone)]
pub struct ResourceType {
    /// Endpoint information (group, version, kind, plural)
    pub api_resource: ApiResource,
    /// Whether instances live inside a namespace
    pub namespaced: bool,
}

impl ResourceType {
    /// Build a resource type from a kind, guessing the plural
    pub fn from_gvk(gvk: &GroupVersionKind, namespaced: bool) -> Self {
        let kube_gvk = kube::core::GroupVersionKind::gvk(&gvk.group, &gvk.version, &gvk.kind);
        Self {
            api_resource: ApiResource::from_gvk(&kube_gvk),
            namespaced,
        }
    }

    /// Group-Version-Kind of this type
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind {
            group: self.api_resource.group.clone(),
            version: self.api_resource.version.clone(),
            kind: self.api_resource.kind.clone(),
        }
    }

    /// The object as the API server stores it for this type
    ///
    /// Cluster-scoped kinds carry no namespace, whatever the template was
    /// stamped with.
    pub fn scope<'o>(&self, object: &'o ManagedObject) -> Cow<'o, ManagedObject> {
        if self.namespaced || object.namespace().is_none() {
            Cow::Borrowed(object)
        } else {
            Cow::Owned(object.clone().into_cluster_scoped())
        }
    }
}

/// Outcome of enumerating the cluster's resource types
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Listable types, one version per group
    pub types: Vec<ResourceType>,
    /// Group-versions that could not be queried; their types are missing
    pub failed_groups: Vec<String>,
}

impl Discovery {
    /// Whether every group answered
    pub fn is_complete(&self) -> bool {
        self.failed_groups.is_empty()
    }
}

/// Cluster operations used by the reconciliation engine
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Enumerate every listable resource type known to the cluster
    ///
    /// Groups that fail to answer are reported in the result, not as an
    /// error. An error means nothing could be enumerated at all.
    async fn discover(&self) -> Result<Discovery>;

    /// Map a kind to its addressable endpoint
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceType>;

    /// List all instances of a type, in all namespaces, matching a label selector
    async fn list(&self, resource: &ResourceType, label_selector: &str)
    -> Result<Vec<ManagedObject>>;

    /// Create an object; fails with an already-exists error if it is present
    async fn create(&self, resource: &ResourceType, object: &ManagedObject) -> Result<()>;

    /// Overwrite an existing object with the given body
    async fn update(&self, resource: &ResourceType, object: &ManagedObject) -> Result<()>;

    /// Delete an object
    async fn delete(&self, resource: &ResourceType, object: &ManagedObject) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use namespice_core::Document;
    use serde_json::json;

    fn stamped(api_version: &str, kind: &str) -> ManagedObject {
        ManagedObject::from_document(Document(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {"name": "x", "namespace": "team-a"}
        })))
        .unwrap()
    }

    #[test]
    fn test_scope_strips_namespace_of_cluster_scoped_kind() {
        let object = stamped("rbac.authorization.k8s.io/v1", "ClusterRole");
        let cluster_roles = ResourceType::from_gvk(object.gvk(), false);

        let scoped = cluster_roles.scope(&object);
        assert!(matches!(scoped, Cow::Owned(_)));
        assert_eq!(scoped.namespace(), None);
        assert_eq!(scoped.document().namespace(), None);
    }

    #[test]
    fn test_scope_keeps_namespaced_object() {
        let object = stamped("v1", "ConfigMap");
        let config_maps = ResourceType::from_gvk(object.gvk(), true);

        let scoped = config_maps.scope(&object);
        assert!(matches!(scoped, Cow::Borrowed(_)));
        assert_eq!(scoped.namespace(), Some("team-a"));
    }
}
