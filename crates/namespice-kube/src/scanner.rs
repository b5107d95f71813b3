//! Actual-state scanner
//!
//! Finds every object in the cluster carrying the ownership label, across
//! every listable resource type. This costs one list request per type and
//! is only used by full sweeps.

use futures::stream::{self, StreamExt};

use namespice_core::ManagedObject;

use crate::cluster::{ClusterApi, ResourceType};

/// Outcome of a cluster-wide scan
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Owned objects found, ordered by identity
    pub objects: Vec<ManagedObject>,
    /// Resource types listed successfully
    pub scanned_types: usize,
    /// Types skipped because they cannot be listed (404/405)
    pub skipped_types: usize,
    /// Types whose list failed; their contribution is empty
    pub failed_types: usize,
    /// Group-versions discovery could not enumerate
    pub failed_groups: Vec<String>,
    /// Discovery failed outright and nothing was listed
    pub discovery_failed: bool,
}

impl ScanResult {
    /// Whether every listable type was scanned
    pub fn is_complete(&self) -> bool {
        self.failed_types == 0 && self.failed_groups.is_empty() && !self.discovery_failed
    }
}

enum TypeOutcome {
    Listed(Vec<ManagedObject>),
    Skipped,
    Failed,
}

/// Scan the cluster for objects whose labels contain `selector`
///
/// Per-type failures never abort the scan. Types of unavailable groups are
/// left out, and a failed discovery yields an empty result; either way the
/// result is marked incomplete.
pub async fn scan_managed<C>(cluster: &C, selector: &str, concurrency: usize) -> ScanResult
where
    C: ClusterApi + ?Sized,
{
    let discovery = match cluster.discover().await {
        Ok(discovery) => discovery,
        Err(e) => {
            tracing::error!(error = %e, "resource discovery failed, scanning nothing");
            return ScanResult {
                discovery_failed: true,
                ..Default::default()
            };
        }
    };
    if !discovery.is_complete() {
        tracing::warn!(
            groups = ?discovery.failed_groups,
            "some API groups are unavailable, their types are not scanned"
        );
    }

    tracing::debug!(types = discovery.types.len(), "scanning resource types");

    let outcomes: Vec<TypeOutcome> = stream::iter(discovery.types)
        .map(|resource| async move { list_type(cluster, &resource, selector).await })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut result = ScanResult {
        failed_groups: discovery.failed_groups,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            TypeOutcome::Listed(objects) => {
                result.scanned_types += 1;
                result.objects.extend(objects);
            }
            TypeOutcome::Skipped => result.skipped_types += 1,
            TypeOutcome::Failed => result.failed_types += 1,
        }
    }
    result.objects.sort_by(|a, b| a.key().cmp(b.key()));

    tracing::debug!(
        objects = result.objects.len(),
        scanned = result.scanned_types,
        skipped = result.skipped_types,
        failed = result.failed_types,
        "scan finished"
    );

    result
}

async fn list_type<C>(cluster: &C, resource: &ResourceType, selector: &str) -> TypeOutcome
where
    C: ClusterApi + ?Sized,
{
    let ar = &resource.api_resource;
    match cluster.list(resource, selector).await {
        Ok(objects) => TypeOutcome::Listed(objects),
        Err(e) if e.is_not_found() || e.is_method_not_allowed() => {
            tracing::debug!(group = %ar.group, version = %ar.version, resource = %ar.plural, "type not listable, skipping");
            TypeOutcome::Skipped
        }
        Err(e) => {
            tracing::error!(group = %ar.group, version = %ar.version, resource = %ar.plural, error = %e, "failed to list resource type");
            TypeOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockCluster, Operation};
    use namespice_core::Document;
    use serde_json::json;

    const LABEL: &str = "namespice.io/class";

    fn object(api_version: &str, kind: &str, ns: &str, name: &str, owner: Option<&str>) -> ManagedObject {
        let mut doc = Document(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {"name": name, "namespace": ns}
        }));
        if let Some(owner) = owner {
            doc.set_label(LABEL, owner);
        }
        ManagedObject::from_document(doc).unwrap()
    }

    fn cluster() -> MockCluster {
        MockCluster::new()
            .with_type("v1", "ConfigMap", true)
            .with_type("v1", "ResourceQuota", true)
            .with_type("networking.k8s.io/v1", "NetworkPolicy", true)
    }

    #[tokio::test]
    async fn test_scan_finds_only_owned_objects() {
        let cluster = cluster();
        cluster.insert(object("v1", "ResourceQuota", "team-a", "quota", Some("quota")));
        cluster.insert(object("networking.k8s.io/v1", "NetworkPolicy", "team-a", "deny", Some("net")));
        cluster.insert(object("v1", "ConfigMap", "team-a", "kube-root-ca.crt", None));

        let result = scan_managed(&cluster, LABEL, 4).await;

        let names: Vec<&str> = result.objects.iter().map(|o| o.name()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"quota"));
        assert!(names.contains(&"deny"));
        assert_eq!(result.scanned_types, 3);
        assert!(result.is_complete());
        assert_eq!(cluster.operation_counts().lists, 3);
    }

    #[tokio::test]
    async fn test_scan_skips_unlistable_types() {
        let cluster = cluster();
        cluster.insert(object("v1", "ConfigMap", "team-a", "cfg", Some("base")));
        cluster.fail(Operation::List, "ResourceQuota", 405, "MethodNotAllowed");
        cluster.fail(Operation::List, "NetworkPolicy", 404, "NotFound");

        let result = scan_managed(&cluster, LABEL, 2).await;

        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.skipped_types, 2);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_scan_treats_failed_type_as_empty() {
        let cluster = cluster();
        cluster.insert(object("v1", "ConfigMap", "team-a", "cfg", Some("base")));
        cluster.insert(object("v1", "ResourceQuota", "team-a", "quota", Some("quota")));
        cluster.fail(Operation::List, "ResourceQuota", 500, "InternalError");

        let result = scan_managed(&cluster, LABEL, 8).await;

        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.objects[0].name(), "cfg");
        assert_eq!(result.failed_types, 1);
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn test_scan_with_failed_discovery_is_empty() {
        let cluster = cluster();
        cluster.insert(object("v1", "ConfigMap", "team-a", "cfg", Some("base")));
        cluster.fail(Operation::Discover, "", 503, "ServiceUnavailable");

        let result = scan_managed(&cluster, LABEL, 8).await;

        assert!(result.objects.is_empty());
        assert!(result.discovery_failed);
        assert!(!result.is_complete());
        assert_eq!(cluster.operation_counts().lists, 0);
    }

    #[tokio::test]
    async fn test_scan_with_unavailable_group_is_incomplete() {
        let cluster = cluster().with_type("metrics.k8s.io/v1beta1", "PodMetrics", true);
        cluster.insert(object("v1", "ConfigMap", "team-a", "cfg", Some("base")));
        cluster.fail_group("metrics.k8s.io/v1beta1");

        let result = scan_managed(&cluster, LABEL, 4).await;

        // The rest of the cluster is still scanned
        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.scanned_types, 3);
        assert_eq!(result.failed_groups, ["metrics.k8s.io/v1beta1"]);
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn test_scan_zero_concurrency_still_runs() {
        let cluster = cluster();
        cluster.insert(object("v1", "ConfigMap", "team-a", "cfg", Some("base")));

        let result = scan_managed(&cluster, LABEL, 0).await;
        assert_eq!(result.objects.len(), 1);
    }
}
