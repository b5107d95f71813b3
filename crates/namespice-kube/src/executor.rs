//! Delta execution
//!
//! Applies an [`ObjectDelta`] object by object. Creates fall back to an
//! update when the object already exists; every other failure is recorded
//! for that object and the batch carries on. Nothing is rolled back.

use std::collections::HashMap;
use std::fmt;

use namespice_core::{GroupVersionKind, ManagedObject, ObjectDelta, ObjectKey};

use crate::cluster::{ClusterApi, ResourceType};
use crate::error::{KubeError, Result};

/// Per-object outcome of one execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Objects created
    pub created: Vec<ObjectKey>,
    /// Objects that already existed and were updated instead
    pub updated: Vec<ObjectKey>,
    /// Objects deleted
    pub deleted: Vec<ObjectKey>,
    /// Objects needing no call (already gone), with the reason
    pub skipped: Vec<(ObjectKey, String)>,
    /// Objects whose operation failed, with the error
    pub failed: Vec<(ObjectKey, String)>,
    /// Nothing was sent to the cluster
    pub dry_run: bool,
}

impl ExecutionReport {
    /// Check if no object failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: ExecutionReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.dry_run |= other.dry_run;
    }

    fn verbs(&self) -> [&'static str; 3] {
        if self.dry_run {
            ["would create", "would update", "would delete"]
        } else {
            ["created", "updated", "deleted"]
        }
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let verbs = self.verbs();
        format!(
            "{} {}, {} {}, {} {}, {} skipped, {} failed",
            self.created.len(),
            verbs[0],
            self.updated.len(),
            verbs[1],
            self.deleted.len(),
            verbs[2],
            self.skipped.len(),
            self.failed.len()
        )
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verbs = self.verbs();
        for key in &self.created {
            writeln!(f, "{} {}", verbs[0], key)?;
        }
        for key in &self.updated {
            writeln!(f, "{} {}", verbs[1], key)?;
        }
        for key in &self.deleted {
            writeln!(f, "{} {}", verbs[2], key)?;
        }
        for (key, reason) in &self.skipped {
            writeln!(f, "skipped {}: {}", key, reason)?;
        }
        for (key, reason) in &self.failed {
            writeln!(f, "failed {}: {}", key, reason)?;
        }
        Ok(())
    }
}

/// Applies deltas against a cluster
pub struct Executor<'a, C: ?Sized> {
    cluster: &'a C,
    label_key: &'a str,
    dry_run: bool,
}

impl<'a, C: ClusterApi + ?Sized> Executor<'a, C> {
    /// Create an executor; `label_key` is only used to name the owning class in logs
    pub fn new(cluster: &'a C, label_key: &'a str) -> Self {
        Self {
            cluster,
            label_key,
            dry_run: false,
        }
    }

    /// Report what would be done without calling any mutating verb
    ///
    /// Kinds are still resolved, so unmapped kinds show up as failures.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Apply a delta: create-or-update first, then deletes
    pub async fn execute(&self, delta: &ObjectDelta) -> ExecutionReport {
        let mut report = ExecutionReport {
            dry_run: self.dry_run,
            ..Default::default()
        };
        if delta.is_empty() {
            return report;
        }

        // One mapping lookup per kind per batch
        let mut mappings: HashMap<GroupVersionKind, std::result::Result<ResourceType, String>> =
            HashMap::new();

        for object in &delta.create_or_update {
            let resource = match self.mapping(&mut mappings, object).await {
                Ok(resource) => resource,
                Err(reason) => {
                    self.log_failure(object, "map", &reason);
                    report.failed.push((object.key().clone(), reason));
                    continue;
                }
            };
            let object = resource.scope(object);

            if self.dry_run {
                report.created.push(object.key().clone());
                continue;
            }

            match self.create_or_update(&resource, &object).await {
                Ok(Applied::Created) => {
                    self.log_success(&object, "created resource");
                    report.created.push(object.key().clone());
                }
                Ok(Applied::Updated) => {
                    self.log_success(&object, "updated resource");
                    report.updated.push(object.key().clone());
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.log_failure(&object, "apply", &reason);
                    report.failed.push((object.key().clone(), reason));
                }
            }
        }

        for object in &delta.delete {
            let resource = match self.mapping(&mut mappings, object).await {
                Ok(resource) => resource,
                Err(reason) => {
                    self.log_failure(object, "map", &reason);
                    report.failed.push((object.key().clone(), reason));
                    continue;
                }
            };
            let object = resource.scope(object);

            if self.dry_run {
                report.deleted.push(object.key().clone());
                continue;
            }

            match self.cluster.delete(&resource, &object).await {
                Ok(()) => {
                    self.log_success(&object, "deleted resource");
                    report.deleted.push(object.key().clone());
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        namespace = object.namespace().unwrap_or_default(),
                        name = %object.name(),
                        gvk = %object.gvk(),
                        "resource already gone"
                    );
                    report
                        .skipped
                        .push((object.key().clone(), "already deleted".to_string()));
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.log_failure(&object, "delete", &reason);
                    report.failed.push((object.key().clone(), reason));
                }
            }
        }

        tracing::info!(dry_run = self.dry_run, "{}", report.summary());
        report
    }

    async fn create_or_update(&self, resource: &ResourceType, object: &ManagedObject) -> Result<Applied> {
        match self.cluster.create(resource, object).await {
            Ok(()) => Ok(Applied::Created),
            Err(e) if e.is_already_exists() => {
                self.cluster.update(resource, object).await?;
                Ok(Applied::Updated)
            }
            Err(e) => Err(e),
        }
    }

    async fn mapping(
        &self,
        cache: &mut HashMap<GroupVersionKind, std::result::Result<ResourceType, String>>,
        object: &ManagedObject,
    ) -> std::result::Result<ResourceType, String> {
        if let Some(cached) = cache.get(object.gvk()) {
            return cached.clone();
        }

        let resolved = self
            .cluster
            .resolve(object.gvk())
            .await
            .map_err(|e: KubeError| e.to_string());
        cache.insert(object.gvk().clone(), resolved.clone());
        resolved
    }

    fn log_success(&self, object: &ManagedObject, message: &str) {
        tracing::info!(
            namespace = object.namespace().unwrap_or_default(),
            name = %object.name(),
            gvk = %object.gvk(),
            class = object.owner(self.label_key).unwrap_or_default(),
            "{}",
            message
        );
    }

    fn log_failure(&self, object: &ManagedObject, action: &str, reason: &str) {
        tracing::error!(
            namespace = object.namespace().unwrap_or_default(),
            name = %object.name(),
            gvk = %object.gvk(),
            class = object.owner(self.label_key).unwrap_or_default(),
            action,
            error = %reason,
            "failed to {} resource",
            action
        );
    }
}

enum Applied {
    Created,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockCluster, Operation};
    use namespice_core::{Document, delta};
    use serde_json::json;

    const LABEL: &str = "namespice.io/class";

    fn object(kind: &str, name: &str, owner: &str, data: &str) -> ManagedObject {
        let api_version = match kind {
            "NetworkPolicy" => "networking.k8s.io/v1",
            _ => "v1",
        };
        let mut doc = Document(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {"name": name, "namespace": "team-a"},
            "data": {"value": data}
        }));
        doc.set_label(LABEL, owner);
        ManagedObject::from_document(doc).unwrap()
    }

    fn cluster() -> MockCluster {
        MockCluster::new()
            .with_type("v1", "ConfigMap", true)
            .with_type("v1", "ResourceQuota", true)
            .with_type("networking.k8s.io/v1", "NetworkPolicy", true)
    }

    #[tokio::test]
    async fn test_execute_creates_and_deletes() {
        let cluster = cluster();
        let stale = object("ConfigMap", "stale", "base", "old");
        cluster.insert(stale.clone());

        let desired = vec![object("ResourceQuota", "quota", "quota", "x")];
        let plan = delta(&[stale], &desired);

        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert!(report.is_success());
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(cluster.object_count(), 1);
        assert_eq!(cluster.objects()[0].name(), "quota");
    }

    #[tokio::test]
    async fn test_cluster_scoped_objects_are_sent_without_namespace() {
        let cluster = MockCluster::new().with_type("rbac.authorization.k8s.io/v1", "ClusterRole", false);
        let mut doc = Document(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRole",
            "metadata": {"name": "viewer", "namespace": "team-a"},
            "rules": []
        }));
        doc.set_label(LABEL, "rbac");
        let role = ManagedObject::from_document(doc).unwrap();

        let plan = delta(&[], &[role.clone()]);
        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert!(report.is_success());
        assert_eq!(report.created[0].to_string(), "ClusterRole/viewer");
        assert_eq!(cluster.journal()[0].1.namespace, None);

        // The namespace-stamped copy still names the stored object
        let report = Executor::new(&cluster, LABEL)
            .execute(&delta(&[role], &[]))
            .await;
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn test_create_conflict_falls_back_to_update() {
        let cluster = cluster();
        cluster.insert(object("ConfigMap", "cfg", "base", "old body"));

        // Same identity, different body: the delta engine only sees identities
        let plan = ObjectDelta {
            create_or_update: vec![object("ConfigMap", "cfg", "base", "new body")],
            delete: Vec::new(),
        };

        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert!(report.is_success());
        assert!(report.created.is_empty());
        assert_eq!(report.updated.len(), 1);

        let counts = cluster.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.updates, 1);
        assert_eq!(counts.deletes, 0);

        let stored = cluster.get(plan.create_or_update[0].key()).unwrap();
        assert_eq!(stored.document().get_str("data.value"), Some("new body"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let cluster = cluster();
        cluster.fail(Operation::Create, "broken", 422, "Invalid");

        let plan = ObjectDelta {
            create_or_update: vec![
                object("ConfigMap", "broken", "base", "x"),
                object("ConfigMap", "fine", "base", "y"),
            ],
            delete: Vec::new(),
        };

        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.name, "broken");
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].name, "fine");
        // A plain failure never triggers the update fallback
        assert_eq!(cluster.operation_counts().updates, 0);
    }

    #[tokio::test]
    async fn test_plain_conflict_is_not_already_exists() {
        let cluster = cluster();
        cluster.fail(Operation::Create, "cfg", 409, "Conflict");

        let plan = ObjectDelta {
            create_or_update: vec![object("ConfigMap", "cfg", "base", "x")],
            delete: Vec::new(),
        };
        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(cluster.operation_counts().updates, 0);
    }

    #[tokio::test]
    async fn test_unmapped_kind_skips_only_that_object() {
        let cluster = MockCluster::new().with_type("v1", "ConfigMap", true);

        let plan = ObjectDelta {
            create_or_update: vec![
                object("NetworkPolicy", "deny", "net", "x"),
                object("NetworkPolicy", "allow-dns", "net", "x"),
                object("ConfigMap", "cfg", "base", "y"),
            ],
            delete: Vec::new(),
        };
        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].1.contains("no resource mapping"));
        assert_eq!(report.created.len(), 1);
        // Mapping results are reused within a batch
        assert_eq!(cluster.operation_counts().resolves, 2);
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_is_skipped() {
        let cluster = cluster();
        let plan = ObjectDelta {
            create_or_update: Vec::new(),
            delete: vec![object("ConfigMap", "gone", "base", "x")],
        };

        let report = Executor::new(&cluster, LABEL).execute(&plan).await;

        assert!(report.is_success());
        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_calls_no_mutating_verb() {
        let cluster = cluster();
        let existing = object("ConfigMap", "old", "base", "x");
        cluster.insert(existing.clone());

        let plan = ObjectDelta {
            create_or_update: vec![object("ConfigMap", "new", "base", "y")],
            delete: vec![existing],
        };
        let report = Executor::new(&cluster, LABEL)
            .with_dry_run(true)
            .execute(&plan)
            .await;

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.deleted.len(), 1);
        let counts = cluster.operation_counts();
        assert_eq!(counts.creates + counts.updates + counts.deletes, 0);
        assert_eq!(cluster.object_count(), 1);

        insta::assert_snapshot!(report.summary(), @"1 would create, 0 would update, 1 would delete, 0 skipped, 0 failed");
    }

    #[tokio::test]
    async fn test_empty_delta_touches_nothing() {
        let cluster = cluster();
        let report = Executor::new(&cluster, LABEL)
            .execute(&ObjectDelta::default())
            .await;

        assert_eq!(report, ExecutionReport::default());
        assert_eq!(cluster.operation_counts().resolves, 0);
    }

    #[test]
    fn test_report_display() {
        let key = object("ConfigMap", "cfg", "base", "x").key().clone();
        let report = ExecutionReport {
            created: vec![key.clone()],
            failed: vec![(key, "boom".to_string())],
            ..Default::default()
        };

        insta::assert_snapshot!(report.to_string(), @r"
        created team-a/ConfigMap/cfg
        failed team-a/ConfigMap/cfg: boom
        ");
        insta::assert_snapshot!(report.summary(), @"1 created, 0 updated, 0 deleted, 0 skipped, 1 failed");
    }
}
