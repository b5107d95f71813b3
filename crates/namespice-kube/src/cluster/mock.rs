//! Mock cluster for testing
//!
//! Keeps objects in memory and answers like the API server does for the
//! cases the engine distinguishes: already-exists on create, not-found on
//! update/delete, and injected per-object or per-type failures. Objects of
//! types registered as cluster-scoped are stored without a namespace.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use namespice_core::{GroupVersionKind, ManagedObject, ObjectKey};

use super::{ClusterApi, Discovery, ResourceType};
use crate::error::{KubeError, Result, api_error};

/// Cluster operation, for counters and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Discover,
    Resolve,
    List,
    Create,
    Update,
    Delete,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub discovers: usize,
    pub resolves: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

/// Injected API failure: status code and reason
type Failure = (u16, String);

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    /// Known resource types
    types: Arc<RwLock<Vec<ResourceType>>>,
    /// Stored objects by identity
    objects: Arc<RwLock<BTreeMap<ObjectKey, ManagedObject>>>,
    /// Failures keyed by operation and target (object name, or kind for list/resolve)
    failures: Arc<RwLock<HashMap<(Operation, String), Failure>>>,
    /// Group-versions reported as unavailable by discovery
    unavailable: Arc<RwLock<Vec<String>>>,
    /// Mutating calls in the order they were made
    journal: Arc<RwLock<Vec<(Operation, ObjectKey)>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

impl MockCluster {
    /// Create a new empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type
    pub fn with_type(self, api_version: &str, kind: &str, namespaced: bool) -> Self {
        let gvk = GroupVersionKind::from_api_version(api_version, kind);
        write(&self.types).push(ResourceType::from_gvk(&gvk, namespaced));
        self
    }

    /// Store an object as if it already existed in the cluster
    pub fn insert(&self, object: ManagedObject) {
        let object = self.stored(object);
        write(&self.objects).insert(object.key().clone(), object);
    }

    /// Make an operation fail for a target with an API status error
    ///
    /// The target is the object name for create/update/delete and the kind
    /// for list/resolve. Use `Operation::Discover` with any target to fail
    /// discovery.
    pub fn fail(&self, operation: Operation, target: &str, code: u16, reason: &str) {
        let key = match operation {
            Operation::Discover => String::new(),
            _ => target.to_string(),
        };
        write(&self.failures).insert((operation, key), (code, reason.to_string()));
    }

    /// Report a group-version as unavailable; its types drop out of discovery
    pub fn fail_group(&self, api_version: &str) {
        write(&self.unavailable).push(api_version.to_string());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        write(&self.failures).clear();
        write(&self.unavailable).clear();
    }

    /// All stored objects, in identity order
    pub fn objects(&self) -> Vec<ManagedObject> {
        read(&self.objects).values().cloned().collect()
    }

    /// Get a stored object by identity
    pub fn get(&self, key: &ObjectKey) -> Option<ManagedObject> {
        read(&self.objects).get(key).cloned()
    }

    /// Count stored objects
    pub fn object_count(&self) -> usize {
        read(&self.objects).len()
    }

    /// Mutating calls made so far
    pub fn journal(&self) -> Vec<(Operation, ObjectKey)> {
        read(&self.journal).clone()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        read(&self.operations).clone()
    }

    /// Reset operation counts and the journal
    pub fn reset_counts(&self) {
        *write(&self.operations) = OperationCounts::default();
        write(&self.journal).clear();
    }

    fn count(&self, operation: Operation) {
        let mut ops = write(&self.operations);
        match operation {
            Operation::Discover => ops.discovers += 1,
            Operation::Resolve => ops.resolves += 1,
            Operation::List => ops.lists += 1,
            Operation::Create => ops.creates += 1,
            Operation::Update => ops.updates += 1,
            Operation::Delete => ops.deletes += 1,
        }
    }

    fn record(&self, operation: Operation, object: &ManagedObject) {
        self.count(operation);
        write(&self.journal).push((operation, object.key().clone()));
    }

    /// The object as the API server would keep it
    fn stored(&self, object: ManagedObject) -> ManagedObject {
        let cluster_scoped = read(&self.types)
            .iter()
            .any(|t| &t.gvk() == object.gvk() && !t.namespaced);
        if cluster_scoped {
            object.into_cluster_scoped()
        } else {
            object
        }
    }

    fn injected(&self, operation: Operation, target: &str) -> Result<()> {
        match read(&self.failures).get(&(operation, target.to_string())) {
            Some((code, reason)) => Err(api_error(
                *code,
                reason,
                format!("injected {:?} failure for {}", operation, target),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn discover(&self) -> Result<Discovery> {
        self.count(Operation::Discover);
        self.injected(Operation::Discover, "")?;

        let failed_groups = read(&self.unavailable).clone();
        let types = read(&self.types)
            .iter()
            .filter(|t| !failed_groups.contains(&t.api_resource.api_version))
            .cloned()
            .collect();
        Ok(Discovery {
            types,
            failed_groups,
        })
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceType> {
        self.count(Operation::Resolve);
        self.injected(Operation::Resolve, &gvk.kind)?;
        read(&self.types)
            .iter()
            .find(|t| &t.gvk() == gvk)
            .cloned()
            .ok_or_else(|| KubeError::ResourceNotMapped {
                gvk: gvk.to_string(),
            })
    }

    async fn list(
        &self,
        resource: &ResourceType,
        label_selector: &str,
    ) -> Result<Vec<ManagedObject>> {
        self.count(Operation::List);
        self.injected(Operation::List, &resource.api_resource.kind)?;

        let gvk = resource.gvk();
        let (label_key, label_value) = match label_selector.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (label_selector, None),
        };

        Ok(read(&self.objects)
            .values()
            .filter(|o| o.gvk() == &gvk)
            .filter(|o| match (o.document().label(label_key), label_value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
            .collect())
    }

    async fn create(&self, _resource: &ResourceType, object: &ManagedObject) -> Result<()> {
        self.record(Operation::Create, object);
        self.injected(Operation::Create, object.name())?;

        let object = self.stored(object.clone());
        let mut objects = write(&self.objects);
        if objects.contains_key(object.key()) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} already exists", object.key()),
            ));
        }
        objects.insert(object.key().clone(), object);
        Ok(())
    }

    async fn update(&self, _resource: &ResourceType, object: &ManagedObject) -> Result<()> {
        self.record(Operation::Update, object);
        self.injected(Operation::Update, object.name())?;

        let object = self.stored(object.clone());
        let mut objects = write(&self.objects);
        match objects.get_mut(object.key()) {
            Some(existing) => {
                *existing = object;
                Ok(())
            }
            None => Err(api_error(404, "NotFound", format!("{} not found", object.key()))),
        }
    }

    async fn delete(&self, _resource: &ResourceType, object: &ManagedObject) -> Result<()> {
        self.record(Operation::Delete, object);
        self.injected(Operation::Delete, object.name())?;

        let object = self.stored(object.clone());
        match write(&self.objects).remove(object.key()) {
            Some(_) => Ok(()),
            None => Err(api_error(404, "NotFound", format!("{} not found", object.key()))),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
