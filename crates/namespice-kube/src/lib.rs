//! Namespice Kube - Kubernetes integration for namespice
//!
//! This crate provides:
//! - **NamespaceClass**: The cluster-scoped custom resource holding class templates
//! - **Cluster access**: Discovery, mapping and dynamic-object verbs behind `ClusterApi`
//! - **Watch caches**: Namespace and class stores fed by watch streams, emitting typed events
//! - **Scanner**: Cluster-wide search for objects carrying the ownership label
//! - **Executor**: Delta application with create-to-update fallback and per-object reporting
//! - **Controller**: The reconciliation state machine tying it all together

pub mod cache;
pub mod cluster;
pub mod controller;
pub mod error;
pub mod executor;
pub mod scanner;
pub mod types;

#[cfg(test)]
mod fake_api;

pub use cache::{ResourceEvent, Store, WatchEvent, run_watch};
pub use cluster::{
    ClusterApi, Discovery, FIELD_MANAGER, KubeCluster, MockCluster, Operation, OperationCounts,
    ResourceType,
};
pub use controller::{Controller, ControllerState, NamespaceDelta};
pub use error::{KubeError, Result};
pub use executor::{ExecutionReport, Executor};
pub use scanner::{ScanResult, scan_managed};
pub use types::{NamespaceClass, classes_from_yaml, namespace_info};
