//! Namespice Core - Core types for the namespace class controller
//!
//! This crate provides the cluster-independent half of namespice:
//! - `Document`: Untyped resource documents (the body of every template)
//! - `ClassPolicy`: A named set of resource templates a namespace opts into
//! - `ManagedObject`: A concrete object identified by kind, namespace and name
//! - `compile`: Desired-state compilation from a namespace and its classes
//! - `delta`: Identity-based diff between actual and desired object sets
//! - `ControllerConfig`: Keys, intervals and limits of the controller

pub mod compile;
pub mod config;
pub mod delta;
pub mod document;
pub mod error;
pub mod object;
pub mod policy;

pub use compile::{compile, compile_all};
pub use config::{ControllerConfig, DEFAULT_ANNOTATION_KEY, DEFAULT_LABEL_KEY};
pub use delta::{ObjectDelta, delta};
pub use document::Document;
pub use error::{CoreError, Result};
pub use object::{GroupVersionKind, ManagedObject, ObjectKey};
pub use policy::{ClassPolicy, NamespaceInfo, parse_class_list};
