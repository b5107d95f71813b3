//! Delta engine: identity-based diff of object sets
//!
//! Objects are matched on [`ObjectKey`] only. An object present on both
//! sides is left alone even if labels or body differ; content drift is not
//! detected here.

use std::collections::HashSet;

use crate::object::{ManagedObject, ObjectKey};

/// Operations that turn `actual` into `desired`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDelta {
    /// Desired objects missing from the actual set
    pub create_or_update: Vec<ManagedObject>,
    /// Actual objects missing from the desired set
    pub delete: Vec<ManagedObject>,
}

impl ObjectDelta {
    /// Check if there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.create_or_update.is_empty() && self.delete.is_empty()
    }

    /// Total number of operations
    pub fn len(&self) -> usize {
        self.create_or_update.len() + self.delete.len()
    }

    /// Merge another delta into this one
    pub fn extend(&mut self, other: ObjectDelta) {
        self.create_or_update.extend(other.create_or_update);
        self.delete.extend(other.delete);
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No changes".to_string();
        }

        let mut parts = Vec::with_capacity(2);
        if !self.create_or_update.is_empty() {
            parts.push(format!("{} to create or update", self.create_or_update.len()));
        }
        if !self.delete.is_empty() {
            parts.push(format!("{} to delete", self.delete.len()));
        }
        parts.join(", ")
    }
}

/// Compute the delta between what exists and what should exist
///
/// Duplicate identities within one side collapse to their first occurrence.
pub fn delta(actual: &[ManagedObject], desired: &[ManagedObject]) -> ObjectDelta {
    let actual_keys: HashSet<&ObjectKey> = actual.iter().map(ManagedObject::key).collect();
    let desired_keys: HashSet<&ObjectKey> = desired.iter().map(ManagedObject::key).collect();

    ObjectDelta {
        create_or_update: missing_from(desired, &actual_keys),
        delete: missing_from(actual, &desired_keys),
    }
}

/// Objects of `objects` whose key is not in `other`, first occurrence only
fn missing_from(objects: &[ManagedObject], other: &HashSet<&ObjectKey>) -> Vec<ManagedObject> {
    let mut seen = HashSet::new();
    objects
        .iter()
        .filter(|o| !other.contains(o.key()) && seen.insert(o.key()))
        .cloned()
        .collect()
}
