//! Desired-state compilation
//!
//! Maps a namespace and an ordered list of class policies to the objects
//! that should exist in that namespace. Every template is copied, stamped
//! with the namespace and labelled with the class it came from. Nothing is
//! read from or written to the cluster, and the policies passed in are
//! never modified.

use crate::error::{CoreError, Result};
use crate::object::ManagedObject;
use crate::policy::ClassPolicy;

/// Compile the desired objects of one namespace
///
/// Templates without an identity (`apiVersion`, `kind`, `metadata.name`)
/// are skipped with a warning.
pub fn compile<'a, I>(namespace: &str, classes: I, label_key: &str) -> Vec<ManagedObject>
where
    I: IntoIterator<Item = &'a ClassPolicy>,
{
    let mut objects = Vec::new();

    for class in classes {
        for index in 0..class.resources.len() {
            match compile_template(namespace, class, index, label_key) {
                Ok(obj) => objects.push(obj),
                Err(e) => {
                    tracing::warn!(
                        namespace = %namespace,
                        class = %class.name,
                        index,
                        error = %e,
                        "skipping invalid template"
                    );
                }
            }
        }
    }

    objects
}

/// Compile the desired objects of many namespaces into one flat set
pub fn compile_all<'a, I, C>(entries: I, label_key: &str) -> Vec<ManagedObject>
where
    I: IntoIterator<Item = (&'a str, C)>,
    C: IntoIterator<Item = &'a ClassPolicy>,
{
    entries
        .into_iter()
        .flat_map(|(namespace, classes)| compile(namespace, classes, label_key))
        .collect()
}

/// Compile a single template of a class
pub fn compile_template(
    namespace: &str,
    class: &ClassPolicy,
    index: usize,
    label_key: &str,
) -> Result<ManagedObject> {
    let template = class
        .resources
        .get(index)
        .ok_or_else(|| CoreError::InvalidTemplate {
            class: class.name.clone(),
            index,
            message: "no such template".to_string(),
        })?;

    if !template.is_mapping() {
        return Err(CoreError::InvalidTemplate {
            class: class.name.clone(),
            index,
            message: "template is not a mapping".to_string(),
        });
    }

    let mut doc = template.clone();
    doc.set_namespace(namespace);
    doc.set_label(label_key, &class.name);

    ManagedObject::from_document(doc).map_err(|e| CoreError::InvalidTemplate {
        class: class.name.clone(),
        index,
        message: e.to_string(),
    })
}
