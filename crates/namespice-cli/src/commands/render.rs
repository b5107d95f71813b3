//! Render command - compile a namespace's desired state offline

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use console::style;
use kube::ResourceExt;

use namespice_core::{ClassPolicy, ControllerConfig, compile, parse_class_list};
use namespice_kube::classes_from_yaml;

use crate::error::{CliError, Result};

/// Render the objects a namespace would receive
///
/// `classes` is the annotation value to simulate; when absent every class
/// found in the files is used, in file order.
pub fn run(
    config: &ControllerConfig,
    namespace: &str,
    classes: Option<&str>,
    files: &[PathBuf],
) -> Result<()> {
    let output = render(config, namespace, classes, files)?;
    print!("{}", output);
    Ok(())
}

/// Render to a multi-document YAML string
pub fn render(
    config: &ControllerConfig,
    namespace: &str,
    classes: Option<&str>,
    files: &[PathBuf],
) -> Result<String> {
    if files.is_empty() {
        return Err(CliError::render_with_help(
            "no class files given",
            "pass NamespaceClass manifests with -f/--file",
        ));
    }

    let mut order = Vec::new();
    let mut by_name: HashMap<String, ClassPolicy> = HashMap::new();
    for file in files {
        let content = fs::read_to_string(file)
            .map_err(|e| CliError::render(format!("failed to read {}: {}", file.display(), e)))?;
        let parsed = classes_from_yaml(&content)
            .map_err(|e| CliError::render(format!("{}: {}", file.display(), e)))?;
        for class in parsed {
            let name = class.name_any();
            if by_name.insert(name.clone(), class.to_policy()).is_none() {
                order.push(name);
            }
        }
    }

    let requested = match classes {
        Some(list) => parse_class_list(list),
        None => order,
    };

    let mut policies = Vec::with_capacity(requested.len());
    for name in &requested {
        match by_name.get(name) {
            Some(policy) => policies.push(policy.clone()),
            None => eprintln!(
                "{} class {} not found in the given files, skipping",
                style("⚠").yellow(),
                style(name).cyan()
            ),
        }
    }

    let objects = compile(namespace, &policies, &config.label_key);
    tracing::debug!(namespace, objects = objects.len(), "rendered desired state");

    let mut output = String::new();
    for object in &objects {
        let yaml = serde_yaml::to_string(object.document())
            .map_err(|e| CliError::internal(format!("failed to serialize {}: {}", object.key(), e)))?;
        output.push_str("---\n");
        output.push_str(&yaml);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSES: &str = r#"
apiVersion: namespice.io/v1
kind: NamespaceClass
metadata:
  name: net
resources:
  - apiVersion: networking.k8s.io/v1
    kind: NetworkPolicy
    metadata:
      name: deny-all
    spec:
      podSelector: {}
---
apiVersion: namespice.io/v1
kind: NamespaceClass
metadata:
  name: quota
resources:
  - apiVersion: v1
    kind: ResourceQuota
    metadata:
      name: compute
"#;

    fn classes_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.yaml");
        fs::write(&path, CLASSES).unwrap();
        (dir, path)
    }

    #[test]
    fn test_render_selected_class() {
        let (_dir, path) = classes_file();
        let output = render(&ControllerConfig::default(), "team-a", Some("net"), &[path]).unwrap();

        assert!(output.starts_with("---\n"));
        assert!(output.contains("name: deny-all"));
        assert!(output.contains("namespace: team-a"));
        assert!(output.contains("namespice.io/class: net"));
        assert!(!output.contains("compute"));
    }

    #[test]
    fn test_render_all_classes_by_default() {
        let (_dir, path) = classes_file();
        let output = render(&ControllerConfig::default(), "team-a", None, &[path]).unwrap();
        assert_eq!(output.matches("---\n").count(), 2);
    }

    #[test]
    fn test_render_unknown_class_is_skipped() {
        let (_dir, path) = classes_file();
        let output = render(&ControllerConfig::default(), "team-a", Some("missing"), &[path]).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_render_missing_file() {
        let err = render(
            &ControllerConfig::default(),
            "team-a",
            None,
            &[PathBuf::from("/nonexistent/classes.yaml")],
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Render { .. }));
    }
}
