//! API-server backed cluster access
//!
//! Dynamic objects are handled without compile-time type knowledge: kinds
//! are resolved through a cached discovery snapshot, and documents are
//! sent as `DynamicObject`s.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::{GroupVersion, TypeMeta},
    discovery::{self as kube_discovery, Scope, verbs},
};
use tokio::sync::RwLock;

use namespice_core::{Document, GroupVersionKind, ManagedObject};

use super::{ClusterApi, Discovery, ResourceType};
use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "namespice";

/// Group-versions queried at once during discovery
const DISCOVERY_CONCURRENCY: usize = 8;

/// What the last discovery pass found
#[derive(Default)]
struct Catalog {
    /// Every served kind, in every served version
    kinds: HashMap<GroupVersionKind, ResourceType>,
    /// Listable kinds at each group's preferred version
    listable: Vec<ResourceType>,
    /// Group-versions that did not answer
    failed: Vec<String>,
}

/// One group-version to query
struct Target {
    group_version: GroupVersion,
    preferred: bool,
}

impl Catalog {
    /// Query every group-version separately
    ///
    /// A group that fails (typically an aggregated API whose backend is
    /// down) is logged and left out. Only failing to list the groups
    /// themselves is an error.
    async fn query(client: &Client) -> Result<Self> {
        let groups = client.list_api_groups().await.map_err(KubeError::Api)?;

        let mut catalog = Catalog::default();
        let mut targets = Vec::new();
        for group in groups.groups {
            let preferred = group
                .preferred_version
                .as_ref()
                .or(group.versions.first())
                .map(|v| v.version.clone());
            for version in &group.versions {
                targets.push(Target {
                    group_version: GroupVersion::gv(&group.name, &version.version),
                    preferred: preferred.as_deref() == Some(version.version.as_str()),
                });
            }
        }

        match client.list_core_api_versions().await {
            Ok(core) => targets.extend(core.versions.iter().map(|version| Target {
                group_version: GroupVersion::gv("", version),
                preferred: version == "v1",
            })),
            Err(e) => {
                tracing::warn!(error = %e, "core API versions unavailable, core types are skipped");
                catalog.failed.push("v1".to_string());
            }
        }

        let answers: Vec<_> = stream::iter(targets)
            .map(|target| async move {
                let answer = kube_discovery::pinned_group(client, &target.group_version).await;
                (target, answer)
            })
            .buffer_unordered(DISCOVERY_CONCURRENCY)
            .collect()
            .await;

        for (target, answer) in answers {
            let group = match answer {
                Ok(group) => group,
                Err(e) => {
                    let group_version = target.group_version.api_version();
                    tracing::warn!(group_version = %group_version, error = %e, "API group unavailable, its types are skipped");
                    catalog.failed.push(group_version);
                    continue;
                }
            };
            for (api_resource, caps) in group.recommended_resources() {
                let resource = ResourceType {
                    api_resource,
                    namespaced: caps.scope == Scope::Namespaced,
                };
                if target.preferred && caps.supports_operation(verbs::LIST) {
                    catalog.listable.push(resource.clone());
                }
                catalog.kinds.insert(resource.gvk(), resource);
            }
        }

        catalog.listable.sort_by_cached_key(ResourceType::gvk);
        catalog.failed.sort();
        tracing::debug!(
            kinds = catalog.kinds.len(),
            listable = catalog.listable.len(),
            failed = catalog.failed.len(),
            "discovery finished"
        );
        Ok(catalog)
    }
}

/// Cluster access through a kube client
pub struct KubeCluster {
    /// Kubernetes client
    client: Client,
    /// Result of the last discovery pass
    catalog: RwLock<Catalog>,
}

impl KubeCluster {
    /// Create a new KubeCluster, running discovery once
    ///
    /// Unavailable API groups are tolerated; only an unreachable API
    /// server fails.
    pub async fn new(client: Client) -> Result<Self> {
        let catalog = Catalog::query(&client).await?;
        Ok(Self {
            client,
            catalog: RwLock::new(catalog),
        })
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&self) -> Result<()> {
        let catalog = Catalog::query(&self.client).await?;
        *self.catalog.write().await = catalog;
        Ok(())
    }

    /// Look a kind up in the cached discovery snapshot
    async fn lookup(&self, gvk: &GroupVersionKind) -> Option<ResourceType> {
        self.catalog.read().await.kinds.get(gvk).cloned()
    }

    /// Create an Api client for one object of a resource type
    fn api_for(&self, resource: &ResourceType, object: &ManagedObject) -> Api<DynamicObject> {
        if resource.namespaced {
            let ns = object.namespace().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn discover(&self) -> Result<Discovery> {
        self.refresh_discovery().await?;

        let catalog = self.catalog.read().await;
        Ok(Discovery {
            types: catalog.listable.clone(),
            failed_groups: catalog.failed.clone(),
        })
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceType> {
        if let Some(resource) = self.lookup(gvk).await {
            return Ok(resource);
        }

        // The kind may belong to a CRD installed after the last discovery
        tracing::debug!(gvk = %gvk, "kind not in discovery cache, refreshing");
        self.refresh_discovery().await?;
        self.lookup(gvk)
            .await
            .ok_or_else(|| KubeError::ResourceNotMapped {
                gvk: gvk.to_string(),
            })
    }

    async fn list(
        &self,
        resource: &ResourceType,
        label_selector: &str,
    ) -> Result<Vec<ManagedObject>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource.api_resource);
        let list = api
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(KubeError::Api)?;

        let mut objects = Vec::with_capacity(list.items.len());
        for mut item in list.items {
            // List items come back without apiVersion/kind
            if item.types.is_none() {
                item.types = Some(TypeMeta {
                    api_version: resource.api_resource.api_version.clone(),
                    kind: resource.api_resource.kind.clone(),
                });
            }
            let document = Document(serde_json::to_value(&item)?);
            objects.push(ManagedObject::from_document(document)?);
        }

        Ok(objects)
    }

    async fn create(&self, resource: &ResourceType, object: &ManagedObject) -> Result<()> {
        let obj = to_dynamic(object)?;
        let mut params = PostParams::default();
        params.field_manager = Some(FIELD_MANAGER.to_string());

        self.api_for(resource, object)
            .create(&params, &obj)
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }

    async fn update(&self, resource: &ResourceType, object: &ManagedObject) -> Result<()> {
        let obj = to_dynamic(object)?;

        // Server-Side Apply takes the whole template without needing the
        // current resourceVersion
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        self.api_for(resource, object)
            .patch(object.name(), &params, &Patch::Apply(&obj))
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }

    async fn delete(&self, resource: &ResourceType, object: &ManagedObject) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };

        self.api_for(resource, object)
            .delete(object.name(), &params)
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }
}

/// Convert a managed object into a dynamic API object
fn to_dynamic(object: &ManagedObject) -> Result<DynamicObject> {
    Ok(serde_json::from_value(object.document().inner().clone())?)
}
