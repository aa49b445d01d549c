//! [`ClusterClient`] backed by a live Kubernetes API server

use async_trait::async_trait;
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    Client,
};
use tracing::debug;

use super::{ClusterClient, DiscoveredResources, GroupDiscoveryFailure, ManagedResource};
use crate::error::{Error, Result};
use crate::selector::Selector;

/// Preferred version of the core group
const CORE_VERSION: &str = "v1";

/// Cluster access through a kube [`Client`]
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    field_manager: String,
}

impl KubeCluster {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str, api_resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, api_resource)
    }

    /// Preferred group version of every served group, core group first
    async fn preferred_group_versions(&self) -> Result<Vec<String>> {
        let core = self.client.list_core_api_versions().await?;
        let mut group_versions = Vec::new();
        if core.versions.iter().any(|v| v == CORE_VERSION) {
            group_versions.push(CORE_VERSION.to_string());
        } else if let Some(first) = core.versions.first() {
            group_versions.push(first.clone());
        }

        let groups = self.client.list_api_groups().await?;
        for group in groups.groups {
            let preferred = group
                .preferred_version
                .map(|v| v.group_version)
                .or_else(|| group.versions.first().map(|v| v.group_version.clone()));
            match preferred {
                Some(group_version) => group_versions.push(group_version),
                None => debug!(group = %group.name, "API group serves no versions"),
            }
        }
        Ok(group_versions)
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn server_preferred_resources(&self) -> Result<DiscoveredResources> {
        let group_versions = self
            .preferred_group_versions()
            .await
            .map_err(|e| Error::discovery(format!("unable to list API groups: {e}")))?;

        let mut discovered = DiscoveredResources::default();
        for group_version in group_versions {
            // Core group versions have no group prefix
            let listed = if group_version.contains('/') {
                self.client.list_api_group_resources(&group_version).await
            } else {
                self.client.list_core_api_resources(&group_version).await
            };
            match listed {
                Ok(list) => discovered.resources.push(list),
                Err(error) => discovered.failed_groups.push(GroupDiscoveryFailure {
                    group_version,
                    error: error.into(),
                }),
            }
        }
        Ok(discovered)
    }

    async fn list(
        &self,
        namespace: &str,
        api_resource: &ApiResource,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>> {
        let params = ListParams::default().labels(&selector.to_string());
        let list = self.api(namespace, api_resource).list(&params).await?;
        Ok(list.items)
    }

    async fn delete(&self, namespace: &str, api_resource: &ApiResource, name: &str) -> Result<()> {
        self.api(namespace, api_resource)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn apply(&self, resource: &ManagedResource) -> Result<()> {
        let namespace = resource
            .namespace()
            .ok_or_else(|| Error::validation(format!("{} {} has no namespace", resource.kind(), resource.name())))?;
        let params = PatchParams::apply(&self.field_manager).force();
        self.api(&namespace, &resource.api_resource)
            .patch(&resource.name(), &params, &Patch::Apply(&resource.object))
            .await?;
        Ok(())
    }
}
