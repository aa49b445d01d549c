//! Cluster access used by the garbage collector and the integration reconciler
//!
//! All cluster I/O goes through [`ClusterClient`], so the reconcile path and
//! the garbage collector can run against a live API server ([`KubeCluster`])
//! or an in-memory one ([`InMemoryCluster`]).

mod kube_cluster;
mod memory;

pub use kube_cluster::KubeCluster;
pub use memory::InMemoryCluster;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::{
    api::{ApiResource, DynamicObject, TypeMeta},
    Resource, ResourceExt,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::selector::Selector;

/// Outcome of a discovery pass over all API groups
#[derive(Debug, Default)]
pub struct DiscoveredResources {
    /// Resource lists of every group version that answered
    pub resources: Vec<APIResourceList>,
    /// Group versions whose resource listing failed
    pub failed_groups: Vec<GroupDiscoveryFailure>,
}

/// A single API group version that could not be discovered
#[derive(Debug)]
pub struct GroupDiscoveryFailure {
    pub group_version: String,
    pub error: Error,
}

/// Operations the operator performs against the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List the resources of the preferred version of every API group.
    ///
    /// Failures of individual groups are reported in
    /// [`DiscoveredResources::failed_groups`]; an `Err` means discovery as a
    /// whole was unavailable.
    async fn server_preferred_resources(&self) -> Result<DiscoveredResources>;

    /// List objects of one kind in a namespace matching a label selector
    async fn list(
        &self,
        namespace: &str,
        api_resource: &ApiResource,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>>;

    /// Delete a single object, letting the cluster remove dependents in the background
    async fn delete(&self, namespace: &str, api_resource: &ApiResource, name: &str) -> Result<()>;

    /// Create or update an object with server-side apply
    async fn apply(&self, resource: &ManagedResource) -> Result<()>;
}

/// A cluster object of any kind together with the descriptor addressing it
#[derive(Clone, Debug)]
pub struct ManagedResource {
    pub api_resource: ApiResource,
    pub object: DynamicObject,
}

impl ManagedResource {
    pub fn new(api_resource: ApiResource, mut object: DynamicObject) -> Self {
        object.types = Some(TypeMeta {
            api_version: api_resource.api_version.clone(),
            kind: api_resource.kind.clone(),
        });
        Self {
            api_resource,
            object,
        }
    }

    /// Convert a typed object into its dynamic representation
    pub fn from_typed<K>(obj: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let api_resource = ApiResource::erase::<K>(&());
        let object: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
        Ok(Self::new(api_resource, object))
    }

    pub fn name(&self) -> String {
        self.object.name_any()
    }

    pub fn namespace(&self) -> Option<String> {
        self.object.namespace()
    }

    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        self.object.labels()
    }
}
