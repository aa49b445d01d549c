//! In-memory [`ClusterClient`] for tests and local experiments
//!
//! Holds objects and discovery data in a shared map and can be told to fail
//! specific calls with an API status code.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::api::{ApiResource, DynamicObject};
use serde_json::json;

use super::{ClusterClient, DiscoveredResources, GroupDiscoveryFailure, ManagedResource};
use crate::error::{Error, Result};
use crate::selector::Selector;

/// Identity of a stored object: (apiVersion, kind, namespace, name)
type ObjectKey = (String, String, String, String);

#[derive(Default)]
struct State {
    groups: BTreeMap<String, APIResourceList>,
    failing_groups: Vec<String>,
    discovery_unavailable: bool,
    objects: BTreeMap<ObjectKey, ManagedResource>,
    list_failures: HashMap<String, u16>,
    delete_failures: HashMap<String, u16>,
    list_calls: Vec<String>,
    delete_calls: Vec<String>,
}

/// A fake cluster keeping everything in memory
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<State>>,
}

/// Build the error the API server would return for a status code
fn api_error(code: u16, message: impl Into<String>) -> Error {
    let reason = match code {
        403 => "Forbidden",
        404 => "NotFound",
        405 => "MethodNotAllowed",
        409 => "Conflict",
        _ => "InternalError",
    };
    let response = json!({
        "status": "Failure",
        "message": message.into(),
        "reason": reason,
        "code": code,
    });
    match serde_json::from_value(response) {
        Ok(response) => Error::Kube(kube::Error::Api(response)),
        Err(e) => Error::Serialization(e),
    }
}

fn key_of(resource: &ManagedResource) -> ObjectKey {
    (
        resource.api_resource.api_version.clone(),
        resource.api_resource.kind.clone(),
        resource.namespace().unwrap_or_default(),
        resource.name(),
    )
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicked test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make a kind discoverable with the given scope and verbs
    pub fn register_kind(&self, api_resource: &ApiResource, namespaced: bool, verbs: &[&str]) {
        let mut state = self.state();
        let list = state
            .groups
            .entry(api_resource.api_version.clone())
            .or_insert_with(|| APIResourceList {
                group_version: api_resource.api_version.clone(),
                ..Default::default()
            });
        list.resources.push(APIResource {
            name: api_resource.plural.clone(),
            kind: api_resource.kind.clone(),
            namespaced,
            verbs: verbs.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        });
    }

    /// Make resource listing of a group version fail during discovery
    pub fn fail_group_discovery(&self, group_version: impl Into<String>) {
        self.state().failing_groups.push(group_version.into());
    }

    /// Make discovery fail as a whole
    pub fn fail_discovery(&self) {
        self.state().discovery_unavailable = true;
    }

    /// Make every list of `kind` fail with `code`
    pub fn fail_list(&self, kind: impl Into<String>, code: u16) {
        self.state().list_failures.insert(kind.into(), code);
    }

    /// Make every delete of an object called `name` fail with `code`
    pub fn fail_delete(&self, name: impl Into<String>, code: u16) {
        self.state().delete_failures.insert(name.into(), code);
    }

    /// Store an object as if it had been created in the cluster
    pub fn insert(&self, resource: ManagedResource) {
        let key = key_of(&resource);
        self.state().objects.insert(key, resource);
    }

    /// Look up a stored object
    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<ManagedResource> {
        self.state()
            .objects
            .values()
            .find(|r| r.kind() == kind && r.namespace().as_deref() == Some(namespace) && r.name() == name)
            .cloned()
    }

    pub fn contains(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.get(kind, namespace, name).is_some()
    }

    /// All stored objects
    pub fn objects(&self) -> Vec<ManagedResource> {
        self.state().objects.values().cloned().collect()
    }

    /// Kinds listed so far, in call order
    pub fn list_calls(&self) -> Vec<String> {
        self.state().list_calls.clone()
    }

    /// `Kind/name` of every delete attempted so far, in call order
    pub fn delete_calls(&self) -> Vec<String> {
        self.state().delete_calls.clone()
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn server_preferred_resources(&self) -> Result<DiscoveredResources> {
        let state = self.state();
        if state.discovery_unavailable {
            return Err(Error::discovery("unable to list API groups: server unavailable"));
        }

        let mut discovered = DiscoveredResources::default();
        for (group_version, list) in &state.groups {
            if state.failing_groups.contains(group_version) {
                discovered.failed_groups.push(GroupDiscoveryFailure {
                    group_version: group_version.clone(),
                    error: api_error(503, format!("{group_version} is unavailable")),
                });
            } else {
                discovered.resources.push(list.clone());
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
        let mut state = self.state();
        state.list_calls.push(api_resource.kind.clone());
        if let Some(code) = state.list_failures.get(&api_resource.kind) {
            return Err(api_error(*code, format!("cannot list {}", api_resource.plural)));
        }

        let items = state
            .objects
            .values()
            .filter(|r| {
                r.api_resource.api_version == api_resource.api_version
                    && r.api_resource.kind == api_resource.kind
                    && r.namespace().as_deref() == Some(namespace)
                    && selector.matches(r.labels())
            })
            .map(|r| {
                // List items come back without type metadata
                let mut object = r.object.clone();
                object.types = None;
                object
            })
            .collect();
        Ok(items)
    }

    async fn delete(&self, namespace: &str, api_resource: &ApiResource, name: &str) -> Result<()> {
        let mut state = self.state();
        state.delete_calls.push(format!("{}/{}", api_resource.kind, name));
        if let Some(code) = state.delete_failures.get(name) {
            return Err(api_error(*code, format!("cannot delete {name}")));
        }

        let key = (
            api_resource.api_version.clone(),
            api_resource.kind.clone(),
            namespace.to_string(),
            name.to_string(),
        );
        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(api_error(404, format!("{} \"{}\" not found", api_resource.plural, name))),
        }
    }

    async fn apply(&self, resource: &ManagedResource) -> Result<()> {
        self.insert(resource.clone());
        Ok(())
    }
}
