//! Runtime discovery of the resource kinds eligible for garbage collection

use kube::{
    api::{ApiResource, GroupVersionKind},
    core::gvk::GroupVersion,
};
use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::error::Result;

/// Return every namespaced kind, at its preferred version, that supports all `verbs`.
///
/// Groups that fail to list their resources are skipped; only a failure of
/// discovery as a whole is returned as an error.
pub async fn discover_kinds(cluster: &dyn ClusterClient, verbs: &[&str]) -> Result<Vec<ApiResource>> {
    let discovered = cluster.server_preferred_resources().await?;

    for failure in &discovered.failed_groups {
        warn!(
            group_version = %failure.group_version,
            error = %failure.error,
            "Skipping API group that failed discovery"
        );
    }

    let mut kinds = Vec::new();
    for list in &discovered.resources {
        let group_version: GroupVersion = match list.group_version.parse() {
            Ok(gv) => gv,
            Err(e) => {
                warn!(group_version = %list.group_version, error = %e, "Skipping malformed group version");
                continue;
            }
        };

        for resource in &list.resources {
            // Subresources such as pods/log are not kinds of their own
            if resource.name.contains('/') || !resource.namespaced {
                continue;
            }
            if !verbs.iter().all(|verb| resource.verbs.iter().any(|v| v == verb)) {
                continue;
            }
            let gvk = GroupVersionKind::gvk(&group_version.group, &group_version.version, &resource.kind);
            kinds.push(ApiResource::from_gvk_with_plural(&gvk, &resource.name));
        }
    }

    debug!(kinds = kinds.len(), "Discovered collectable resource kinds");
    Ok(kinds)
}
