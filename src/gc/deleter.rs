//! Best-effort deletion of collected resources

use tracing::{debug, error};

use crate::cluster::{ClusterClient, ManagedResource};
use crate::metrics;

/// Tally of a deletion pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Resources removed by this pass
    pub deleted: usize,
    /// Resources that were already gone
    pub already_gone: usize,
    /// Resources whose deletion failed
    pub failed: usize,
}

impl DeletionReport {
    pub fn attempted(&self) -> usize {
        self.deleted + self.already_gone + self.failed
    }
}

/// Delete each resource with background propagation, one at a time.
///
/// A failed delete never stops the pass; the resource keeps matching the
/// stale selector and is retried by the next collection.
pub async fn delete_resources(cluster: &dyn ClusterClient, resources: &[ManagedResource]) -> DeletionReport {
    let mut report = DeletionReport::default();

    for resource in resources {
        let name = resource.name();
        let namespace = resource.namespace().unwrap_or_default();
        match cluster.delete(&namespace, &resource.api_resource, &name).await {
            Ok(()) => {
                debug!(kind = resource.kind(), name = %name, "Child resource deleted");
                metrics::GC_DELETED_RESOURCES.with_label_values(&["deleted"]).inc();
                report.deleted += 1;
            }
            Err(e) if e.is_not_found() => {
                debug!(kind = resource.kind(), name = %name, "Child resource already deleted");
                metrics::GC_DELETED_RESOURCES.with_label_values(&["already_gone"]).inc();
                report.already_gone += 1;
            }
            Err(e) => {
                error!(kind = resource.kind(), name = %name, error = %e, "Cannot delete child resource");
                metrics::GC_DELETED_RESOURCES.with_label_values(&["failed"]).inc();
                report.failed += 1;
            }
        }
    }

    report
}
