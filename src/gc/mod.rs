//! Generation-based garbage collection of integration child resources
//!
//! Every resource the operator writes for an integration is labeled with the
//! integration name and the generation it was rendered for. While an
//! integration is deploying, a background task lists every collectable kind
//! in the namespace for resources of that integration with an older
//! generation and deletes them.
//!
//! Nothing is remembered between runs: a resource whose deletion fails still
//! matches the selector on the next deploy and is retried then.

mod collector;
mod deleter;
mod discovery;
mod labeler;

pub use collector::{collect_stale_resources, stale_resource_selector, COLLECTABLE_VERBS};
pub use deleter::{delete_resources, DeletionReport};
pub use discovery::discover_kinds;
pub use labeler::{label_resource, GENERATION_LABEL, INTEGRATION_LABEL};

use std::sync::Arc;

use tracing::{error, info, Instrument};

use crate::cluster::{ClusterClient, ManagedResource};
use crate::crd::{Integration, IntegrationPhase};
use crate::environment::Environment;
use crate::error::Result;
use crate::metrics;
use crate::tasks::TaskRunner;

/// Integration whose older resources a collection run removes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionTarget {
    pub namespace: String,
    pub integration: String,
    /// Resources labeled with a generation below this bound are stale
    pub generation_bound: i64,
}

/// Collect and delete the stale resources of `target`
pub async fn collect_garbage(cluster: &dyn ClusterClient, target: &CollectionTarget) -> Result<DeletionReport> {
    let stale = collect_stale_resources(
        cluster,
        &target.namespace,
        &target.integration,
        target.generation_bound,
    )
    .await?;
    Ok(delete_resources(cluster, &stale).await)
}

/// Run [`collect_garbage`] and report its outcome through logs and metrics only
pub async fn run_collection(cluster: Arc<dyn ClusterClient>, target: CollectionTarget) {
    let _timer = metrics::GC_DURATION.start_timer();

    match collect_garbage(cluster.as_ref(), &target).await {
        Ok(report) => {
            let outcome = if report.failed == 0 { "success" } else { "partial" };
            metrics::GC_RUNS.with_label_values(&[outcome]).inc();
            info!(
                deleted = report.deleted,
                already_gone = report.already_gone,
                failed = report.failed,
                "Garbage collection finished"
            );
        }
        Err(e) => {
            metrics::GC_RUNS.with_label_values(&["aborted"]).inc();
            error!(error = %e, "Cannot collect older generation resources");
        }
    }
}

/// Reconcile step that labels rendered resources and, while deploying,
/// schedules the removal of resources from older generations.
#[derive(Clone)]
pub struct GarbageCollector {
    cluster: Arc<dyn ClusterClient>,
    tasks: Arc<dyn TaskRunner>,
}

impl GarbageCollector {
    pub fn new(cluster: Arc<dyn ClusterClient>, tasks: Arc<dyn TaskRunner>) -> Self {
        Self { cluster, tasks }
    }

    /// Whether the step takes part in this pass.
    ///
    /// The step is active in `Initialization` so that anything rendered in
    /// that phase is labeled, but the integration controller renders and
    /// writes nothing until `Deploying`. Collection is only ever scheduled
    /// from a `Deploying` pass.
    pub fn configure(&self, env: &Environment) -> bool {
        if !env.integration.spec.gc_enabled() {
            return false;
        }
        env.in_phase(IntegrationPhase::Initialization) || env.in_phase(IntegrationPhase::Deploying)
    }

    /// Register the labeling post-processor, and the collection post-action when deploying
    pub fn apply(&self, env: &mut Environment) {
        env.add_post_processor(Box::new(
            |integration: &Integration, resource: &mut ManagedResource| {
                label_resource(
                    &mut resource.object.metadata,
                    integration.metadata.name.as_deref().unwrap_or_default(),
                    integration.metadata.generation.unwrap_or(0),
                );
            },
        ));

        if !env.in_phase(IntegrationPhase::Deploying) {
            return;
        }

        // The bound is captured now; later generations are never touched by this run
        let target = CollectionTarget {
            namespace: env.namespace(),
            integration: env.name(),
            generation_bound: env.generation(),
        };
        let span = tracing::info_span!(
            "garbage_collection",
            namespace = %target.namespace,
            integration = %target.integration,
            generation = target.generation_bound,
        );
        let cluster = self.cluster.clone();
        let tasks = self.tasks.clone();
        env.add_post_action(Box::pin(async move {
            let collection = run_collection(cluster, target).instrument(span);
            tasks.run("garbage-collection", Box::pin(collection)).await;
        }));
    }
}
