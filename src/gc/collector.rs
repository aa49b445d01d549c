//! Collection of resources left behind by older integration generations

use tracing::debug;

use super::discovery::discover_kinds;
use super::labeler::{GENERATION_LABEL, INTEGRATION_LABEL};
use crate::cluster::{ClusterClient, ManagedResource};
use crate::error::Result;
use crate::selector::Selector;

/// Verbs a kind must support to be worth collecting: it has to be creatable
/// to have been produced by the operator, and listable to be found again.
pub const COLLECTABLE_VERBS: &[&str] = &["create", "list"];

/// Build the selector matching `integration` resources older than `generation_bound`
pub fn stale_resource_selector(integration: &str, generation_bound: i64) -> Result<Selector> {
    let clauses = [
        format!("{INTEGRATION_LABEL}={integration}"),
        format!("{GENERATION_LABEL}<{generation_bound}"),
    ];
    Selector::parse(&clauses.join(","))
}

/// List every resource in `namespace` labeled for `integration` with a
/// generation strictly lower than `generation_bound`, across all collectable kinds.
pub async fn collect_stale_resources(
    cluster: &dyn ClusterClient,
    namespace: &str,
    integration: &str,
    generation_bound: i64,
) -> Result<Vec<ManagedResource>> {
    let selector = stale_resource_selector(integration, generation_bound)?;
    let kinds = discover_kinds(cluster, COLLECTABLE_VERBS).await?;

    let mut stale = Vec::new();
    for kind in kinds {
        let items = match cluster.list(namespace, &kind, &selector).await {
            Ok(items) => items,
            // Aggregated and virtual APIs often reject generic list queries
            Err(e) if e.is_not_found() || e.is_forbidden() => {
                debug!(kind = %kind.kind, api_version = %kind.api_version, error = %e, "Skipping kind that cannot be listed");
                continue;
            }
            Err(e) => return Err(e),
        };
        stale.extend(
            items
                .into_iter()
                .map(|object| ManagedResource::new(kind.clone(), object)),
        );
    }

    Ok(stale)
}
