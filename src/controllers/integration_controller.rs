//! Integration controller
//!
//! Watches Integration resources and drives them through their phases.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::{Integration, IntegrationPhase};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::integration as integration_reconciler;

/// Run the Integration controller
pub async fn run(client: Client, context: Arc<Context>, namespace: Option<String>) {
    let api: Api<Integration> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Integration CRD not installed: {}", e);
        return;
    }

    info!(namespace = namespace.as_deref().unwrap_or("*"), "Starting Integration controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Integration"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&["Integration"]).inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Integration>, ctx: Arc<Context>) -> Result<Action> {
    let phase = integration_reconciler::target_phase(&obj);
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[phase.as_str()])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[phase.as_str()]).inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let generation = obj.metadata.generation.unwrap_or(0);

    info!(phase = phase.as_str(), generation = generation, "Reconciling Integration");

    match phase {
        IntegrationPhase::Initialization => initialize(obj, &ctx, &namespace).await,
        IntegrationPhase::Deploying => deploy(obj, &ctx, &namespace).await,
        IntegrationPhase::Running | IntegrationPhase::Error => Ok(Action::await_change()),
    }
}

/// Validate a new generation and hand it over to the deploying phase.
///
/// No resources are rendered or written here, so no pipeline step runs.
async fn initialize(integration: Arc<Integration>, ctx: &Context, namespace: &str) -> Result<Action> {
    if let Err(e) = integration_reconciler::validate(&integration) {
        warn!(error = %e, "Validation failed");
        integration_reconciler::update_status_failed(&integration, &ctx.client, namespace, &e.to_string())
            .await?;
        return Ok(Action::await_change());
    }

    integration_reconciler::update_status_phase(
        &integration,
        &ctx.client,
        namespace,
        IntegrationPhase::Deploying,
        "Integration initialized",
    )
    .await?;
    // The status change triggers the deploying pass
    Ok(Action::await_change())
}

/// Write the rendered resources and schedule cleanup of older generations
async fn deploy(integration: Arc<Integration>, ctx: &Context, namespace: &str) -> Result<Action> {
    let applied =
        integration_reconciler::deploy(integration.clone(), ctx.cluster.as_ref(), &ctx.garbage_collector)
            .await?;

    integration_reconciler::update_status_phase(
        &integration,
        &ctx.client,
        namespace,
        IntegrationPhase::Running,
        &format!("{} resources deployed", applied),
    )
    .await?;
    Ok(Action::await_change())
}

/// Error policy for the controller
fn error_policy(obj: Arc<Integration>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Validation(_) | Error::Config(_) => Duration::from_secs(300),
        _ => Duration::from_secs(60),
    };

    Action::requeue(requeue_duration)
}
