//! Integration Kubernetes Operator
//!
//! Main entry point for the operator. Loads the configuration, sets up the
//! Kubernetes client, and runs the Integration controller.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use integration_operator::{
    cluster::KubeCluster,
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
    tasks::DetachedTasks,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::from_env()?;
    init_tracing(&config);

    info!(?config, "Starting Integration Operator");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let cluster = Arc::new(KubeCluster::new(client.clone(), config.field_manager.clone()));
    let context = Arc::new(Context::new(client.clone(), cluster, Arc::new(DetachedTasks)));

    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    let integration_controller =
        controllers::run_integration_controller(client, context, config.watch_namespace.clone());

    tokio::select! {
        _ = integration_controller => {
            error!("Integration controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("Integration Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(config: &OperatorConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
