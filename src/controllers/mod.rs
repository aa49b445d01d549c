//! Kubernetes controllers for the Integration CRD
//!
//! This module contains the controller that watches integrations and
//! triggers reconciliation.

mod integration_controller;

pub use integration_controller::run as run_integration_controller;

use std::sync::Arc;

use kube::Client;

use crate::cluster::ClusterClient;
use crate::gc::GarbageCollector;
use crate::tasks::TaskRunner;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client, used for status updates
    pub client: Client,
    /// Cluster access for rendered resources
    pub cluster: Arc<dyn ClusterClient>,
    /// Garbage collection step of the deploy pipeline
    pub garbage_collector: GarbageCollector,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, cluster: Arc<dyn ClusterClient>, tasks: Arc<dyn TaskRunner>) -> Self {
        let garbage_collector = GarbageCollector::new(cluster.clone(), tasks);
        Self {
            client,
            cluster,
            garbage_collector,
        }
    }
}
