//! State of one resource-production pass over an integration

use std::sync::Arc;

use futures::future::BoxFuture;
use kube::ResourceExt;

use crate::cluster::ManagedResource;
use crate::crd::{Integration, IntegrationPhase};

/// Mutation applied to every rendered resource before it is written
pub type PostProcessor = Box<dyn Fn(&Integration, &mut ManagedResource) + Send + Sync>;

/// Work to run once the rendered resources have been written
pub type PostAction = BoxFuture<'static, ()>;

/// Everything a reconcile pass knows about the integration it is working on
pub struct Environment {
    pub integration: Arc<Integration>,
    pub phase: IntegrationPhase,
    pub resources: Vec<ManagedResource>,
    post_processors: Vec<PostProcessor>,
    post_actions: Vec<PostAction>,
}

impl Environment {
    pub fn new(integration: Arc<Integration>, phase: IntegrationPhase) -> Self {
        Self {
            integration,
            phase,
            resources: Vec::new(),
            post_processors: Vec::new(),
            post_actions: Vec::new(),
        }
    }

    pub fn in_phase(&self, phase: IntegrationPhase) -> bool {
        self.phase == phase
    }

    pub fn name(&self) -> String {
        self.integration.name_any()
    }

    pub fn namespace(&self) -> String {
        self.integration.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Generation of the integration spec this pass renders
    pub fn generation(&self) -> i64 {
        self.integration.metadata.generation.unwrap_or(0)
    }

    pub fn add_post_processor(&mut self, processor: PostProcessor) {
        self.post_processors.push(processor);
    }

    pub fn add_post_action(&mut self, action: PostAction) {
        self.post_actions.push(action);
    }

    /// Run every post-processor over every rendered resource
    pub fn post_process(&mut self) {
        let integration = self.integration.as_ref();
        for processor in &self.post_processors {
            for resource in &mut self.resources {
                processor(integration, resource);
            }
        }
    }

    /// Run the registered post-actions in registration order
    pub async fn run_post_actions(&mut self) {
        for action in self.post_actions.drain(..) {
            action.await;
        }
    }
}
