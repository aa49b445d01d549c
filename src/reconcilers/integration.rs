//! Integration reconciler
//!
//! Handles the business logic of the integration lifecycle:
//! - Phase selection
//! - Spec validation
//! - Rendering of the child Deployment and ConfigMap
//! - Running the pipeline steps and writing the rendered resources
//! - Status updates

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{
    api::{Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde_json::json;
use tracing::{debug, info};

use crate::cluster::{ClusterClient, ManagedResource};
use crate::crd::{Integration, IntegrationPhase};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::gc::GarbageCollector;
use crate::metrics;

/// Label selecting the pods of an integration; stable across generations
const POD_SELECTOR_LABEL: &str = "camel.apache.org/integration-pod";

/// Mount point of the properties ConfigMap
const PROPERTIES_MOUNT_PATH: &str = "/etc/camel/conf.d";

/// Field manager used for status patches
const STATUS_MANAGER: &str = "integration-operator";

/// Phase the integration has to be reconciled in.
///
/// A spec change (or a fresh object) always restarts the lifecycle.
pub fn target_phase(integration: &Integration) -> IntegrationPhase {
    let generation = integration.metadata.generation;
    match &integration.status {
        Some(status) if status.observed_generation == generation => {
            status.phase.unwrap_or(IntegrationPhase::Initialization)
        }
        _ => IntegrationPhase::Initialization,
    }
}

/// Validate the Integration spec
pub fn validate(integration: &Integration) -> Result<()> {
    let spec = &integration.spec;

    if spec.image.trim().is_empty() {
        return Err(Error::validation("An image must be specified"));
    }

    if spec.replicas < 0 {
        return Err(Error::validation(format!(
            "Invalid replicas {}: must not be negative",
            spec.replicas
        )));
    }

    for key in spec.configuration.keys() {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::validation(format!(
                "Invalid configuration key '{}': must consist of alphanumerics, '-', '_' or '.'",
                key
            )));
        }
    }

    for name in spec.env.keys() {
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::validation(format!(
                "Invalid environment variable name '{}'",
                name
            )));
        }
    }

    Ok(())
}

/// Name of the ConfigMap holding the integration properties
pub fn properties_config_map_name(integration: &Integration) -> String {
    format!("{}-properties", integration.name_any())
}

/// Render the child resources of the integration's current spec
pub fn render(integration: &Integration) -> Result<Vec<ManagedResource>> {
    let name = integration.name_any();
    let namespace = integration
        .namespace()
        .ok_or_else(|| Error::validation(format!("Integration {} has no namespace", name)))?;
    let owner = integration.controller_owner_ref(&());
    let metadata = |object_name: String| ObjectMeta {
        name: Some(object_name),
        namespace: Some(namespace.clone()),
        owner_references: owner.clone().map(|o| vec![o]),
        ..Default::default()
    };

    let spec = &integration.spec;
    let mut resources = Vec::new();

    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    if !spec.configuration.is_empty() {
        let config_map_name = properties_config_map_name(integration);
        let config_map = ConfigMap {
            metadata: metadata(config_map_name.clone()),
            data: Some(spec.configuration.clone()),
            ..Default::default()
        };
        resources.push(ManagedResource::from_typed(&config_map)?);

        let volume: Volume = serde_json::from_value(json!({
            "name": "properties",
            "configMap": { "name": config_map_name },
        }))?;
        volumes.push(volume);
        volume_mounts.push(VolumeMount {
            name: "properties".to_string(),
            mount_path: PROPERTIES_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    let pod_labels = BTreeMap::from([(POD_SELECTOR_LABEL.to_string(), name.clone())]);
    let env: Vec<EnvVar> = spec
        .env
        .iter()
        .map(|(key, value)| EnvVar {
            name: key.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    let deployment = Deployment {
        metadata: metadata(name.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "integration".to_string(),
                        image: Some(spec.image.clone()),
                        env: (!env.is_empty()).then_some(env),
                        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
                        ..Default::default()
                    }],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    resources.push(ManagedResource::from_typed(&deployment)?);

    Ok(resources)
}

/// Render, label and write the integration's resources, then run the
/// registered post-actions. Returns the number of resources written.
pub async fn deploy(
    integration: Arc<Integration>,
    cluster: &dyn ClusterClient,
    gc: &GarbageCollector,
) -> Result<usize> {
    let mut env = Environment::new(integration, IntegrationPhase::Deploying);
    env.resources = render(&env.integration)?;

    if gc.configure(&env) {
        gc.apply(&mut env);
    }
    env.post_process();

    for resource in &env.resources {
        debug!(kind = resource.kind(), name = %resource.name(), "Applying child resource");
        cluster.apply(resource).await?;
        metrics::APPLIED_RESOURCES
            .with_label_values(&[resource.kind()])
            .inc();
    }

    env.run_post_actions().await;

    info!(
        name = %env.name(),
        generation = env.generation(),
        resources = env.resources.len(),
        "Integration resources applied"
    );
    Ok(env.resources.len())
}

/// Move the integration to `phase` for its current generation
pub async fn update_status_phase(
    integration: &Integration,
    client: &Client,
    namespace: &str,
    phase: IntegrationPhase,
    message: &str,
) -> Result<()> {
    let ready = phase == IntegrationPhase::Running;
    patch_status(
        integration,
        client,
        namespace,
        json!({
            "status": {
                "phase": phase,
                "message": message,
                "observedGeneration": integration.metadata.generation,
                "conditions": [{
                    "type": "Ready",
                    "status": if ready { "True" } else { "False" },
                    "lastTransitionTime": Utc::now(),
                    "reason": phase.as_str(),
                    "message": message
                }]
            }
        }),
    )
    .await
}

/// Move the integration to the Error phase
pub async fn update_status_failed(
    integration: &Integration,
    client: &Client,
    namespace: &str,
    error_message: &str,
) -> Result<()> {
    patch_status(
        integration,
        client,
        namespace,
        json!({
            "status": {
                "phase": IntegrationPhase::Error,
                "message": error_message,
                "observedGeneration": integration.metadata.generation,
                "conditions": [{
                    "type": "Ready",
                    "status": "False",
                    "lastTransitionTime": Utc::now(),
                    "reason": "ValidationFailed",
                    "message": error_message
                }]
            }
        }),
    )
    .await
}

async fn patch_status(
    integration: &Integration,
    client: &Client,
    namespace: &str,
    status: serde_json::Value,
) -> Result<()> {
    let api: Api<Integration> = Api::namespaced(client.clone(), namespace);
    api.patch_status(
        &integration.name_any(),
        &PatchParams::apply(STATUS_MANAGER),
        &Patch::Merge(status),
    )
    .await?;
    Ok(())
}
