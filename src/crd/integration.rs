//! Integration Custom Resource Definition

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Integration resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "camel.apache.org",
    version = "v1alpha1",
    kind = "Integration",
    plural = "integrations",
    singular = "integration",
    shortname = "it",
    namespaced,
    status = "IntegrationStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Generation", "type": "integer", "jsonPath": ".metadata.generation"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    /// Container image running the integration
    pub image: String,

    /// Number of integration pods
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Properties mounted into the integration through a ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, String>,

    /// Environment variables of the integration container
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Per-integration tuning of operator behavior
    #[serde(default)]
    pub traits: TraitsSpec,
}

fn default_replicas() -> i32 {
    1
}

impl IntegrationSpec {
    /// Garbage collection runs unless explicitly disabled
    pub fn gc_enabled(&self) -> bool {
        self.traits
            .gc
            .as_ref()
            .and_then(|gc| gc.enabled)
            .unwrap_or(true)
    }
}

/// Operator traits configurable per integration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraitsSpec {
    /// Garbage collection of resources from older generations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc: Option<GcTraitSpec>,
}

/// Garbage collection trait configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GcTraitSpec {
    /// Set to false to keep resources from older generations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Lifecycle phase of an integration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum IntegrationPhase {
    Initialization,
    Deploying,
    Running,
    Error,
}

impl IntegrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationPhase::Initialization => "Initialization",
            IntegrationPhase::Deploying => "Deploying",
            IntegrationPhase::Running => "Running",
            IntegrationPhase::Error => "Error",
        }
    }
}

/// Integration status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    /// Current phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<IntegrationPhase>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation the phase refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
