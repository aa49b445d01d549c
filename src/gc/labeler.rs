//! Ownership labels stamped on every rendered resource

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Label holding the name of the owning integration
pub const INTEGRATION_LABEL: &str = "camel.apache.org/integration";

/// Label holding the integration generation that produced the resource
pub const GENERATION_LABEL: &str = "camel.apache.org/generation";

/// Stamp `meta` with the integration name and generation.
///
/// Other labels are left untouched and re-labeling only overwrites the two
/// ownership keys.
pub fn label_resource(meta: &mut ObjectMeta, integration: &str, generation: i64) {
    let labels = meta.labels.get_or_insert_with(Default::default);
    labels.insert(GENERATION_LABEL.to_string(), generation.to_string());
    labels.insert(INTEGRATION_LABEL.to_string(), integration.to_string());
}
