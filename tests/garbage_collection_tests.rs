//! Integration tests for generation-based garbage collection
//!
//! These tests run discovery, collection and deletion against the in-memory
//! cluster and verify that only resources of older generations of the same
//! integration are ever removed.

use std::io;
use std::sync::{Arc, Mutex};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use tokio::sync::oneshot;
use tracing::subscriber::DefaultGuard;
use tracing::Level;

use integration_operator::cluster::{ClusterClient, InMemoryCluster, ManagedResource};
use integration_operator::gc::{
    collect_garbage, collect_stale_resources, delete_resources, discover_kinds, label_resource,
    stale_resource_selector, CollectionTarget, COLLECTABLE_VERBS, GENERATION_LABEL,
    INTEGRATION_LABEL,
};
use integration_operator::tasks::{DetachedTasks, TaskRunner};
use integration_operator::Error;

const NAMESPACE: &str = "shop";
const ALL_VERBS: &[&str] = &["create", "delete", "get", "list", "patch", "update", "watch"];

// ============================================================================
// Test Helpers
// ============================================================================

fn config_maps() -> ApiResource {
    ApiResource::erase::<ConfigMap>(&())
}

fn deployments() -> ApiResource {
    ApiResource::erase::<Deployment>(&())
}

fn pod_metrics() -> ApiResource {
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
    ApiResource::from_gvk_with_plural(&gvk, "pods")
}

/// A cluster serving ConfigMaps and Deployments
fn cluster() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster.register_kind(&config_maps(), true, ALL_VERBS);
    cluster.register_kind(&deployments(), true, ALL_VERBS);
    cluster
}

fn resource(api_resource: &ApiResource, name: &str, labels: &[(&str, &str)]) -> ManagedResource {
    let mut object = DynamicObject::new(name, api_resource).within(NAMESPACE);
    object.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    ManagedResource::new(api_resource.clone(), object)
}

fn owned(api_resource: &ApiResource, name: &str, integration: &str, generation: i64) -> ManagedResource {
    let mut managed = resource(api_resource, name, &[]);
    label_resource(&mut managed.object.metadata, integration, generation);
    managed
}

/// Generation 3 of order-service plus leftovers of generation 2
fn seed_order_service(cluster: &InMemoryCluster) {
    cluster.insert(owned(&config_maps(), "order-service-v3", "order-service", 3));
    cluster.insert(owned(&deployments(), "order-service", "order-service", 3));
    cluster.insert(owned(&config_maps(), "order-service-v2", "order-service", 2));
    cluster.insert(owned(&deployments(), "order-service-legacy", "order-service", 2));
}

fn names(resources: &[ManagedResource]) -> Vec<String> {
    let mut names: Vec<String> = resources
        .iter()
        .map(|r| format!("{}/{}", r.kind(), r.name()))
        .collect();
    names.sort();
    names
}

fn target(integration: &str, generation_bound: i64) -> CollectionTarget {
    CollectionTarget {
        namespace: NAMESPACE.to_string(),
        integration: integration.to_string(),
        generation_bound,
    }
}

/// Log lines written by the tracing subscriber installed with [`capture_logs`]
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture every event at debug level or above on the current thread
fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

// ============================================================================
// Labeling Tests
// ============================================================================

#[test]
fn labeling_preserves_existing_labels() {
    let mut managed = resource(&config_maps(), "cm", &[("app", "shop"), ("tier", "backend")]);

    label_resource(&mut managed.object.metadata, "order-service", 7);

    let labels = managed.labels();
    assert_eq!(labels.get("app").map(String::as_str), Some("shop"));
    assert_eq!(labels.get("tier").map(String::as_str), Some("backend"));
    assert_eq!(labels.get(INTEGRATION_LABEL).map(String::as_str), Some("order-service"));
    assert_eq!(labels.get(GENERATION_LABEL).map(String::as_str), Some("7"));
}

#[test]
fn labeling_creates_missing_label_map() {
    let mut object = DynamicObject::new("cm", &config_maps()).within(NAMESPACE);
    assert!(object.metadata.labels.is_none());

    label_resource(&mut object.metadata, "order-service", 1);

    let labels = object.metadata.labels.unwrap();
    assert_eq!(labels.len(), 2);
}

#[test]
fn relabeling_only_overwrites_ownership_labels() {
    let mut managed = owned(&config_maps(), "cm", "order-service", 2);
    managed
        .object
        .metadata
        .labels
        .as_mut()
        .unwrap()
        .insert("app".to_string(), "shop".to_string());

    label_resource(&mut managed.object.metadata, "order-service", 3);
    label_resource(&mut managed.object.metadata, "order-service", 3);

    let labels = managed.labels();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(GENERATION_LABEL).map(String::as_str), Some("3"));
    assert_eq!(labels.get("app").map(String::as_str), Some("shop"));
}

// ============================================================================
// Discovery Tests
// ============================================================================

#[tokio::test]
async fn discovery_requires_all_verbs() {
    let cluster = cluster();
    cluster.register_kind(&pod_metrics(), true, &["get", "list"]);

    let kinds = discover_kinds(&cluster, COLLECTABLE_VERBS).await.unwrap();

    let kinds: Vec<&str> = kinds.iter().map(|k| k.kind.as_str()).collect();
    assert!(kinds.contains(&"ConfigMap"));
    assert!(kinds.contains(&"Deployment"));
    assert!(!kinds.contains(&"PodMetrics"));
}

#[tokio::test]
async fn discovery_resolves_group_version_and_plural() {
    let cluster = cluster();

    let kinds = discover_kinds(&cluster, COLLECTABLE_VERBS).await.unwrap();

    let deployment = kinds.iter().find(|k| k.kind == "Deployment").unwrap();
    assert_eq!(deployment.group, "apps");
    assert_eq!(deployment.version, "v1");
    assert_eq!(deployment.api_version, "apps/v1");
    assert_eq!(deployment.plural, "deployments");

    let config_map = kinds.iter().find(|k| k.kind == "ConfigMap").unwrap();
    assert_eq!(config_map.group, "");
    assert_eq!(config_map.api_version, "v1");
}

#[tokio::test]
async fn discovery_skips_subresources_and_cluster_scoped_kinds() {
    let cluster = cluster();
    let eviction = ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("", "v1", "Eviction"), "pods/eviction");
    let namespaces = ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("", "v1", "Namespace"), "namespaces");
    cluster.register_kind(&eviction, true, ALL_VERBS);
    cluster.register_kind(&namespaces, false, ALL_VERBS);

    let kinds = discover_kinds(&cluster, COLLECTABLE_VERBS).await.unwrap();

    let kinds: Vec<&str> = kinds.iter().map(|k| k.kind.as_str()).collect();
    assert_eq!(kinds.len(), 2, "unexpected kinds: {kinds:?}");
    assert!(!kinds.contains(&"Eviction"));
    assert!(!kinds.contains(&"Namespace"));
}

#[tokio::test]
async fn discovery_swallows_partial_group_failures() {
    let cluster = cluster();
    cluster.fail_group_discovery("apps/v1");

    let kinds = discover_kinds(&cluster, COLLECTABLE_VERBS).await.unwrap();

    assert_eq!(kinds.len(), 1);
    assert_eq!(kinds[0].kind, "ConfigMap");
}

#[tokio::test]
async fn total_discovery_failure_aborts_collection() {
    let cluster = cluster();
    seed_order_service(&cluster);
    cluster.fail_discovery();

    let result = collect_garbage(&cluster, &target("order-service", 3)).await;

    assert!(matches!(result, Err(Error::Discovery(_))));
    assert!(cluster.list_calls().is_empty());
    assert!(cluster.delete_calls().is_empty());
    assert_eq!(cluster.objects().len(), 4);
}

// ============================================================================
// Collection Tests
// ============================================================================

#[test]
fn stale_selector_matches_older_generations_of_the_integration() {
    let selector = stale_resource_selector("order-service", 3).unwrap();

    assert_eq!(
        selector.to_string(),
        "camel.apache.org/integration=order-service,camel.apache.org/generation<3"
    );
}

#[tokio::test]
async fn order_service_scenario_collects_and_deletes_previous_generation() {
    let cluster = cluster();
    seed_order_service(&cluster);

    let stale = collect_stale_resources(&cluster, NAMESPACE, "order-service", 3)
        .await
        .unwrap();

    assert_eq!(
        names(&stale),
        vec!["ConfigMap/order-service-v2", "Deployment/order-service-legacy"]
    );
    for resource in &stale {
        assert_eq!(resource.labels().get(GENERATION_LABEL).map(String::as_str), Some("2"));
        // Type metadata is restored from the discovered kind
        let types = resource.object.types.as_ref().unwrap();
        assert_eq!(types.kind, resource.kind());
    }

    let report = delete_resources(&cluster, &stale).await;
    assert_eq!(report.deleted, 2);
    assert_eq!(report.failed, 0);

    assert!(!cluster.contains("ConfigMap", NAMESPACE, "order-service-v2"));
    assert!(!cluster.contains("Deployment", NAMESPACE, "order-service-legacy"));
    assert!(cluster.contains("ConfigMap", NAMESPACE, "order-service-v3"));
    assert!(cluster.contains("Deployment", NAMESPACE, "order-service"));

    let again = collect_stale_resources(&cluster, NAMESPACE, "order-service", 3)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn current_newer_and_foreign_resources_are_never_deleted() {
    let cluster = cluster();
    seed_order_service(&cluster);
    cluster.insert(owned(&config_maps(), "order-service-v5", "order-service", 5));
    cluster.insert(owned(&config_maps(), "billing-v1", "billing", 1));
    cluster.insert(resource(&config_maps(), "unowned", &[(GENERATION_LABEL, "1")]));
    cluster.insert(resource(&config_maps(), "plain", &[("app", "order-service")]));
    let mut elsewhere = owned(&config_maps(), "order-service-v1", "order-service", 1);
    elsewhere.object.metadata.namespace = Some("other".to_string());
    cluster.insert(elsewhere);

    let report = collect_garbage(&cluster, &target("order-service", 3)).await.unwrap();

    assert_eq!(report.deleted, 2);
    let remaining = names(&cluster.objects());
    assert_eq!(
        remaining,
        vec![
            "ConfigMap/billing-v1",
            "ConfigMap/order-service-v1",
            "ConfigMap/order-service-v3",
            "ConfigMap/order-service-v5",
            "ConfigMap/plain",
            "ConfigMap/unowned",
            "Deployment/order-service",
        ]
    );
}

#[tokio::test]
async fn generation_bound_compares_numerically() {
    let cluster = cluster();
    cluster.insert(owned(&config_maps(), "gen-9", "order-service", 9));
    cluster.insert(owned(&config_maps(), "gen-10", "order-service", 10));
    cluster.insert(owned(&config_maps(), "gen-11", "order-service", 11));

    let stale = collect_stale_resources(&cluster, NAMESPACE, "order-service", 10)
        .await
        .unwrap();

    assert_eq!(names(&stale), vec!["ConfigMap/gen-9"]);
}

#[tokio::test]
async fn kinds_without_create_are_not_collected() {
    let cluster = cluster();
    cluster.register_kind(&pod_metrics(), true, &["get", "list", "watch"]);
    cluster.insert(owned(&pod_metrics(), "order-service-pod", "order-service", 1));

    let stale = collect_stale_resources(&cluster, NAMESPACE, "order-service", 3)
        .await
        .unwrap();

    assert!(stale.is_empty());
    assert!(!cluster.list_calls().contains(&"PodMetrics".to_string()));
    assert!(cluster.contains("PodMetrics", NAMESPACE, "order-service-pod"));
}

#[tokio::test]
async fn malformed_selector_aborts_before_any_query() {
    let cluster = cluster();
    seed_order_service(&cluster);

    let result = collect_garbage(&cluster, &target("order service", 3)).await;

    assert!(matches!(result, Err(Error::InvalidSelector { .. })));
    assert!(cluster.list_calls().is_empty());
    assert!(cluster.delete_calls().is_empty());
}

#[tokio::test]
async fn forbidden_and_not_found_kinds_are_skipped() {
    for code in [403, 404] {
        let cluster = cluster();
        seed_order_service(&cluster);
        cluster.fail_list("ConfigMap", code);

        let stale = collect_stale_resources(&cluster, NAMESPACE, "order-service", 3)
            .await
            .unwrap();

        assert_eq!(names(&stale), vec!["Deployment/order-service-legacy"], "status {code}");
        assert_eq!(cluster.list_calls().len(), 2);
    }
}

#[tokio::test]
async fn other_list_errors_abort_the_run() {
    let cluster = cluster();
    seed_order_service(&cluster);
    cluster.fail_list("ConfigMap", 500);

    let result = collect_garbage(&cluster, &target("order-service", 3)).await;

    let err = result.unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert!(cluster.delete_calls().is_empty());
    assert_eq!(cluster.objects().len(), 4);
}

// ============================================================================
// Deletion Tests
// ============================================================================

#[tokio::test]
async fn already_deleted_resources_count_as_success() {
    let cluster = cluster();
    let gone = owned(&config_maps(), "order-service-v1", "order-service", 1);

    let report = delete_resources(&cluster, &[gone]).await;

    assert_eq!(report.already_gone, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.attempted(), 1);
}

#[tokio::test]
async fn already_deleted_resources_are_not_logged_as_errors() {
    let cluster = cluster();
    let gone = owned(&config_maps(), "order-service-v1", "order-service", 1);
    let (logs, _guard) = capture_logs();

    delete_resources(&cluster, &[gone]).await;

    let output = logs.contents();
    assert!(output.contains("already deleted"), "missing debug event: {output}");
    assert!(!output.contains("ERROR"), "unexpected error event: {output}");
}

#[tokio::test]
async fn failed_deletes_are_logged_as_errors() {
    let cluster = cluster();
    seed_order_service(&cluster);
    cluster.fail_delete("order-service-v2", 500);
    let stale = owned(&config_maps(), "order-service-v2", "order-service", 2);
    let (logs, _guard) = capture_logs();

    delete_resources(&cluster, &[stale]).await;

    let output = logs.contents();
    assert!(output.contains("ERROR"), "missing error event: {output}");
    assert!(output.contains("order-service-v2"));
}

#[tokio::test]
async fn failed_deletes_do_not_stop_the_batch() {
    let cluster = cluster();
    seed_order_service(&cluster);
    cluster.fail_delete("order-service-v2", 500);

    let report = collect_garbage(&cluster, &target("order-service", 3)).await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(cluster.delete_calls().len(), 2);
    assert!(cluster.contains("ConfigMap", NAMESPACE, "order-service-v2"));
    assert!(!cluster.contains("Deployment", NAMESPACE, "order-service-legacy"));
}

#[tokio::test]
async fn failed_deletes_are_retried_by_the_next_run() {
    let cluster = cluster();
    seed_order_service(&cluster);
    cluster.fail_delete("order-service-v2", 500);
    collect_garbage(&cluster, &target("order-service", 3)).await.unwrap();

    let stale = collect_stale_resources(&cluster, NAMESPACE, "order-service", 3)
        .await
        .unwrap();

    assert_eq!(names(&stale), vec!["ConfigMap/order-service-v2"]);
}

// ============================================================================
// Background Execution Tests
// ============================================================================

#[tokio::test]
async fn detached_tasks_return_before_the_task_completes() {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    DetachedTasks
        .run(
            "test",
            Box::pin(async move {
                let _ = release_rx.await;
                let _ = done_tx.send(());
            }),
        )
        .await;

    // The task is still parked on the release channel
    release_tx.send(()).unwrap();
    done_rx.await.unwrap();
}

#[tokio::test]
async fn detached_collection_runs_to_completion() {
    let cluster = cluster();
    seed_order_service(&cluster);
    let shared: Arc<dyn ClusterClient> = Arc::new(cluster.clone());
    let (done_tx, done_rx) = oneshot::channel::<()>();

    DetachedTasks
        .run(
            "garbage-collection",
            Box::pin(async move {
                integration_operator::gc::run_collection(shared, target("order-service", 3)).await;
                let _ = done_tx.send(());
            }),
        )
        .await;

    done_rx.await.unwrap();
    assert_eq!(cluster.objects().len(), 2);
}
