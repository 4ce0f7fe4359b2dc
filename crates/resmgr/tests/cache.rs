use std::collections::HashMap;

use api_types::ContainerConfig;
use api_types::ContainerMetadata;
use api_types::CreateContainerRequest;
use api_types::CreateContainerResponse;
use api_types::PodSandboxConfig;
use api_types::PodSandboxMetadata;
use api_types::RunPodSandboxRequest;
use resmgr::cache::Cache;
use resmgr::cache::Metadata;
use resmgr::cache::QosClass;
use resmgr::cache::Quantity;
use resmgr::cache::KEY_RESOURCE_ANNOTATION;
use similar_asserts::assert_eq;
use test_log::test;

fn run_request(resources: Option<&str>) -> RunPodSandboxRequest {
    let mut annotations = HashMap::new();
    if let Some(resources) = resources {
        annotations.insert(KEY_RESOURCE_ANNOTATION.to_string(), resources.to_string());
    }
    RunPodSandboxRequest {
        config: Some(PodSandboxConfig {
            metadata: Some(PodSandboxMetadata {
                name: "web".to_string(),
                namespace: "default".to_string(),
                uid: "3f2a".to_string(),
                attempt: 0,
            }),
            labels: HashMap::from([("io.kubernetes.pod.uid".to_string(), "3f2a".to_string())]),
            annotations,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn create_container(cache: &mut Cache, pod_id: &str, name: &str, id: &str) {
    let provisional = cache
        .insert_container_from_create(CreateContainerRequest {
            pod_sandbox_id: pod_id.to_string(),
            config: Some(ContainerConfig {
                metadata: Some(ContainerMetadata {
                    name: name.to_string(),
                    attempt: 0,
                }),
                ..Default::default()
            }),
            sandbox_config: None,
        })
        .expect("should insert container");
    cache
        .update_container_id(
            &provisional,
            &CreateContainerResponse {
                container_id: id.to_string(),
            },
        )
        .expect("should assign runtime id");
}

fn qos_of(resources: &str) -> QosClass {
    let mut cache = Cache::new();
    let pod = cache
        .insert_pod_from_run("pod", run_request(Some(resources)))
        .expect("should insert pod");
    pod.qos_class()
}

#[test]
fn qos_classification_scenarios() {
    let guaranteed = r#"{"Containers": {"c1": {
        "Requests": {"cpu": "1", "memory": "1Gi"},
        "Limits": {"cpu": "1", "memory": "1Gi"}}}}"#;
    assert_eq!(qos_of(guaranteed), QosClass::Guaranteed);

    let cpu_request_only = r#"{"Containers": {"c1": {
        "Requests": {"cpu": "500m"},
        "Limits": {"cpu": "1", "memory": "1Gi"}}}}"#;
    assert_eq!(qos_of(cpu_request_only), QosClass::Burstable);

    let one_without_memory_limit = r#"{"Containers": {
        "c1": {"Requests": {"cpu": "1", "memory": "1Gi"}, "Limits": {"cpu": "1", "memory": "1Gi"}},
        "c2": {"Requests": {"cpu": "1"}, "Limits": {"cpu": "1"}}}}"#;
    assert_eq!(qos_of(one_without_memory_limit), QosClass::Burstable);

    let all_zero = r#"{"Containers": {"c1": {
        "Requests": {"cpu": "0", "memory": "0"},
        "Limits": {"cpu": "0m", "memory": 0}}}}"#;
    assert_eq!(qos_of(all_zero), QosClass::BestEffort);

    let equal_in_other_units = r#"{"containers": {"c1": {
        "requests": {"cpu": "100m", "memory": "1024Mi"},
        "limits": {"cpu": 0.1, "memory": "1Gi"}}}}"#;
    assert_eq!(qos_of(equal_in_other_units), QosClass::Guaranteed);
}

#[test]
fn pod_without_annotation_is_best_effort_and_owns_all_containers() {
    let mut cache = Cache::new();
    cache.insert_pod_from_run("pod", run_request(None)).unwrap();
    create_container(&mut cache, "pod", "app", "c1");
    create_container(&mut cache, "pod", "sidecar", "c2");

    let pod = cache.lookup_pod("pod").unwrap();
    assert_eq!(pod.qos_class(), QosClass::BestEffort);
    assert_eq!(pod.uid(), "3f2a");

    let mut ids: Vec<_> = pod.containers(&cache).iter().map(|c| c.id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert!(pod.init_containers(&cache).is_empty());
}

#[test]
fn annotation_splits_init_and_regular_containers() {
    let resources = r#"{
        "Containers": {
            "app": {"Requests": {"cpu": "250m", "memory": "64Mi"}}
        },
        "InitContainers": {"c-init": true}
    }"#;

    let mut cache = Cache::new();
    cache
        .insert_pod_from_run("pod", run_request(Some(resources)))
        .unwrap();
    create_container(&mut cache, "pod", "app", "c-app");
    create_container(&mut cache, "pod", "setup", "c-init");

    let pod = cache.lookup_pod("pod").unwrap();
    let regular: Vec<_> = pod.containers(&cache).iter().map(|c| c.id()).collect();
    let init: Vec<_> = pod.init_containers(&cache).iter().map(|c| c.id()).collect();
    assert_eq!(regular, vec!["c-app"]);
    assert_eq!(init, vec!["c-init"]);

    let app = cache.lookup_container("c-app").unwrap();
    let requirements = app.resource_requirements(&cache);
    assert_eq!(
        requirements.requests.get("cpu"),
        Some(&"0.25".parse::<Quantity>().unwrap())
    );
    assert_eq!(app.qos_class(&cache), QosClass::Burstable);
}

#[test]
fn removing_a_pod_drops_its_containers() {
    let mut cache = Cache::new();
    cache.insert_pod_from_run("pod", run_request(None)).unwrap();
    create_container(&mut cache, "pod", "app", "c1");

    cache.delete_pod("pod");

    assert_eq!(cache.container_count(), 0);
    assert!(cache.lookup_container("c1").is_none());
}

#[test]
fn annotation_queries_on_cached_pod() {
    let mut cache = Cache::new();
    let mut request = run_request(None);
    if let Some(config) = request.config.as_mut() {
        config
            .annotations
            .insert("example.com/replicas".to_string(), "0x10".to_string());
    }
    let pod = cache.insert_pod_from_run("pod", request).unwrap();

    assert_eq!(
        pod.annotation_object::<u64>("example.com/replicas").unwrap(),
        Some(16)
    );
    assert_eq!(pod.annotation_object::<u64>("example.com/absent").unwrap(), None);
    assert!(pod.annotation_object::<bool>("example.com/replicas").is_err());
    assert_eq!(pod.label("io.kubernetes.pod.uid"), Some("3f2a"));
}
