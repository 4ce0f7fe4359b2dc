use std::fs;

use api_types::ContainerState;
use api_types::PodSandboxState;
use resmgr::cache::QosClass;
use resmgr::replay;
use resmgr::replay::ReplayError;
use serde_json::Value;
use similar_asserts::assert_eq;
use test_log::test;

const JSON_EVENTS: &str = r#"[
  {
    "event": "runPodSandbox",
    "id": "pod-a",
    "request": {
      "config": {
        "metadata": {"name": "db", "namespace": "prod", "uid": "uid-a"},
        "labels": {"io.kubernetes.pod.uid": "uid-a"},
        "annotations": {
          "intel.com/resources": "{\"Containers\":{\"postgres\":{\"Requests\":{\"cpu\":\"2\",\"memory\":\"4Gi\"},\"Limits\":{\"cpu\":\"2\",\"memory\":\"4Gi\"}}},\"InitContainers\":{\"migrate\":true}}"
        },
        "linux": {"cgroupParent": "/kubepods/pod-a"}
      }
    }
  },
  {
    "event": "createContainer",
    "request": {"podSandboxId": "pod-a", "config": {"metadata": {"name": "migrate"}}},
    "response": {"containerId": "ctr-migrate"}
  },
  {
    "event": "createContainer",
    "request": {"podSandboxId": "pod-a", "config": {"metadata": {"name": "postgres"}, "image": {"image": "postgres:16"}}},
    "response": {"containerId": "ctr-pg"}
  },
  {
    "event": "listPodSandbox",
    "reply": {"items": [
      {"id": "pod-a", "metadata": {"name": "db", "namespace": "prod"}, "state": "SANDBOX_READY"},
      {"id": "pod-b", "metadata": {"name": "batch", "namespace": "jobs"}, "state": "SANDBOX_NOTREADY"}
    ]}
  },
  {
    "event": "listContainers",
    "reply": {"containers": [
      {"id": "ctr-migrate", "podSandboxId": "pod-a", "metadata": {"name": "migrate"}, "state": "CONTAINER_EXITED"},
      {"id": "ctr-pg", "podSandboxId": "pod-a", "metadata": {"name": "postgres"}, "state": "CONTAINER_RUNNING"}
    ]}
  }
]"#;

#[test]
fn replays_json_input_to_output_file() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let input = dir.path().join("events.json");
    let output = dir.path().join("pods.json");
    fs::write(&input, JSON_EVENTS).expect("should write input");

    let summary = replay::run(&input, Some(&output), true).expect("replay should succeed");
    assert_eq!(summary.stats.applied, 5);
    assert_eq!(summary.stats.failed, 0);

    let ids: Vec<_> = summary.pods.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["pod-a", "pod-b"]);

    let db = &summary.pods[0];
    assert_eq!(db.uid, "uid-a");
    assert_eq!(db.cgroup_parent, "/kubepods/pod-a");
    assert_eq!(db.qos_class, QosClass::Guaranteed);
    assert_eq!(db.containers.len(), 1);
    assert_eq!(db.containers[0].id, "ctr-pg");
    assert_eq!(db.containers[0].image, "postgres:16");
    assert_eq!(db.containers[0].state, ContainerState::Running);
    assert_eq!(db.init_containers.len(), 1);
    assert_eq!(db.init_containers[0].state, ContainerState::Exited);

    let batch = &summary.pods[1];
    assert_eq!(batch.state, PodSandboxState::NotReady);
    assert_eq!(batch.qos_class, QosClass::BestEffort);
    assert!(batch.containers.is_empty());

    let written: Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("should read output"))
            .expect("output should be JSON");
    assert_eq!(written["applied"], 5);
    assert_eq!(written["pods"][0]["cgroupParent"], "/kubepods/pod-a");
    assert_eq!(written["pods"][0]["qosClass"], "Guaranteed");
}

#[test]
fn reconciliation_removes_vanished_pods() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("events.yaml");
    fs::write(
        &input,
        r#"
- event: runPodSandbox
  id: short-lived
  request:
    config:
      metadata: { name: job, namespace: jobs }
- event: createContainer
  request:
    podSandboxId: short-lived
    config: { metadata: { name: worker } }
  response: { containerId: ctr-1 }
- event: listPodSandbox
  reply: { items: [] }
"#,
    )
    .unwrap();

    let summary = replay::run(&input, None, false).unwrap();
    assert!(summary.pods.is_empty());
}

#[test]
fn missing_input_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = replay::run(&dir.path().join("absent.yaml"), None, false).unwrap_err();
    assert!(matches!(err.current_context(), ReplayError::Read { .. }));
}
