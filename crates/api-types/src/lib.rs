//! Shared CRI message shapes
//!
//! This crate contains the subset of the container runtime interface messages
//! that the resource manager cache consumes: pod sandbox run requests and list
//! replies, container create requests/responses and container list replies.
//! The types mirror the protobuf messages field by field (message fields are
//! optional, maps are plain hash maps) and use the protobuf JSON naming, so
//! recorded CRI traffic can be deserialized directly.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Runtime state of a pod sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PodSandboxState {
    #[default]
    #[serde(rename = "SANDBOX_READY", alias = "Ready")]
    Ready,
    #[serde(rename = "SANDBOX_NOTREADY", alias = "NotReady")]
    NotReady,
}

impl std::fmt::Display for PodSandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Runtime state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContainerState {
    #[default]
    #[serde(rename = "CONTAINER_CREATED", alias = "Created")]
    Created,
    #[serde(rename = "CONTAINER_RUNNING", alias = "Running")]
    Running,
    #[serde(rename = "CONTAINER_EXITED", alias = "Exited")]
    Exited,
    #[serde(rename = "CONTAINER_UNKNOWN", alias = "Unknown")]
    Unknown,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Identity of a pod sandbox as assigned by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSandboxMetadata {
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub attempt: u32,
}

/// Linux specific part of a sandbox config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxPodSandboxConfig {
    /// Parent cgroup of the sandbox, in the runtime's cgroup driver syntax
    pub cgroup_parent: String,
}

/// Sandbox configuration carried by a run request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSandboxConfig {
    pub metadata: Option<PodSandboxMetadata>,
    pub hostname: String,
    pub log_directory: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub linux: Option<LinuxPodSandboxConfig>,
}

impl PodSandboxConfig {
    /// Cgroup parent of the sandbox, empty if there is no Linux section.
    pub fn cgroup_parent(&self) -> &str {
        self.linux
            .as_ref()
            .map(|linux| linux.cgroup_parent.as_str())
            .unwrap_or_default()
    }
}

/// RunPodSandbox request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunPodSandboxRequest {
    pub config: Option<PodSandboxConfig>,
    pub runtime_handler: String,
}

/// A single entry of a ListPodSandbox reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSandbox {
    pub id: String,
    pub metadata: Option<PodSandboxMetadata>,
    pub state: PodSandboxState,
    pub created_at: i64,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub runtime_handler: String,
}

/// ListPodSandbox reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListPodSandboxResponse {
    pub items: Vec<PodSandbox>,
}

/// Identity of a container within its sandbox
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerMetadata {
    pub name: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSpec {
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Linux cgroup resources of a container as passed to the runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxContainerResources {
    /// CPU CFS period in microseconds
    pub cpu_period: i64,
    /// CPU CFS quota in microseconds
    pub cpu_quota: i64,
    /// CPU shares (relative weight)
    pub cpu_shares: i64,
    /// Memory limit in bytes
    pub memory_limit_in_bytes: i64,
    pub oom_score_adj: i64,
    /// CPU set, in cpuset list format
    pub cpuset_cpus: String,
    /// Memory node set, in cpuset list format
    pub cpuset_mems: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxContainerConfig {
    pub resources: Option<LinuxContainerResources>,
}

/// Container configuration carried by a create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerConfig {
    pub metadata: Option<ContainerMetadata>,
    pub image: Option<ImageSpec>,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub working_dir: String,
    pub envs: Vec<KeyValue>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub linux: Option<LinuxContainerConfig>,
}

/// CreateContainer request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateContainerRequest {
    pub pod_sandbox_id: String,
    pub config: Option<ContainerConfig>,
    pub sandbox_config: Option<PodSandboxConfig>,
}

/// CreateContainer reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateContainerResponse {
    pub container_id: String,
}

/// A single entry of a ListContainers reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    pub id: String,
    pub pod_sandbox_id: String,
    pub metadata: Option<ContainerMetadata>,
    pub image: Option<ImageSpec>,
    pub image_ref: String,
    pub state: ContainerState,
    pub created_at: i64,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

/// ListContainers reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListContainersResponse {
    pub containers: Vec<Container>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgroup_parent_defaults_to_empty() {
        let config = PodSandboxConfig::default();
        assert_eq!(config.cgroup_parent(), "");

        let config = PodSandboxConfig {
            linux: Some(LinuxPodSandboxConfig {
                cgroup_parent: "/kubepods/burstable/pod1234".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(config.cgroup_parent(), "/kubepods/burstable/pod1234");
    }

    #[test]
    fn sandbox_state_uses_protobuf_names() {
        let sandbox: PodSandbox = serde_json::from_str(
            r#"{"id": "abc", "state": "SANDBOX_NOTREADY", "metadata": {"name": "web"}}"#,
        )
        .expect("should parse sandbox");

        assert_eq!(sandbox.id, "abc");
        assert_eq!(sandbox.state, PodSandboxState::NotReady);
        assert_eq!(sandbox.metadata.map(|m| m.name), Some("web".to_string()));
        assert!(sandbox.labels.is_empty());
    }

    #[test]
    fn container_request_uses_camel_case() {
        let request: CreateContainerRequest = serde_json::from_str(
            r#"{
                "podSandboxId": "pod-1",
                "config": {
                    "metadata": {"name": "main"},
                    "envs": [{"key": "A", "value": "1"}],
                    "linux": {"resources": {"cpuShares": 512, "cpusetCpus": "0-3"}}
                }
            }"#,
        )
        .expect("should parse request");

        assert_eq!(request.pod_sandbox_id, "pod-1");
        let config = request.config.expect("config");
        let resources = config.linux.and_then(|l| l.resources).expect("resources");
        assert_eq!(resources.cpu_shares, 512);
        assert_eq!(resources.cpuset_cpus, "0-3");
        assert_eq!(config.envs[0].key, "A");
    }
}
