//! Drives a [`Cache`] with recorded CRI traffic.
//!
//! The input is a YAML (or JSON) sequence of events, each tagged by an
//! `event` field:
//!
//! ```yaml
//! - event: runPodSandbox
//!   id: pod-1
//!   request: { config: { metadata: { name: web, namespace: default } } }
//! - event: createContainer
//!   request: { podSandboxId: pod-1, config: { metadata: { name: app } } }
//!   response: { containerId: ctr-1 }
//! - event: createContainer
//!   request: { podSandboxId: pod-1, config: { metadata: { name: broken } } }
//!   error: "image not found"
//! - event: removePodSandbox
//!   id: pod-1
//! ```

use core::error::Error;
use std::fs;
use std::path::Path;

use api_types::ContainerState;
use api_types::CreateContainerRequest;
use api_types::CreateContainerResponse;
use api_types::ListContainersResponse;
use api_types::ListPodSandboxResponse;
use api_types::PodSandboxState;
use api_types::RunPodSandboxRequest;
use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::Cache;
use crate::cache::Container;
use crate::cache::Metadata;
use crate::cache::Pod;
use crate::cache::QosClass;

pub type ReplayResult<T> = Result<T, Report<ReplayError>>;

#[derive(Debug, Display)]
pub enum ReplayError {
    #[display("failed to read replay input {path}")]
    Read { path: String },

    #[display("failed to parse replay input")]
    Parse,

    #[display("event #{index} ({event}) was rejected by the cache")]
    Event { index: usize, event: &'static str },

    #[display("failed to write summary to {path}")]
    Write { path: String },

    #[display("failed to serialize summary")]
    Serialize,
}

impl Error for ReplayError {}

/// A recorded CRI request or reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ReplayEvent {
    /// A run request intercepted together with the sandbox id the runtime assigned.
    RunPodSandbox {
        id: String,
        request: RunPodSandboxRequest,
    },
    /// A full sandbox list reply.
    ListPodSandbox { reply: ListPodSandboxResponse },
    RemovePodSandbox { id: String },
    /// A create request, and the runtime's response or error if one was
    /// recorded.
    CreateContainer {
        request: CreateContainerRequest,
        #[serde(default)]
        response: Option<CreateContainerResponse>,
        #[serde(default)]
        error: Option<String>,
    },
    /// A full container list reply.
    ListContainers { reply: ListContainersResponse },
    RemoveContainer { id: String },
}

impl ReplayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReplayEvent::RunPodSandbox { .. } => "runPodSandbox",
            ReplayEvent::ListPodSandbox { .. } => "listPodSandbox",
            ReplayEvent::RemovePodSandbox { .. } => "removePodSandbox",
            ReplayEvent::CreateContainer { .. } => "createContainer",
            ReplayEvent::ListContainers { .. } => "listContainers",
            ReplayEvent::RemoveContainer { .. } => "removeContainer",
        }
    }

    /// Apply the event to the cache.
    ///
    /// Removal of unknown ids is not an error, the runtime may have
    /// forgotten the entity before the cache saw it.
    pub fn apply(self, cache: &mut Cache) -> crate::cache::Result<()> {
        match self {
            ReplayEvent::RunPodSandbox { id, request } => {
                cache.insert_pod_from_run(&id, request)?;
            }
            ReplayEvent::ListPodSandbox { reply } => {
                cache.refresh_pods(reply);
            }
            ReplayEvent::RemovePodSandbox { id } => {
                if cache.delete_pod(&id).is_none() {
                    debug!(pod_id = %id, "Removed pod was not cached");
                }
            }
            ReplayEvent::CreateContainer {
                request,
                response,
                error,
            } => {
                let provisional = cache.insert_container_from_create(request)?;
                if let Some(error) = error {
                    info!(container_id = %provisional, "Runtime failed to create container: {error}");
                    cache.abort_container_create(&provisional);
                } else if let Some(response) = response {
                    let assigned = cache.update_container_id(&provisional, &response).map(|_| ());
                    if let Err(report) = assigned {
                        cache.abort_container_create(&provisional);
                        return Err(report);
                    }
                }
            }
            ReplayEvent::ListContainers { reply } => {
                cache.refresh_containers(reply);
            }
            ReplayEvent::RemoveContainer { id } => {
                if cache.delete_container(&id).is_none() {
                    debug!(container_id = %id, "Removed container was not cached");
                }
            }
        }
        Ok(())
    }
}

/// Parse a YAML or JSON event sequence.
pub fn parse_events(input: &str) -> ReplayResult<Vec<ReplayEvent>> {
    serde_yaml::from_str(input).change_context(ReplayError::Parse)
}

pub fn load_events(path: &Path) -> ReplayResult<Vec<ReplayEvent>> {
    let content = fs::read_to_string(path).change_context(ReplayError::Read {
        path: path.display().to_string(),
    })?;
    parse_events(&content).attach_printable_lazy(|| format!("input: {}", path.display()))
}

/// Counts of applied and rejected events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub applied: usize,
    pub failed: usize,
}

/// Apply events in order.
///
/// Rejected events are logged and skipped unless `strict` is set, in which
/// case the first rejection aborts the replay.
pub fn apply_events(
    cache: &mut Cache,
    events: Vec<ReplayEvent>,
    strict: bool,
) -> ReplayResult<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (index, event) in events.into_iter().enumerate() {
        let name = event.name();
        match event.apply(cache) {
            Ok(()) => stats.applied += 1,
            Err(report) => {
                let report = report.change_context(ReplayError::Event { index, event: name });
                if strict {
                    return Err(report);
                }
                warn!("Skipping event: {report:?}");
                stats.failed += 1;
            }
        }
    }

    info!(
        applied = stats.applied,
        failed = stats.failed,
        pods = cache.pod_count(),
        containers = cache.container_count(),
        "Replay finished"
    );
    Ok(stats)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub image: String,
}

impl From<&Container> for ContainerSummary {
    fn from(container: &Container) -> Self {
        Self {
            id: container.id().to_string(),
            name: container.name().to_string(),
            state: container.state(),
            image: container.image().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    pub id: String,
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub state: PodSandboxState,
    pub cgroup_parent: String,
    pub qos_class: QosClass,
    pub containers: Vec<ContainerSummary>,
    pub init_containers: Vec<ContainerSummary>,
}

impl PodSummary {
    pub fn new(pod: &Pod, cache: &Cache) -> Self {
        Self {
            id: pod.id().to_string(),
            uid: pod.uid().to_string(),
            name: pod.name().to_string(),
            namespace: pod.namespace().to_string(),
            state: pod.state(),
            cgroup_parent: pod.cgroup_parent_dir().to_string(),
            qos_class: pod.qos_class(),
            containers: summarize_containers(pod.containers(cache)),
            init_containers: summarize_containers(pod.init_containers(cache)),
        }
    }
}

fn summarize_containers(containers: Vec<&Container>) -> Vec<ContainerSummary> {
    let mut summary: Vec<ContainerSummary> =
        containers.into_iter().map(ContainerSummary::from).collect();
    summary.sort_by(|a, b| a.id.cmp(&b.id));
    summary
}

/// Result of a replay run as written to the output.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    #[serde(flatten)]
    pub stats: ReplayStats,
    pub pods: Vec<PodSummary>,
}

/// Summaries of every cached pod, ordered by pod id.
pub fn summarize(cache: &Cache) -> Vec<PodSummary> {
    let mut pods: Vec<PodSummary> = cache.pods().map(|pod| PodSummary::new(pod, cache)).collect();
    pods.sort_by(|a, b| a.id.cmp(&b.id));
    pods
}

/// Load, apply and summarize a recorded event file.
///
/// The summary is written as pretty-printed JSON to `output`, or returned
/// only when `output` is `None`.
pub fn run(input: &Path, output: Option<&Path>, strict: bool) -> ReplayResult<ReplaySummary> {
    let events = load_events(input)?;
    info!(events = events.len(), input = %input.display(), "Replaying CRI events");

    let mut cache = Cache::new();
    let stats = apply_events(&mut cache, events, strict)?;
    let summary = ReplaySummary {
        stats,
        pods: summarize(&cache),
    };

    if let Some(output) = output {
        let json = serde_json::to_string_pretty(&summary).change_context(ReplayError::Serialize)?;
        fs::write(output, json).change_context(ReplayError::Write {
            path: output.display().to_string(),
        })?;
    }
    Ok(summary)
}
