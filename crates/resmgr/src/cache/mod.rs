//! State cache of pods and containers observed through CRI traffic.
//!
//! The [`Cache`] is the sole owner of all [`Pod`] and [`Container`] entities,
//! keyed by id. Pods refer to their containers only by id, and resolve them
//! through the cache at query time.
//!
//! The main components are:
//! - [`Pod`]: a pod sandbox with its labels, annotations and resource model
//! - [`Container`]: a container and its owning pod id
//! - [`PodResourceRequirements`]: webhook-declared requests/limits per container
//! - [`QosClass`]: the Kubernetes QoS class derived from those requirements

pub mod annotations;
pub mod container;
pub mod error;
pub mod pod;
pub mod qos;
pub mod quantity;
pub mod resources;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::RwLock;

use api_types::Container as CriContainer;
use api_types::CreateContainerRequest;
use api_types::CreateContainerResponse;
use api_types::ListContainersResponse;
use api_types::ListPodSandboxResponse;
use api_types::PodSandbox;
use api_types::RunPodSandboxRequest;
use error_stack::Report;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use annotations::AnnotationValue;
pub use annotations::Json;
pub use annotations::Metadata;
pub use container::Container;
pub use error::CacheError;
pub use error::DecodeError;
pub use error::Result;
pub use pod::Pod;
pub use pod::KEY_RESOURCE_ANNOTATION;
pub use pod::KUBERNETES_POD_UID_LABEL;
pub use qos::QosClass;
pub use quantity::Quantity;
pub use resources::PodResourceRequirements;
pub use resources::ResourceRequirements;

/// Prefix of the ids the cache assigns to containers whose create request
/// has not been answered yet.
pub const PROVISIONAL_ID_PREFIX: &str = "cache:";

/// Cache shared between the interception and the reconciliation paths.
pub type SharedCache = Arc<RwLock<Cache>>;

/// Outcome of reconciling the cache against a full list reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refresh {
    /// Ids seen for the first time
    pub added: Vec<String>,
    /// Known ids whose state changed
    pub updated: Vec<String>,
    /// Ids no longer reported by the runtime
    pub removed: Vec<String>,
}

impl Refresh {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    fn sort(mut self) -> Self {
        self.added.sort();
        self.updated.sort();
        self.removed.sort();
        self
    }
}

/// Registry of all pods and containers known to the resource manager.
#[derive(Debug, Default)]
pub struct Cache {
    pods: HashMap<String, Pod>,
    containers: HashMap<String, Container>,
    next_provisional_id: u64,
    /// Provisional container ids, with the number of container refreshes
    /// done when each was inserted.
    pending_creates: HashMap<String, u64>,
    container_refreshes: u64,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache for sharing between threads.
    pub fn new_shared() -> SharedCache {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert a pod for an intercepted run request, replacing any pod with the same id.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingPodConfig`], [`CacheError::MissingPodMetadata`]
    ///   if the request lacks identity; the cache is left unchanged
    pub fn insert_pod_from_run(
        &mut self,
        id: &str,
        request: RunPodSandboxRequest,
    ) -> Result<&Pod> {
        let pod = Pod::from_run_request(id, request)?;

        info!(
            pod_id = %id,
            namespace = %pod.namespace(),
            name = %pod.name(),
            "Pod inserted into cache"
        );

        Ok(match self.pods.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                debug!(pod_id = %id, "Replaced existing pod");
                entry.insert(pod);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(pod),
        })
    }

    /// Insert a pod from a list reply entry, or update the state of a known pod.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingPodMetadata`] if an unseen pod has no metadata
    pub fn insert_pod_from_list(&mut self, sandbox: PodSandbox) -> Result<&Pod> {
        Ok(self.upsert_pod_from_list(sandbox)?.0)
    }

    /// Returns the pod and whether it was newly created or changed state.
    fn upsert_pod_from_list(&mut self, sandbox: PodSandbox) -> Result<(&Pod, Change)> {
        match self.pods.entry(sandbox.id.clone()) {
            Entry::Occupied(entry) => {
                let pod = entry.into_mut();
                let change = if pod.update_state(sandbox.state) {
                    Change::Updated
                } else {
                    Change::None
                };
                Ok((pod, change))
            }
            Entry::Vacant(entry) => {
                let pod = Pod::from_list_response(sandbox)?;
                info!(
                    pod_id = %pod.id(),
                    namespace = %pod.namespace(),
                    name = %pod.name(),
                    "Pod discovered from list reply"
                );
                Ok((entry.insert(pod), Change::Added))
            }
        }
    }

    /// Remove a pod together with all of its containers.
    pub fn delete_pod(&mut self, id: &str) -> Option<Pod> {
        let pod = self.pods.remove(id)?;

        let before = self.containers.len();
        self.containers.retain(|_, c| c.pod_id() != id);
        let removed_containers = before - self.containers.len();
        let containers = &self.containers;
        self.pending_creates.retain(|id, _| containers.contains_key(id));

        info!(
            pod_id = %id,
            removed_containers = removed_containers,
            "Pod removed from cache"
        );

        Some(pod)
    }

    pub fn lookup_pod(&self, id: &str) -> Option<&Pod> {
        self.pods.get(id)
    }

    /// All pods, in no particular order.
    pub fn pods(&self) -> impl Iterator<Item = &Pod> {
        self.pods.values()
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    /// Insert a container for an intercepted create request.
    ///
    /// The container is stored under a provisional id, returned here, until
    /// [`Cache::update_container_id`] applies the runtime's reply.
    ///
    /// # Errors
    ///
    /// - [`CacheError::PodNotFound`] if the owning pod is not in the cache
    /// - [`CacheError::MissingContainerConfig`],
    ///   [`CacheError::MissingContainerMetadata`] if the request lacks identity
    pub fn insert_container_from_create(
        &mut self,
        request: CreateContainerRequest,
    ) -> Result<String> {
        let pod = self.pods.get(&request.pod_sandbox_id).ok_or_else(|| {
            Report::new(CacheError::PodNotFound {
                pod_id: request.pod_sandbox_id.clone(),
            })
        })?;

        let id = format!("{PROVISIONAL_ID_PREFIX}{}", self.next_provisional_id);
        let container = Container::from_create_request(id.clone(), request, pod)?;
        self.next_provisional_id += 1;

        info!(
            container_id = %id,
            pod_id = %container.pod_id(),
            name = %container.name(),
            "Container inserted into cache"
        );

        self.containers.insert(id.clone(), container);
        self.pending_creates
            .insert(id.clone(), self.container_refreshes);
        Ok(id)
    }

    /// Drop a container whose create request the runtime rejected.
    ///
    /// Only containers still waiting for their runtime id can be aborted.
    pub fn abort_container_create(&mut self, provisional_id: &str) -> Option<Container> {
        self.pending_creates.remove(provisional_id)?;
        let container = self.containers.remove(provisional_id)?;
        info!(
            container_id = %provisional_id,
            pod_id = %container.pod_id(),
            "Container create aborted"
        );
        Some(container)
    }

    /// Re-key a container created through [`Cache::insert_container_from_create`]
    /// with the id assigned by the runtime.
    ///
    /// # Errors
    ///
    /// - [`CacheError::EmptyContainerId`] if the response carries no id
    /// - [`CacheError::ContainerNotFound`] if `provisional_id` is not pending
    /// - [`CacheError::ContainerIdInUse`] if the runtime id is already cached
    ///
    /// On error the cache is left unchanged.
    pub fn update_container_id(
        &mut self,
        provisional_id: &str,
        response: &CreateContainerResponse,
    ) -> Result<&Container> {
        let id = response.container_id.clone();
        if id.is_empty() {
            return Err(Report::new(CacheError::EmptyContainerId {
                provisional_id: provisional_id.to_string(),
            }));
        }
        if !self.pending_creates.contains_key(provisional_id) {
            return Err(Report::new(CacheError::ContainerNotFound {
                container_id: provisional_id.to_string(),
            }));
        }
        if self.containers.contains_key(&id) {
            return Err(Report::new(CacheError::ContainerIdInUse { container_id: id }));
        }

        let mut container = self.containers.remove(provisional_id).ok_or_else(|| {
            Report::new(CacheError::ContainerNotFound {
                container_id: provisional_id.to_string(),
            })
        })?;
        self.pending_creates.remove(provisional_id);

        debug!(
            provisional_id = %provisional_id,
            container_id = %id,
            "Container id assigned by runtime"
        );

        container.set_id(id.clone());
        Ok(self.containers.entry(id).or_insert(container))
    }

    /// Insert a container from a list reply entry, or update the state of a
    /// known container.
    ///
    /// # Errors
    ///
    /// - [`CacheError::PodNotFound`] if the owning pod is not in the cache
    /// - [`CacheError::MissingContainerMetadata`] if an unseen container has
    ///   no metadata
    pub fn insert_container_from_list(&mut self, reply: CriContainer) -> Result<&Container> {
        Ok(self.upsert_container_from_list(reply)?.0)
    }

    fn upsert_container_from_list(&mut self, reply: CriContainer) -> Result<(&Container, Change)> {
        let pod = self.pods.get(&reply.pod_sandbox_id).ok_or_else(|| {
            Report::new(CacheError::PodNotFound {
                pod_id: reply.pod_sandbox_id.clone(),
            })
        })?;

        match self.containers.entry(reply.id.clone()) {
            Entry::Occupied(entry) => {
                let container = entry.into_mut();
                let change = if container.update_state(reply.state) {
                    Change::Updated
                } else {
                    Change::None
                };
                Ok((container, change))
            }
            Entry::Vacant(entry) => {
                let container = Container::from_list_response(reply, pod)?;
                info!(
                    container_id = %container.id(),
                    pod_id = %container.pod_id(),
                    name = %container.name(),
                    "Container discovered from list reply"
                );
                Ok((entry.insert(container), Change::Added))
            }
        }
    }

    pub fn delete_container(&mut self, id: &str) -> Option<Container> {
        let container = self.containers.remove(id)?;
        self.pending_creates.remove(id);
        info!(
            container_id = %id,
            pod_id = %container.pod_id(),
            "Container removed from cache"
        );
        Some(container)
    }

    pub fn lookup_container(&self, id: &str) -> Option<&Container> {
        self.containers.get(id)
    }

    /// All containers, in no particular order.
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// All containers belonging to a pod, in no particular order.
    pub fn pod_containers<'a>(&'a self, pod_id: &str) -> impl Iterator<Item = &'a Container> + 'a {
        let pod_id = pod_id.to_string();
        self.containers
            .values()
            .filter(move |c| c.pod_id() == pod_id)
    }

    /// Reconcile the pods against a full sandbox list reply.
    ///
    /// Unseen sandboxes are added, known ones get their state updated and
    /// pods missing from the reply are removed with their containers.
    /// Malformed entries are logged and skipped.
    pub fn refresh_pods(&mut self, reply: ListPodSandboxResponse) -> Refresh {
        let mut refresh = Refresh::default();
        let mut seen = HashSet::new();

        for sandbox in reply.items {
            let id = sandbox.id.clone();
            seen.insert(id.clone());
            match self.upsert_pod_from_list(sandbox) {
                Ok((_, change)) => change.record(&mut refresh, id),
                Err(e) => warn!(pod_id = %id, "Skipping sandbox in list reply: {e:?}"),
            }
        }

        let stale: Vec<String> = self
            .pods
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            self.delete_pod(&id);
            refresh.removed.push(id);
        }

        if !refresh.is_empty() {
            info!(
                added = refresh.added.len(),
                updated = refresh.updated.len(),
                removed = refresh.removed.len(),
                "Pods refreshed from list reply"
            );
        }
        refresh.sort()
    }

    /// Reconcile the containers against a full container list reply.
    ///
    /// Containers with a provisional id are still being created and survive
    /// the first list reply after their insertion; a create that is still
    /// unanswered at the next one is considered lost and dropped.
    /// Entries referring to unknown pods are logged and skipped.
    pub fn refresh_containers(&mut self, reply: ListContainersResponse) -> Refresh {
        let mut refresh = Refresh::default();
        let mut seen = HashSet::new();

        for container in reply.containers {
            let id = container.id.clone();
            seen.insert(id.clone());
            match self.upsert_container_from_list(container) {
                Ok((_, change)) => change.record(&mut refresh, id),
                Err(e) => warn!(container_id = %id, "Skipping container in list reply: {e:?}"),
            }
        }

        let stale: Vec<String> = self
            .containers
            .keys()
            .filter(|id| match self.pending_creates.get(*id) {
                Some(inserted_at) => *inserted_at < self.container_refreshes,
                None => !seen.contains(*id),
            })
            .cloned()
            .collect();
        for id in stale {
            if self.pending_creates.contains_key(&id) {
                warn!(container_id = %id, "Dropping container create without runtime reply");
            }
            self.delete_container(&id);
            refresh.removed.push(id);
        }
        self.container_refreshes += 1;

        if !refresh.is_empty() {
            info!(
                added = refresh.added.len(),
                updated = refresh.updated.len(),
                removed = refresh.removed.len(),
                "Containers refreshed from list reply"
            );
        }
        refresh.sort()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Updated,
    None,
}

impl Change {
    fn record(self, refresh: &mut Refresh, id: String) {
        match self {
            Change::Added => refresh.added.push(id),
            Change::Updated => refresh.updated.push(id),
            Change::None => {}
        }
    }
}
