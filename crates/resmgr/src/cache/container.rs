//! Container entity, built from intercepted create requests or list replies.

use std::collections::HashMap;

use api_types::Container as CriContainer;
use api_types::ContainerState;
use api_types::CreateContainerRequest;
use api_types::KeyValue;
use api_types::LinuxContainerResources;
use error_stack::Report;
use tracing::debug;

use super::annotations::Metadata;
use super::error::CacheError;
use super::error::Result;
use super::pod::Pod;
use super::qos::QosClass;
use super::resources::ResourceRequirements;
use super::Cache;

/// A container known to the runtime, or being created through it.
#[derive(Debug, Clone)]
pub struct Container {
    id: String,
    pod_id: String,
    name: String,
    namespace: String,
    state: ContainerState,
    image: String,
    command: Vec<String>,
    args: Vec<String>,
    env: Vec<KeyValue>,
    labels: HashMap<String, String>,
    annotations: HashMap<String, String>,
    linux_resources: Option<LinuxContainerResources>,
}

impl Container {
    fn new(id: String, pod: &Pod) -> Self {
        Self {
            id,
            pod_id: pod.id().to_string(),
            name: String::new(),
            namespace: pod.namespace().to_string(),
            state: ContainerState::default(),
            image: String::new(),
            command: Vec::new(),
            args: Vec::new(),
            env: Vec::new(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            linux_resources: None,
        }
    }

    /// Create a container from an intercepted create request.
    ///
    /// `id` is the provisional id the cache uses until the runtime replies.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingContainerConfig`] if the request has no config
    /// - [`CacheError::MissingContainerMetadata`] if the config has no metadata
    pub fn from_create_request(
        id: impl Into<String>,
        request: CreateContainerRequest,
        pod: &Pod,
    ) -> Result<Self> {
        let mut container = Self::new(id.into(), pod);

        let Some(config) = request.config else {
            return Err(Report::new(CacheError::MissingContainerConfig {
                container_id: container.id,
            }));
        };
        let Some(meta) = config.metadata else {
            return Err(Report::new(CacheError::MissingContainerMetadata {
                container_id: container.id,
                origin: "request",
            }));
        };

        container.name = meta.name;
        container.state = ContainerState::Created;
        container.image = config.image.map(|image| image.image).unwrap_or_default();
        container.command = config.command;
        container.args = config.args;
        container.env = config.envs;
        container.labels = config.labels;
        container.annotations = config.annotations;
        container.linux_resources = config.linux.and_then(|linux| linux.resources);

        Ok(container)
    }

    /// Create a container from an entry of a container list reply.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingContainerMetadata`] if the reply has no metadata
    pub fn from_list_response(reply: CriContainer, pod: &Pod) -> Result<Self> {
        let mut container = Self::new(reply.id, pod);

        let Some(meta) = reply.metadata else {
            return Err(Report::new(CacheError::MissingContainerMetadata {
                container_id: container.id,
                origin: "reply",
            }));
        };

        container.name = meta.name;
        container.state = reply.state;
        container.image = reply.image.map(|image| image.image).unwrap_or_default();
        container.labels = reply.labels;
        container.annotations = reply.annotations;

        Ok(container)
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Returns true if the state changed.
    pub(crate) fn update_state(&mut self, state: ContainerState) -> bool {
        if self.state == state {
            return false;
        }
        debug!(
            container_id = %self.id,
            old_state = %self.state,
            new_state = %state,
            "Container state changed"
        );
        self.state = state;
        true
    }

    /// Keys under which the webhook annotation may refer to this container.
    pub(crate) fn resource_keys(&self) -> [&str; 2] {
        [&self.id, &self.name]
    }

    /// Id of the owning pod sandbox.
    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Value of an environment variable set in the container config.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }

    pub fn env_keys(&self) -> Vec<&str> {
        self.env.iter().map(|kv| kv.key.as_str()).collect()
    }

    /// Linux resources requested from the runtime, if known.
    pub fn linux_resources(&self) -> Option<&LinuxContainerResources> {
        self.linux_resources.as_ref()
    }

    /// The owning pod.
    pub fn pod<'c>(&self, cache: &'c Cache) -> Option<&'c Pod> {
        cache.lookup_pod(&self.pod_id)
    }

    /// Requirements declared for this container by the pod's webhook annotation.
    pub fn resource_requirements(&self, cache: &Cache) -> ResourceRequirements {
        self.pod(cache)
            .and_then(|pod| pod.resources())
            .and_then(|resources| resources.container(self.resource_keys()))
            .cloned()
            .unwrap_or_default()
    }

    /// QoS class of the owning pod.
    pub fn qos_class(&self, cache: &Cache) -> QosClass {
        self.pod(cache)
            .map(Pod::qos_class)
            .unwrap_or(QosClass::BestEffort)
    }
}

impl Metadata for Container {
    const KIND: &'static str = "container";

    fn id(&self) -> &str {
        &self.id
    }

    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }
}
