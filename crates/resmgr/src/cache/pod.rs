//! Pod entity, built from intercepted sandbox run requests or list replies.

use std::collections::HashMap;
use std::sync::OnceLock;

use api_types::PodSandbox;
use api_types::PodSandboxState;
use api_types::RunPodSandboxRequest;
use error_stack::Report;
use tracing::debug;
use tracing::warn;

use super::annotations::Json;
use super::annotations::Metadata;
use super::container::Container;
use super::error::CacheError;
use super::error::Result;
use super::qos::pod_qos_class;
use super::qos::QosClass;
use super::resources::PodResourceRequirements;
use super::Cache;

/// Annotation key used by the admission webhook for per-container resources.
pub const KEY_RESOURCE_ANNOTATION: &str = "intel.com/resources";

/// Label carrying the Kubernetes pod UID.
pub const KUBERNETES_POD_UID_LABEL: &str = "io.kubernetes.pod.uid";

/// A pod sandbox known to the runtime.
#[derive(Debug, Clone)]
pub struct Pod {
    id: String,
    uid: String,
    name: String,
    namespace: String,
    state: PodSandboxState,
    labels: HashMap<String, String>,
    annotations: HashMap<String, String>,
    cgroup_parent: String,
    resources: Option<PodResourceRequirements>,
    qos_class: OnceLock<QosClass>,
}

impl Pod {
    fn new(id: String) -> Self {
        Self {
            id,
            uid: String::new(),
            name: String::new(),
            namespace: String::new(),
            state: PodSandboxState::default(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            cgroup_parent: String::new(),
            resources: None,
            qos_class: OnceLock::new(),
        }
    }

    /// Create a pod from an intercepted run request.
    ///
    /// The request's label and annotation maps are moved into the pod. A
    /// freshly run sandbox is assumed to be ready.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingPodConfig`] if the request has no config
    /// - [`CacheError::MissingPodMetadata`] if the config has no metadata
    pub fn from_run_request(id: impl Into<String>, request: RunPodSandboxRequest) -> Result<Self> {
        let mut pod = Self::new(id.into());

        let Some(config) = request.config else {
            return Err(Report::new(CacheError::MissingPodConfig { pod_id: pod.id }));
        };
        let cgroup_parent = config.cgroup_parent().to_string();
        let Some(meta) = config.metadata else {
            return Err(Report::new(CacheError::MissingPodMetadata {
                pod_id: pod.id,
                origin: "request",
            }));
        };

        pod.name = meta.name;
        pod.namespace = meta.namespace;
        pod.state = PodSandboxState::Ready;
        pod.labels = config.labels;
        pod.annotations = config.annotations;
        pod.cgroup_parent = cgroup_parent;

        pod.parse_resource_annotations();
        pod.extract_labels();

        Ok(pod)
    }

    /// Create a pod from an entry of a sandbox list reply.
    ///
    /// The state is taken verbatim from the reply.
    ///
    /// # Errors
    ///
    /// - [`CacheError::MissingPodMetadata`] if the reply has no metadata
    pub fn from_list_response(sandbox: PodSandbox) -> Result<Self> {
        let mut pod = Self::new(sandbox.id);

        let Some(meta) = sandbox.metadata else {
            return Err(Report::new(CacheError::MissingPodMetadata {
                pod_id: pod.id,
                origin: "reply",
            }));
        };

        pod.name = meta.name;
        pod.namespace = meta.namespace;
        pod.state = sandbox.state;
        pod.labels = sandbox.labels;
        pod.annotations = sandbox.annotations;

        pod.parse_resource_annotations();
        pod.extract_labels();

        Ok(pod)
    }

    /// Apply the runtime state reported by a later list reply.
    ///
    /// Returns true if the state changed.
    pub(crate) fn update_state(&mut self, state: PodSandboxState) -> bool {
        if self.state == state {
            return false;
        }
        debug!(
            pod_id = %self.id,
            old_state = %self.state,
            new_state = %state,
            "Pod state changed"
        );
        self.state = state;
        true
    }

    /// Kubernetes pod UID, empty if the pod carries no UID label.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn state(&self) -> PodSandboxState {
        self.state
    }

    /// Cgroup parent directory of the pod, empty if unknown.
    pub fn cgroup_parent_dir(&self) -> &str {
        &self.cgroup_parent
    }

    /// Resource requirements from the webhook annotation, if the pod has any.
    pub fn resources(&self) -> Option<&PodResourceRequirements> {
        self.resources.as_ref()
    }

    /// Resource requirements of the pod; empty if the pod has none.
    pub fn resource_requirements(&self) -> PodResourceRequirements {
        self.resources.clone().unwrap_or_default()
    }

    /// QoS class of the pod.
    ///
    /// Computed on first use and never recomputed for this entity.
    pub fn qos_class(&self) -> QosClass {
        *self.qos_class.get_or_init(|| {
            let class = match &self.resources {
                Some(resources) => pod_qos_class(resources),
                None => pod_qos_class(&PodResourceRequirements::default()),
            };
            debug!(pod_id = %self.id, qos_class = %class, "Computed pod QoS class");
            class
        })
    }

    /// QoS class if it has already been computed.
    pub fn computed_qos_class(&self) -> Option<QosClass> {
        self.qos_class.get().copied()
    }

    /// Regular (non-init) containers of the pod.
    ///
    /// Without resource annotations every container of the pod is returned.
    /// Order is unspecified.
    pub fn containers<'c>(&self, cache: &'c Cache) -> Vec<&'c Container> {
        let owned = cache.pod_containers(&self.id);
        match &self.resources {
            None => owned.collect(),
            Some(resources) => owned
                .filter(|c| resources.is_regular_container(c.resource_keys()))
                .collect(),
        }
    }

    /// Init containers of the pod; none without resource annotations.
    /// Order is unspecified.
    pub fn init_containers<'c>(&self, cache: &'c Cache) -> Vec<&'c Container> {
        let Some(resources) = &self.resources else {
            return Vec::new();
        };
        cache
            .pod_containers(&self.id)
            .filter(|c| resources.is_init_container(c.resource_keys()))
            .collect()
    }

    /// Extract oft-used data (currently only the k8s uid) from pod labels.
    fn extract_labels(&mut self) {
        match self.labels.get(KUBERNETES_POD_UID_LABEL) {
            Some(uid) => self.uid = uid.clone(),
            None => {
                warn!(pod_id = %self.id, "can't find (k8s) uid label for pod");
                self.uid = String::new();
            }
        }
    }

    /// Parse per container resource requirements from webhook annotations.
    fn parse_resource_annotations(&mut self) {
        self.resources = self
            .annotation_object::<Json<PodResourceRequirements>>(KEY_RESOURCE_ANNOTATION)
            .ok()
            .flatten()
            .map(Json::into_inner);
    }
}

impl Metadata for Pod {
    const KIND: &'static str = "pod";

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
