use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, error_stack::Report<CacheError>>;

/// Structural errors: a CRI message lacks what is needed to build an entity,
/// or an operation refers to an entity the cache does not hold.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("pod {pod_id} has no config")]
    MissingPodConfig { pod_id: String },

    #[error("pod {pod_id} has no {origin} metadata")]
    MissingPodMetadata { pod_id: String, origin: &'static str },

    #[error("container {container_id} has no config")]
    MissingContainerConfig { container_id: String },

    #[error("container {container_id} has no {origin} metadata")]
    MissingContainerMetadata {
        container_id: String,
        origin: &'static str,
    },

    #[error("pod {pod_id} not found")]
    PodNotFound { pod_id: String },

    #[error("container {container_id} not found")]
    ContainerNotFound { container_id: String },

    #[error("container id {container_id} is already in use")]
    ContainerIdInUse { container_id: String },

    #[error("runtime assigned an empty id to container {provisional_id}")]
    EmptyContainerId { provisional_id: String },
}

/// Data-quality errors raised while decoding an annotation value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid boolean {value:?}")]
    InvalidBool { value: String },

    #[error("invalid integer {value:?}")]
    InvalidInteger { value: String },

    #[error("integer {value:?} out of range for {target}")]
    IntegerOutOfRange { value: String, target: &'static str },

    #[error("invalid JSON document")]
    InvalidJson,

    #[error("custom annotation decoder failed: {message}")]
    Custom { message: String },

    #[error("failed to decode annotation {key}")]
    Annotation { key: String },
}
