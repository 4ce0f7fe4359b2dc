//! State cache of a node-local CRI resource manager.
//!
//! [`cache::Cache`] reconstructs pods and containers from intercepted CRI
//! requests and replies, decodes the resource requirements an admission
//! webhook stores in pod annotations and classifies pods into Kubernetes QoS
//! classes. [`replay`] feeds recorded CRI traffic through a cache.

pub mod cache;
pub mod config;
pub mod replay;
