//! Kubernetes pod QoS classification.
//!
//! Mirrors the kubelet's `GetPodQOS`: only CPU and memory take part, zero
//! quantities are ignored, and a single container without both a CPU and a
//! memory limit rules out `Guaranteed` for the whole pod.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::quantity::Quantity;
use super::resources::PodResourceRequirements;
use super::resources::ResourceList;
use super::resources::RESOURCE_CPU;
use super::resources::RESOURCE_MEMORY;

/// QoS class of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl std::fmt::Display for QosClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Check if a resource contributes to the QoS class of a pod.
pub fn is_supported_qos_resource(name: &str) -> bool {
    name == RESOURCE_CPU || name == RESOURCE_MEMORY
}

/// Adds the positive, QoS-relevant quantities of `list` to `totals` and
/// returns the names of the resources that contributed.
fn accumulate<'a>(
    totals: &mut HashMap<&'a str, Quantity>,
    list: &'a ResourceList,
) -> Vec<&'a str> {
    let mut found = Vec::new();
    for (name, quantity) in list {
        if !is_supported_qos_resource(name) || !quantity.is_positive() {
            continue;
        }
        found.push(name.as_str());
        totals
            .entry(name.as_str())
            .and_modify(|total| *total = *total + *quantity)
            .or_insert(*quantity);
    }
    found
}

/// Classify a pod by its declared resource requirements.
pub fn pod_qos_class(resources: &PodResourceRequirements) -> QosClass {
    let mut requests: HashMap<&str, Quantity> = HashMap::new();
    let mut limits: HashMap<&str, Quantity> = HashMap::new();
    let mut is_guaranteed = true;

    for container in resources.containers.values() {
        accumulate(&mut requests, &container.requests);

        // every container is aggregated, even once guaranteed is ruled out
        let limits_found = accumulate(&mut limits, &container.limits);
        if !(limits_found.contains(&RESOURCE_CPU) && limits_found.contains(&RESOURCE_MEMORY)) {
            is_guaranteed = false;
        }
    }

    if requests.is_empty() && limits.is_empty() {
        return QosClass::BestEffort;
    }

    if is_guaranteed {
        is_guaranteed = requests
            .iter()
            .all(|(name, request)| limits.get(name) == Some(request));
    }

    if is_guaranteed && requests.len() == limits.len() {
        QosClass::Guaranteed
    } else {
        QosClass::Burstable
    }
}
