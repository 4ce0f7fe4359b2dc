//! Per-container resource requirements injected by the admission webhook.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use super::quantity::Quantity;

/// Resource name for CPU.
pub const RESOURCE_CPU: &str = "cpu";
/// Resource name for memory.
pub const RESOURCE_MEMORY: &str = "memory";

/// Resource name to quantity mapping.
pub type ResourceList = BTreeMap<String, Quantity>;

/// Requests and limits of a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    #[serde(rename = "Requests", alias = "requests")]
    pub requests: ResourceList,
    #[serde(rename = "Limits", alias = "limits")]
    pub limits: ResourceList,
}

/// Resource requirements of all containers of a pod, keyed by container.
///
/// Decoded as a whole from the webhook annotation; a pod either has a complete
/// model or none at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodResourceRequirements {
    #[serde(rename = "Containers", alias = "containers")]
    pub containers: BTreeMap<String, ResourceRequirements>,
    #[serde(
        rename = "InitContainers",
        alias = "initContainers",
        deserialize_with = "deserialize_membership_set",
        serialize_with = "serialize_membership_set"
    )]
    pub init_containers: BTreeSet<String>,
}

impl PodResourceRequirements {
    /// Requirements declared for a container, looked up by any of the given keys.
    pub fn container<'a, I>(&self, keys: I) -> Option<&ResourceRequirements>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter().find_map(|key| self.containers.get(key))
    }

    pub fn is_init_container<'a, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .any(|key| self.init_containers.contains(key))
    }

    pub fn is_regular_container<'a, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter().any(|key| self.containers.contains_key(key))
    }
}

/// The init container set is a JSON object used as a set; only keys count.
fn deserialize_membership_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let members = Option::<BTreeMap<String, IgnoredAny>>::deserialize(deserializer)?;
    Ok(members.unwrap_or_default().into_keys().collect())
}

fn serialize_membership_set<S>(set: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(set.iter().map(|id| (id, true)))
}
