use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::topology::Partition;

/// What a client needs routed. `properties` are interpreted by group drivers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequirements {
    pub topic_id: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl RouteRequirements {
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            ..Self::default()
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct GroupRoute {
    pub group_id: String,
    pub partitions: Vec<Arc<Partition>>,
}

/// Partitions selected per group. Groups with nothing applicable are omitted.
#[derive(Debug, Clone, Default)]
pub struct RouteFilterResults {
    pub producers: Vec<GroupRoute>,
    pub consumers: Vec<GroupRoute>,
}

impl RouteFilterResults {
    pub fn is_empty(&self) -> bool {
        self.producers.is_empty() && self.consumers.is_empty()
    }

    pub fn partition_count(&self) -> usize {
        self.producers
            .iter()
            .chain(self.consumers.iter())
            .map(|route| route.partitions.len())
            .sum()
    }
}
