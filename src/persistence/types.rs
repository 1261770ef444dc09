use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::PersistenceError;
use crate::persistence::Persistable;
use crate::topology::{AccessControlList, Direction, Properties, Topic};

// ==========================================
// RECORD KEYS
// ==========================================

/// Ids are only unique within their parent, so records are keyed by path.
/// Segments are escaped, so an id containing `/` cannot collide with a
/// deeper path.
pub mod keys {
    use crate::utils::join_segments;

    const SEPARATOR: char = '/';

    pub fn topic(topic_id: &str) -> String {
        topic_id.to_string()
    }

    pub fn group(topic_id: &str, group_id: &str) -> String {
        join_segments(&[topic_id, group_id], SEPARATOR)
    }

    pub fn connector(topic_id: &str, connector_id: &str) -> String {
        join_segments(&[topic_id, connector_id], SEPARATOR)
    }

    pub fn partition(topic_id: &str, group_id: &str, partition_id: &str) -> String {
        join_segments(&[topic_id, group_id, partition_id], SEPARATOR)
    }
}

/// A dehydrated state that can be stored by a persister.
pub trait StateRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn record_key(&self) -> String;
}

// ==========================================
// DEHYDRATED STATES
// ==========================================

/// Fields shared by every dehydrated entity. `kind` selects the constructor
/// used on hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHeader {
    pub kind: String,
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub extension_properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DehydratedTopic {
    #[serde(flatten)]
    pub header: StateHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<AccessControlList>,
    #[serde(default)]
    pub producer_group_ids: BTreeSet<String>,
    #[serde(default)]
    pub consumer_group_ids: BTreeSet<String>,
    #[serde(default)]
    pub connector_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DehydratedGroup {
    #[serde(flatten)]
    pub header: StateHeader,
    pub group_id: String,
    pub direction: Direction,
    #[serde(default)]
    pub partition_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DehydratedPartition {
    #[serde(flatten)]
    pub header: StateHeader,
    pub group_id: String,
    pub partition_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DehydratedConnector {
    #[serde(flatten)]
    pub header: StateHeader,
    pub connector_id: String,
    pub producer_group_id: String,
    pub consumer_group_id: String,
}

impl StateRecord for DehydratedTopic {
    const KIND: &'static str = "topic";

    fn record_key(&self) -> String {
        keys::topic(&self.header.topic_id)
    }
}

impl StateRecord for DehydratedGroup {
    const KIND: &'static str = "group";

    fn record_key(&self) -> String {
        keys::group(&self.header.topic_id, &self.group_id)
    }
}

impl StateRecord for DehydratedPartition {
    const KIND: &'static str = "partition";

    fn record_key(&self) -> String {
        keys::partition(&self.header.topic_id, &self.group_id, &self.partition_id)
    }
}

impl StateRecord for DehydratedConnector {
    const KIND: &'static str = "connector";

    fn record_key(&self) -> String {
        keys::connector(&self.header.topic_id, &self.connector_id)
    }
}

// ==========================================
// STATE SOURCES
// ==========================================

/// Where hydration reads child states from.
pub trait StateSource {
    fn topic(&self, topic_id: &str) -> Result<DehydratedTopic, PersistenceError>;

    fn group(&self, topic_id: &str, group_id: &str) -> Result<DehydratedGroup, PersistenceError>;

    fn partition(
        &self,
        topic_id: &str,
        group_id: &str,
        partition_id: &str,
    ) -> Result<DehydratedPartition, PersistenceError>;

    fn connector(&self, topic_id: &str, connector_id: &str) -> Result<DehydratedConnector, PersistenceError>;
}

// ==========================================
// TOPIC TREE
// ==========================================

/// A topic together with every descendant state. Used for snapshot payloads
/// and for full value comparison. Children are sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTree {
    pub topic: DehydratedTopic,
    #[serde(default)]
    pub groups: Vec<GroupTree>,
    #[serde(default)]
    pub connectors: Vec<DehydratedConnector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTree {
    pub group: DehydratedGroup,
    #[serde(default)]
    pub partitions: Vec<DehydratedPartition>,
}

impl TopicTree {
    pub fn capture(topic: &Topic) -> Self {
        let groups = topic
            .producer_groups()
            .into_iter()
            .chain(topic.consumer_groups())
            .map(|group| GroupTree {
                group: group.dehydrate(),
                partitions: group.partitions().iter().map(|p| p.dehydrate()).collect(),
            })
            .collect();

        Self {
            topic: topic.dehydrate(),
            groups,
            connectors: topic.connectors().iter().map(|c| c.dehydrate()).collect(),
        }
    }

    pub fn topic_id(&self) -> &str {
        &self.topic.header.topic_id
    }

    fn not_found(kind: &'static str, id: String) -> PersistenceError {
        PersistenceError::NotFound { kind, id }
    }
}

impl StateSource for TopicTree {
    fn topic(&self, topic_id: &str) -> Result<DehydratedTopic, PersistenceError> {
        if self.topic_id() == topic_id {
            Ok(self.topic.clone())
        } else {
            Err(Self::not_found("topic", keys::topic(topic_id)))
        }
    }

    fn group(&self, topic_id: &str, group_id: &str) -> Result<DehydratedGroup, PersistenceError> {
        self.groups
            .iter()
            .map(|tree| &tree.group)
            .find(|g| g.header.topic_id == topic_id && g.group_id == group_id)
            .cloned()
            .ok_or_else(|| Self::not_found("group", keys::group(topic_id, group_id)))
    }

    fn partition(
        &self,
        topic_id: &str,
        group_id: &str,
        partition_id: &str,
    ) -> Result<DehydratedPartition, PersistenceError> {
        self.groups
            .iter()
            .flat_map(|tree| tree.partitions.iter())
            .find(|p| {
                p.header.topic_id == topic_id && p.group_id == group_id && p.partition_id == partition_id
            })
            .cloned()
            .ok_or_else(|| Self::not_found("partition", keys::partition(topic_id, group_id, partition_id)))
    }

    fn connector(&self, topic_id: &str, connector_id: &str) -> Result<DehydratedConnector, PersistenceError> {
        self.connectors
            .iter()
            .find(|c| c.header.topic_id == topic_id && c.connector_id == connector_id)
            .cloned()
            .ok_or_else(|| Self::not_found("connector", keys::connector(topic_id, connector_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(topic_id: &str, kind: &str) -> StateHeader {
        StateHeader {
            kind: kind.to_string(),
            topic_id: topic_id.to_string(),
            description: None,
            extension_properties: Properties::new(),
        }
    }

    #[test]
    fn record_keys_are_scoped_by_parent() {
        let partition = DehydratedPartition {
            header: header("orders", "local"),
            group_id: "g1".into(),
            partition_id: "p0".into(),
        };
        assert_eq!(partition.record_key(), "orders/g1/p0");

        let group = DehydratedGroup {
            header: header("orders", "local"),
            group_id: "g1".into(),
            direction: Direction::Consumer,
            partition_ids: BTreeSet::new(),
        };
        assert_eq!(group.record_key(), "orders/g1");
    }

    #[test]
    fn nested_looking_ids_keep_distinct_keys() {
        assert_eq!(keys::group("orders", "eu/in"), "orders/eu%2Fin");
        assert_ne!(keys::group("orders", "eu/in"), keys::group("orders/eu", "in"));
        assert_ne!(
            keys::partition("orders", "eu/in", "p0"),
            keys::partition("orders/eu", "in", "p0")
        );
        // Topic records live in their own table and keep the bare id.
        assert_eq!(keys::topic("orders/eu"), "orders/eu");
    }

    #[test]
    fn header_is_flattened_on_the_wire() {
        let topic = DehydratedTopic {
            header: header("orders", "basic"),
            acl: None,
            producer_group_ids: BTreeSet::from(["g1".to_string()]),
            consumer_group_ids: BTreeSet::new(),
            connector_ids: BTreeSet::new(),
        };
        let value = serde_json::to_value(&topic).unwrap();
        assert_eq!(value["kind"], "basic");
        assert_eq!(value["topic_id"], "orders");
        assert_eq!(value["producer_group_ids"][0], "g1");

        let back: DehydratedTopic = serde_json::from_value(value).unwrap();
        assert_eq!(back, topic);
    }
}
