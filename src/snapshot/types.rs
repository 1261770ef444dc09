use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persistence::TopicTree;
use crate::topology::Topic;
use crate::utils::current_time_ms;

/// Immutable, timestamped capture of the registry's topics. Topics are held
/// by reference.
#[derive(Debug, Clone)]
pub struct Snapshot {
    id: String,
    description: Option<String>,
    timestamp: i64,
    topics: Vec<Arc<Topic>>,
}

impl Snapshot {
    /// New snapshot with a fresh id and the current time.
    pub fn capture(description: Option<String>, topics: Vec<Arc<Topic>>) -> Self {
        Self::from_parts(Uuid::new_v4().to_string(), description, current_time_ms(), topics)
    }

    pub fn from_parts(
        id: impl Into<String>,
        description: Option<String>,
        timestamp: i64,
        mut topics: Vec<Arc<Topic>>,
    ) -> Self {
        topics.sort_by(|a, b| a.id().cmp(b.id()));
        Self {
            id: id.into(),
            description,
            timestamp,
            topics,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn topics(&self) -> &[Arc<Topic>] {
        &self.topics
    }

    pub fn topic(&self, topic_id: &str) -> Option<&Arc<Topic>> {
        self.topics.iter().find(|t| t.id() == topic_id)
    }

    pub fn descriptor(&self) -> SnapshotDescriptor {
        SnapshotDescriptor {
            id: self.id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Serializable form of the snapshot.
    pub fn document(&self) -> SnapshotDocument {
        SnapshotDocument {
            id: self.id.clone(),
            description: self.description.clone(),
            timestamp: self.timestamp,
            topics: self.topics.iter().map(|t| t.tree()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub topics: Vec<TopicTree>,
}

/// Id and timestamp recovered from a record's name, without reading it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotDescriptor {
    pub id: String,
    pub timestamp: i64,
}
