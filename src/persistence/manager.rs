use std::path::Path;
use std::sync::Arc;

use crate::errors::PersistenceError;
use crate::persistence::persister::{MemoryPersister, StatePersister};
use crate::persistence::sqlite::SqliteStore;
use crate::persistence::types::{
    keys, DehydratedConnector, DehydratedGroup, DehydratedPartition, DehydratedTopic, StateSource,
    TopicTree,
};
use crate::persistence::Persistable;
use crate::topology::Topic;

/// The four per-kind persisters of one deployment.
pub struct PersistenceManager {
    pub topics: Arc<dyn StatePersister<DehydratedTopic>>,
    pub groups: Arc<dyn StatePersister<DehydratedGroup>>,
    pub partitions: Arc<dyn StatePersister<DehydratedPartition>>,
    pub connectors: Arc<dyn StatePersister<DehydratedConnector>>,
}

impl PersistenceManager {
    pub fn in_memory() -> Self {
        Self {
            topics: Arc::new(MemoryPersister::new()),
            groups: Arc::new(MemoryPersister::new()),
            partitions: Arc::new(MemoryPersister::new()),
            connectors: Arc::new(MemoryPersister::new()),
        }
    }

    pub fn sqlite(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        Ok(Self::from_sqlite(&SqliteStore::open(path)?))
    }

    pub fn from_sqlite(store: &SqliteStore) -> Self {
        Self {
            topics: Arc::new(store.persister::<DehydratedTopic>()),
            groups: Arc::new(store.persister::<DehydratedGroup>()),
            partitions: Arc::new(store.persister::<DehydratedPartition>()),
            connectors: Arc::new(store.persister::<DehydratedConnector>()),
        }
    }

    pub fn topic_ids(&self) -> Result<Vec<String>, PersistenceError> {
        self.topics.all_ids()
    }

    /// Saves the topic and every descendant it currently holds.
    pub fn save_tree(&self, topic: &Topic) -> Result<(), PersistenceError> {
        let TopicTree { topic: state, groups, connectors } = TopicTree::capture(topic);
        for tree in &groups {
            for partition in &tree.partitions {
                self.partitions.save(partition)?;
            }
            self.groups.save(&tree.group)?;
        }
        for connector in &connectors {
            self.connectors.save(connector)?;
        }
        self.topics.save(&state)
    }

    /// Re-saves only the topic's own record.
    pub fn save_topic(&self, topic: &Topic) -> Result<(), PersistenceError> {
        self.topics.save(&topic.dehydrate())
    }
}

impl StateSource for PersistenceManager {
    fn topic(&self, topic_id: &str) -> Result<DehydratedTopic, PersistenceError> {
        self.topics.get(&keys::topic(topic_id))
    }

    fn group(&self, topic_id: &str, group_id: &str) -> Result<DehydratedGroup, PersistenceError> {
        self.groups.get(&keys::group(topic_id, group_id))
    }

    fn partition(
        &self,
        topic_id: &str,
        group_id: &str,
        partition_id: &str,
    ) -> Result<DehydratedPartition, PersistenceError> {
        self.partitions.get(&keys::partition(topic_id, group_id, partition_id))
    }

    fn connector(&self, topic_id: &str, connector_id: &str) -> Result<DehydratedConnector, PersistenceError> {
        self.connectors.get(&keys::connector(topic_id, connector_id))
    }
}
