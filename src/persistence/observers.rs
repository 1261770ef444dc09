//! Persistence observers: keep the persisters in step with lifecycle events.
//!
//! Entities never see a store. Saves happen on `on_added`/`save_requested`,
//! deletes on `on_removed`. The topic record itself is owned by the registry;
//! the topic observer only refreshes records the registry already wrote.

use std::sync::Arc;

use crate::errors::PersistenceError;
use crate::events::{EventBus, LifecycleListener, ListenerId};
use crate::persistence::types::keys;
use crate::persistence::{PersistenceManager, Persistable};
use crate::topology::{Connector, Group, Partition, Topic};

fn tolerate_missing(result: Result<(), PersistenceError>, what: &str) -> anyhow::Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            tracing::debug!("[Persistence] {} already gone", what);
            Ok(())
        }
        other => Ok(other?),
    }
}

// ==========================================
// TOPIC
// ==========================================

pub struct TopicPersistenceObserver {
    persistence: Arc<PersistenceManager>,
}

impl LifecycleListener<Topic> for TopicPersistenceObserver {
    fn save_requested(&self, topic: &Topic) -> anyhow::Result<()> {
        // Unregistered topics (snapshot copies, topics being torn down) have no record.
        if !self.persistence.topics.exists(&keys::topic(topic.id()))? {
            return Ok(());
        }
        self.persistence.save_topic(topic)?;
        topic.bus().topics.fire_saved(topic);
        Ok(())
    }
}

// ==========================================
// GROUP
// ==========================================

pub struct GroupPersistenceObserver {
    persistence: Arc<PersistenceManager>,
}

impl GroupPersistenceObserver {
    fn save(&self, group: &Group) -> anyhow::Result<()> {
        self.persistence.groups.save(&group.dehydrate())?;
        group.bus().groups.fire_saved(group);
        Ok(())
    }
}

impl LifecycleListener<Group> for GroupPersistenceObserver {
    fn on_added(&self, group: &Group) -> anyhow::Result<()> {
        // Cascades to the partitions the group arrived with.
        group.save();
        Ok(())
    }

    fn on_removed(&self, group: &Group) -> anyhow::Result<()> {
        let key = keys::group(group.topic_id(), group.id());
        tolerate_missing(self.persistence.groups.remove(&key), &key)
    }

    fn save_requested(&self, group: &Group) -> anyhow::Result<()> {
        self.save(group)
    }
}

// ==========================================
// PARTITION
// ==========================================

pub struct PartitionPersistenceObserver {
    persistence: Arc<PersistenceManager>,
}

impl PartitionPersistenceObserver {
    fn save(&self, partition: &Partition) -> anyhow::Result<()> {
        self.persistence.partitions.save(&partition.dehydrate())?;
        partition.bus().partitions.fire_saved(partition);
        Ok(())
    }
}

impl LifecycleListener<Partition> for PartitionPersistenceObserver {
    fn on_added(&self, partition: &Partition) -> anyhow::Result<()> {
        self.save(partition)
    }

    fn on_removed(&self, partition: &Partition) -> anyhow::Result<()> {
        let key = keys::partition(partition.topic_id(), partition.group_id(), partition.id());
        tolerate_missing(self.persistence.partitions.remove(&key), &key)
    }

    fn save_requested(&self, partition: &Partition) -> anyhow::Result<()> {
        self.save(partition)
    }
}

// ==========================================
// CONNECTOR
// ==========================================

pub struct ConnectorPersistenceObserver {
    persistence: Arc<PersistenceManager>,
}

impl ConnectorPersistenceObserver {
    fn save(&self, connector: &Connector) -> anyhow::Result<()> {
        self.persistence.connectors.save(&connector.dehydrate())?;
        connector.bus().connectors.fire_saved(connector);
        Ok(())
    }
}

impl LifecycleListener<Connector> for ConnectorPersistenceObserver {
    fn on_added(&self, connector: &Connector) -> anyhow::Result<()> {
        self.save(connector)
    }

    fn on_removed(&self, connector: &Connector) -> anyhow::Result<()> {
        let key = keys::connector(connector.topic_id(), connector.id());
        tolerate_missing(self.persistence.connectors.remove(&key), &key)
    }

    fn save_requested(&self, connector: &Connector) -> anyhow::Result<()> {
        self.save(connector)
    }
}

// ==========================================
// INSTALLATION
// ==========================================

/// Subscriptions created by `install`, kept so they can be withdrawn.
pub struct PersistenceObservers {
    bus: Arc<EventBus>,
    topic: ListenerId,
    group: ListenerId,
    partition: ListenerId,
    connector: ListenerId,
}

impl PersistenceObservers {
    pub fn install(bus: &Arc<EventBus>, persistence: &Arc<PersistenceManager>) -> Self {
        let topic = bus.topics.add_listener(Arc::new(TopicPersistenceObserver {
            persistence: Arc::clone(persistence),
        }));
        let group = bus.groups.add_listener(Arc::new(GroupPersistenceObserver {
            persistence: Arc::clone(persistence),
        }));
        let partition = bus.partitions.add_listener(Arc::new(PartitionPersistenceObserver {
            persistence: Arc::clone(persistence),
        }));
        let connector = bus.connectors.add_listener(Arc::new(ConnectorPersistenceObserver {
            persistence: Arc::clone(persistence),
        }));

        tracing::debug!("[Persistence] Observers installed");
        Self {
            bus: Arc::clone(bus),
            topic,
            group,
            partition,
            connector,
        }
    }

    pub fn uninstall(self) {
        self.bus.topics.remove_listener(self.topic);
        self.bus.groups.remove_listener(self.group);
        self.bus.partitions.remove_listener(self.partition);
        self.bus.connectors.remove_listener(self.connector);
    }
}
