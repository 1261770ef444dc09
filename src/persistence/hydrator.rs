//! Hydration: rebuild a live topic graph from dehydrated states.
//!
//! Children are attached without `setup()` and without events: hydration is
//! reconstruction, not provisioning. Connectors bind to the group objects
//! already hydrated on the same topic, so shared children keep one identity.

use std::sync::Arc;

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::persistence::catalog::DriverCatalog;
use crate::persistence::types::{
    DehydratedConnector, DehydratedGroup, DehydratedTopic, StateSource, TopicTree,
};
use crate::persistence::Persistable;
use crate::topology::{Connector, Direction, Group, Partition, PartitionKey, Topic};

pub struct Hydrator {
    bus: Arc<EventBus>,
    catalog: Arc<DriverCatalog>,
}

impl Hydrator {
    pub fn new(bus: Arc<EventBus>, catalog: Arc<DriverCatalog>) -> Self {
        Self { bus, catalog }
    }

    pub fn catalog(&self) -> &Arc<DriverCatalog> {
        &self.catalog
    }

    pub fn hydrate_topic(&self, topic_id: &str, source: &dyn StateSource) -> Result<Arc<Topic>, TopologyError> {
        let state = source.topic(topic_id)?;
        self.hydrate_topic_state(&state, source)
    }

    pub fn hydrate_tree(&self, tree: &TopicTree) -> Result<Arc<Topic>, TopologyError> {
        self.hydrate_topic_state(&tree.topic, tree)
    }

    pub fn hydrate_topic_state(
        &self,
        state: &DehydratedTopic,
        source: &dyn StateSource,
    ) -> Result<Arc<Topic>, TopologyError> {
        if state.header.kind != Topic::KIND {
            return Err(TopologyError::UnknownEntityKind {
                entity: "topic",
                kind: state.header.kind.clone(),
            });
        }

        let topic_id = state.header.topic_id.as_str();
        let topic = Topic::new(Arc::clone(&self.bus), topic_id);
        topic.restore(state)?;

        let listed = state
            .producer_group_ids
            .iter()
            .map(|id| (id, Direction::Producer))
            .chain(state.consumer_group_ids.iter().map(|id| (id, Direction::Consumer)));

        for (group_id, direction) in listed {
            let group_state = source.group(topic_id, group_id)?;
            if group_state.direction != direction {
                return Err(TopologyError::StateMismatch {
                    entity: "group",
                    expected: direction.to_string(),
                    found: group_state.direction.to_string(),
                });
            }
            let group = self.hydrate_group(&group_state, source)?;
            topic.attach_group(group)?;
        }

        for connector_id in &state.connector_ids {
            let connector_state = source.connector(topic_id, connector_id)?;
            let connector = self.hydrate_connector(&connector_state, &topic)?;
            topic.attach_connector(connector)?;
        }

        tracing::debug!("[Hydrator] Rebuilt topic '{}'", topic_id);
        Ok(Arc::new(topic))
    }

    pub fn hydrate_group(
        &self,
        state: &DehydratedGroup,
        source: &dyn StateSource,
    ) -> Result<Arc<Group>, TopologyError> {
        let driver = self
            .catalog
            .group_driver(&state.header.kind, &state.header.extension_properties)?;
        let group = Group::new(
            Arc::clone(&self.bus),
            state.header.topic_id.as_str(),
            state.group_id.as_str(),
            state.direction,
            driver,
        );
        group.restore(state)?;

        for partition_id in &state.partition_ids {
            let partition_state = source.partition(&state.header.topic_id, &state.group_id, partition_id)?;
            let driver = self
                .catalog
                .partition_driver(&partition_state.header.kind, &partition_state.header.extension_properties)?;
            let key = PartitionKey::new(
                partition_state.header.topic_id.as_str(),
                partition_state.group_id.as_str(),
                partition_state.partition_id.as_str(),
            );
            let partition = Partition::new(Arc::clone(&self.bus), key, driver);
            partition.restore(&partition_state)?;
            group.attach_partition(Arc::new(partition))?;
        }

        Ok(Arc::new(group))
    }

    /// Binds to the topic's already hydrated groups.
    pub fn hydrate_connector(
        &self,
        state: &DehydratedConnector,
        topic: &Topic,
    ) -> Result<Arc<Connector>, TopologyError> {
        let producer = topic.producer_group(&state.producer_group_id)?;
        let consumer = topic.consumer_group(&state.consumer_group_id)?;
        let driver = self
            .catalog
            .connector_driver(&state.header.kind, &state.header.extension_properties)?;

        let connector = Connector::new(
            Arc::clone(&self.bus),
            state.header.topic_id.as_str(),
            state.connector_id.as_str(),
            producer,
            consumer,
            driver,
        )?;
        connector.restore(state)?;
        Ok(Arc::new(connector))
    }
}
