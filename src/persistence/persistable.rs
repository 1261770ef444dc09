use crate::errors::TopologyError;
use crate::persistence::types::{
    DehydratedConnector, DehydratedGroup, DehydratedPartition, DehydratedTopic, StateHeader,
    StateRecord,
};
use crate::topology::{Connector, Direction, Group, Partition, Topic};

/// Capability of entities that can be dehydrated and restored.
///
/// `restore` covers scalars and extension properties only. Children are
/// reattached by the hydrator.
pub trait Persistable {
    type State;

    fn dehydrate(&self) -> Self::State;

    fn restore(&self, state: &Self::State) -> Result<(), TopologyError>;
}

fn ensure_same(entity: &'static str, expected: &str, found: &str) -> Result<(), TopologyError> {
    if expected != found {
        return Err(TopologyError::StateMismatch {
            entity,
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

impl Persistable for Topic {
    type State = DehydratedTopic;

    fn dehydrate(&self) -> DehydratedTopic {
        DehydratedTopic {
            header: StateHeader {
                kind: self.kind().to_string(),
                topic_id: self.id().to_string(),
                description: self.description(),
                extension_properties: self.extension_properties(),
            },
            acl: self.acl(),
            producer_group_ids: self.group_ids(Direction::Producer),
            consumer_group_ids: self.group_ids(Direction::Consumer),
            connector_ids: self.connector_ids(),
        }
    }

    fn restore(&self, state: &DehydratedTopic) -> Result<(), TopologyError> {
        ensure_same("topic", self.id(), &state.header.topic_id)?;
        self.set_description(state.header.description.clone());
        self.set_acl(state.acl.clone());
        self.set_extension_properties(state.header.extension_properties.clone());
        Ok(())
    }
}

impl Persistable for Group {
    type State = DehydratedGroup;

    fn dehydrate(&self) -> DehydratedGroup {
        DehydratedGroup {
            header: StateHeader {
                kind: self.kind().to_string(),
                topic_id: self.topic_id().to_string(),
                description: self.description(),
                extension_properties: self.extension_properties(),
            },
            group_id: self.id().to_string(),
            direction: self.direction(),
            partition_ids: self.partition_ids(),
        }
    }

    fn restore(&self, state: &DehydratedGroup) -> Result<(), TopologyError> {
        ensure_same("group", self.topic_id(), &state.header.topic_id)?;
        ensure_same("group", self.id(), &state.group_id)?;
        if self.direction() != state.direction {
            return Err(TopologyError::StateMismatch {
                entity: "group",
                expected: self.direction().to_string(),
                found: state.direction.to_string(),
            });
        }
        self.set_description(state.header.description.clone());
        Ok(())
    }
}

impl Persistable for Partition {
    type State = DehydratedPartition;

    fn dehydrate(&self) -> DehydratedPartition {
        DehydratedPartition {
            header: StateHeader {
                kind: self.kind().to_string(),
                topic_id: self.topic_id().to_string(),
                description: self.description(),
                extension_properties: self.extension_properties(),
            },
            group_id: self.group_id().to_string(),
            partition_id: self.id().to_string(),
        }
    }

    fn restore(&self, state: &DehydratedPartition) -> Result<(), TopologyError> {
        ensure_same("partition", &self.dehydrate().record_key(), &state.record_key())?;
        self.set_description(state.header.description.clone());
        Ok(())
    }
}

impl Persistable for Connector {
    type State = DehydratedConnector;

    fn dehydrate(&self) -> DehydratedConnector {
        DehydratedConnector {
            header: StateHeader {
                kind: self.kind().to_string(),
                topic_id: self.topic_id().to_string(),
                description: self.description(),
                extension_properties: self.extension_properties(),
            },
            connector_id: self.id().to_string(),
            producer_group_id: self.producer_group().id().to_string(),
            consumer_group_id: self.consumer_group().id().to_string(),
        }
    }

    fn restore(&self, state: &DehydratedConnector) -> Result<(), TopologyError> {
        ensure_same("connector", self.topic_id(), &state.header.topic_id)?;
        ensure_same("connector", self.id(), &state.connector_id)?;
        ensure_same("connector", self.producer_group().id(), &state.producer_group_id)?;
        ensure_same("connector", self.consumer_group().id(), &state.consumer_group_id)?;
        self.set_description(state.header.description.clone());
        Ok(())
    }
}
