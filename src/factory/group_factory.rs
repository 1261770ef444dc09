//! Group Factory: hands construction to the first delegate that claims the
//! specification, then attaches the result to its topic.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::factory::modifications::Modifications;
use crate::factory::specification::{GroupSpecification, Specification};
use crate::registry::TopicRegistry;
use crate::topology::{Direction, Group, Topic};

pub trait GroupFactoryDelegate: Send + Sync {
    fn name(&self) -> &str;

    fn can_handle(&self, specification: &GroupSpecification) -> bool;

    /// Builds the group with its initial partitions attached but not provisioned.
    fn create(&self, bus: &Arc<EventBus>, specification: &GroupSpecification) -> Result<Group, TopologyError>;

    /// Applies the differences between the group and the specification.
    fn modify(&self, group: &Group, specification: &GroupSpecification) -> Result<Modifications, TopologyError>;
}

pub struct GroupFactory {
    registry: Arc<TopicRegistry>,
    delegates: RwLock<Vec<Arc<dyn GroupFactoryDelegate>>>,
}

impl GroupFactory {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self {
            registry,
            delegates: RwLock::new(Vec::new()),
        }
    }

    /// Delegates are consulted in registration order.
    pub fn add_delegate(&self, delegate: Arc<dyn GroupFactoryDelegate>) {
        tracing::debug!("[GroupFactory] Registered delegate '{}'", delegate.name());
        self.delegates.write().push(delegate);
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.read().len()
    }

    fn select(&self, specification: &GroupSpecification) -> Result<Arc<dyn GroupFactoryDelegate>, TopologyError> {
        self.delegates
            .read()
            .iter()
            .find(|d| d.can_handle(specification))
            .cloned()
            .ok_or_else(|| TopologyError::NoFactoryAvailable {
                kind: GroupSpecification::KIND,
                specification: specification.summary(),
            })
    }

    pub fn create(&self, specification: &GroupSpecification) -> Result<Arc<Group>, TopologyError> {
        specification.validate()?;
        let topic = self.registry.get(specification.topic_id())?;
        let delegate = self.select(specification)?;

        let group = delegate.create(self.registry.bus(), specification)?;
        let group = topic.add_group(Arc::new(group))?;
        self.registry.mark_modified();

        tracing::info!(
            "[GroupFactory] Created {} group '{}' on topic '{}' via '{}'",
            group.direction(),
            group.id(),
            topic.id(),
            delegate.name()
        );
        Ok(group)
    }

    /// Connectors referencing the group are re-linked whenever its
    /// partition set changed, even if the delegate then failed.
    pub fn modify(&self, specification: &GroupSpecification) -> Result<Modifications, TopologyError> {
        let topic = self.registry.get(specification.topic_id())?;
        let group = topic.group(specification.direction, &specification.group_id)?;
        let delegate = self.select(specification)?;

        let partitions_before = group.partition_ids();
        let outcome = delegate.modify(&group, specification);
        let relinked = if group.partition_ids() != partitions_before {
            self.relink(&topic, &group)
        } else {
            Ok(())
        };

        let modifications = outcome?;
        if modifications.has_changes() {
            group.save();
            self.registry.mark_modified();
            tracing::info!(
                "[GroupFactory] Modified group '{}' on topic '{}': {} change(s)",
                group.id(),
                topic.id(),
                modifications.changed().count()
            );
        }
        relinked?;
        Ok(modifications)
    }

    /// Activates every connector of the topic that references the group.
    /// Reports the first failure after trying them all.
    fn relink(&self, topic: &Topic, group: &Group) -> Result<(), TopologyError> {
        let mut first_failure = None;
        for connector in topic.connectors().into_iter().filter(|c| c.references(group.id())) {
            match connector.activate() {
                Ok(()) => tracing::debug!(
                    "[GroupFactory] Re-linked connector '{}' after group '{}' changed ({})",
                    connector.id(),
                    group.id(),
                    connector.state()
                ),
                Err(e) => {
                    tracing::warn!("[GroupFactory] Re-linking connector '{}' failed: {}", connector.id(), e);
                    first_failure.get_or_insert(e);
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    pub fn remove(&self, topic_id: &str, direction: Direction, group_id: &str) -> Result<Arc<Group>, TopologyError> {
        let topic = self.registry.get(topic_id)?;
        let group = topic.remove_group(direction, group_id)?;
        self.registry.mark_modified();
        Ok(group)
    }
}
