//! Connector Factory: resolves both groups on the topic, then hands
//! construction to the first delegate that claims the pair.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::factory::modifications::Modifications;
use crate::factory::specification::{ConnectorSpecification, Specification};
use crate::registry::TopicRegistry;
use crate::topology::{Connector, Group};

pub trait ConnectorFactoryDelegate: Send + Sync {
    fn name(&self) -> &str;

    /// Sees the resolved groups as well, since protocol compatibility is a
    /// property of the pair.
    fn can_handle(&self, specification: &ConnectorSpecification, producer: &Group, consumer: &Group) -> bool;

    fn create(
        &self,
        bus: &Arc<EventBus>,
        specification: &ConnectorSpecification,
        producer: Arc<Group>,
        consumer: Arc<Group>,
    ) -> Result<Connector, TopologyError>;

    fn modify(
        &self,
        connector: &Connector,
        specification: &ConnectorSpecification,
    ) -> Result<Modifications, TopologyError>;
}

pub struct ConnectorFactory {
    registry: Arc<TopicRegistry>,
    delegates: RwLock<Vec<Arc<dyn ConnectorFactoryDelegate>>>,
}

impl ConnectorFactory {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self {
            registry,
            delegates: RwLock::new(Vec::new()),
        }
    }

    pub fn add_delegate(&self, delegate: Arc<dyn ConnectorFactoryDelegate>) {
        tracing::debug!("[ConnectorFactory] Registered delegate '{}'", delegate.name());
        self.delegates.write().push(delegate);
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.read().len()
    }

    fn select(
        &self,
        specification: &ConnectorSpecification,
        producer: &Group,
        consumer: &Group,
    ) -> Result<Arc<dyn ConnectorFactoryDelegate>, TopologyError> {
        self.delegates
            .read()
            .iter()
            .find(|d| d.can_handle(specification, producer, consumer))
            .cloned()
            .ok_or_else(|| TopologyError::NoFactoryAvailable {
                kind: ConnectorSpecification::KIND,
                specification: specification.summary(),
            })
    }

    pub fn create(&self, specification: &ConnectorSpecification) -> Result<Arc<Connector>, TopologyError> {
        specification.validate()?;
        let topic = self.registry.get(specification.topic_id())?;
        let producer = topic.producer_group(&specification.producer_group_id)?;
        let consumer = topic.consumer_group(&specification.consumer_group_id)?;
        let delegate = self.select(specification, &producer, &consumer)?;

        let connector = delegate.create(self.registry.bus(), specification, producer, consumer)?;
        let connector = topic.add_connector(Arc::new(connector))?;
        self.registry.mark_modified();

        tracing::info!(
            "[ConnectorFactory] Created connector '{}' on topic '{}' ({} -> {}) via '{}'",
            connector.id(),
            topic.id(),
            connector.producer_group().id(),
            connector.consumer_group().id(),
            delegate.name()
        );
        Ok(connector)
    }

    pub fn modify(&self, specification: &ConnectorSpecification) -> Result<Modifications, TopologyError> {
        let topic = self.registry.get(specification.topic_id())?;
        let connector = topic.connector(&specification.connector_id)?;
        let delegate = self.select(specification, connector.producer_group(), connector.consumer_group())?;

        let modifications = delegate.modify(&connector, specification)?;
        if modifications.has_changes() {
            topic.bus().connectors.fire_save_requested(&connector);
            self.registry.mark_modified();
            tracing::info!(
                "[ConnectorFactory] Modified connector '{}' on topic '{}': {} change(s)",
                connector.id(),
                topic.id(),
                modifications.changed().count()
            );
        }
        Ok(modifications)
    }

    pub fn remove(&self, topic_id: &str, connector_id: &str) -> Result<Arc<Connector>, TopologyError> {
        let topic = self.registry.get(topic_id)?;
        let connector = topic.remove_connector(connector_id)?;
        self.registry.mark_modified();
        Ok(connector)
    }
}
