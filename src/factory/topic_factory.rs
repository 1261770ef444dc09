//! Topic Factory: registers topics and, on request, a default producer
//! group, consumer group and connector built through the public group and
//! connector factories.

use std::sync::Arc;

use crate::config::FactoryConfig;
use crate::errors::TopologyError;
use crate::factory::connector_factory::ConnectorFactory;
use crate::factory::group_factory::GroupFactory;
use crate::factory::modifications::Modifications;
use crate::factory::specification::{
    ConnectorSpecification, GroupSpecification, Specification, TopicSpecification,
};
use crate::registry::TopicRegistry;
use crate::topology::Topic;

pub const DEFAULT_PRODUCER_GROUP: &str = "default-producer";
pub const DEFAULT_CONSUMER_GROUP: &str = "default-consumer";
pub const DEFAULT_CONNECTOR: &str = "default-connector";

pub struct TopicFactory {
    registry: Arc<TopicRegistry>,
    groups: Arc<GroupFactory>,
    connectors: Arc<ConnectorFactory>,
    config: FactoryConfig,
}

impl TopicFactory {
    pub fn new(
        registry: Arc<TopicRegistry>,
        groups: Arc<GroupFactory>,
        connectors: Arc<ConnectorFactory>,
        config: FactoryConfig,
    ) -> Self {
        Self {
            registry,
            groups,
            connectors,
            config,
        }
    }

    /// Registers the topic, then creates the defaults if requested. A
    /// failure while creating defaults leaves the topic registered.
    pub fn create(&self, specification: &TopicSpecification) -> Result<Arc<Topic>, TopologyError> {
        specification.validate()?;
        let common = specification.common();

        let topic = Topic::new(Arc::clone(self.registry.bus()), common.topic_id.as_str());
        topic.set_description(common.description.clone());
        topic.set_acl(common.acl.clone());
        topic.set_extension_properties(common.hints_as_properties());

        let topic = Arc::new(topic);
        self.registry.register(Arc::clone(&topic))?;
        tracing::info!("[TopicFactory] Created topic '{}'", topic.id());

        if specification.create_defaults {
            self.create_defaults(specification)?;
        }
        Ok(topic)
    }

    pub fn modify(&self, specification: &TopicSpecification) -> Result<Modifications, TopologyError> {
        let common = specification.common();
        let topic = self.registry.get(&common.topic_id)?;
        let mut modifications = Modifications::new();

        if modifications.record("description", topic.description(), &common.description) {
            topic.set_description(common.description.clone());
        }
        if modifications.record("acl", topic.acl(), &common.acl) {
            topic.set_acl(common.acl.clone());
        }
        let properties = common.hints_as_properties();
        if modifications.record("extension_properties", topic.extension_properties(), &properties) {
            topic.set_extension_properties(properties);
        }

        if modifications.has_changes() {
            topic.bus().topics.fire_save_requested(&topic);
            self.registry.mark_modified();
            tracing::info!(
                "[TopicFactory] Modified topic '{}': {} change(s)",
                topic.id(),
                modifications.changed().count()
            );
        }
        Ok(modifications)
    }

    pub fn remove(&self, topic_id: &str) -> Result<Arc<Topic>, TopologyError> {
        self.registry.unregister(topic_id)
    }

    fn create_defaults(&self, specification: &TopicSpecification) -> Result<(), TopologyError> {
        let topic_id = specification.topic_id();
        let protocol = self.config.default_protocol.as_str();

        let producer = GroupSpecification::producer(topic_id, DEFAULT_PRODUCER_GROUP, protocol)
            .with_description("Default Producer Group")
            .with_hint("partitions", self.config.default_partitions as u64);
        let consumer = GroupSpecification::consumer(topic_id, DEFAULT_CONSUMER_GROUP, protocol)
            .with_description("Default Consumer Group")
            .with_hint("partitions", self.config.default_partitions as u64);
        let connector =
            ConnectorSpecification::new(topic_id, DEFAULT_CONNECTOR, DEFAULT_PRODUCER_GROUP, DEFAULT_CONSUMER_GROUP)
                .with_description("Default Connector");

        self.groups.create(&producer)?;
        self.groups.create(&consumer)?;
        self.connectors.create(&connector)?;

        tracing::info!("[TopicFactory] Created default groups and connector for topic '{}'", topic_id);
        Ok(())
    }
}
