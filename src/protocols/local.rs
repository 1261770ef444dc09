//! In-process protocol: exchanges and bindings held in memory.
//!
//! Each partition owns one exchange named `<topic>.<group>.<n>`. A connector
//! binds every producer exchange to every consumer exchange.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::factory::{
    ConnectorFactoryDelegate, ConnectorSpecification, GroupFactoryDelegate, GroupSpecification, Modifications,
};
use crate::persistence::DriverCatalog;
use crate::topology::{
    Connector, ConnectorDriver, Group, GroupDriver, LinkReport, Partition, PartitionDriver, PartitionKey,
    PartitionState, Properties, RouteRequirements,
};
use crate::utils::join_segments;

pub const LOCAL_PROTOCOL: &str = "local";

/// Partition property holding the exchange name.
pub const EXCHANGE_PROPERTY: &str = "exchange";
/// Route requirement narrowing a filter to one partition id.
pub const PARTITION_REQUIREMENT: &str = "partition";
/// Group hint setting the partition count.
pub const PARTITIONS_HINT: &str = "partitions";

// ==========================================
// TRANSPORT
// ==========================================

/// Exchange name -> names of the exchanges it is bound to.
#[derive(Debug, Default)]
pub struct LocalTransport {
    exchanges: DashMap<String, BTreeSet<String>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Idempotent. Returns false when the exchange already existed.
    pub fn declare(&self, exchange: &str) -> bool {
        match self.exchanges.entry(exchange.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(BTreeSet::new());
                true
            }
        }
    }

    /// Drops the exchange and every binding pointing at it.
    pub fn delete(&self, exchange: &str) -> bool {
        let existed = self.exchanges.remove(exchange).is_some();
        for mut entry in self.exchanges.iter_mut() {
            entry.value_mut().remove(exchange);
        }
        existed
    }

    pub fn exists(&self, exchange: &str) -> bool {
        self.exchanges.contains_key(exchange)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    pub fn bind(&self, source: &str, destination: &str) -> anyhow::Result<()> {
        if !self.exists(destination) {
            bail!("exchange '{}' is not declared", destination);
        }
        match self.exchanges.get_mut(source) {
            Some(mut bindings) => {
                bindings.insert(destination.to_string());
                Ok(())
            }
            None => bail!("exchange '{}' is not declared", source),
        }
    }

    pub fn unbind(&self, source: &str, destination: &str) -> bool {
        self.exchanges
            .get_mut(source)
            .map_or(false, |mut bindings| bindings.remove(destination))
    }

    pub fn is_bound(&self, source: &str, destination: &str) -> bool {
        self.exists(destination)
            && self
                .exchanges
                .get(source)
                .map_or(false, |bindings| bindings.contains(destination))
    }

    pub fn bindings(&self, source: &str) -> Vec<String> {
        self.exchanges
            .get(source)
            .map(|bindings| bindings.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Dots inside ids are escaped so no two partitions share an exchange.
pub fn exchange_name(topic_id: &str, group_id: &str, index: usize) -> String {
    join_segments(&[topic_id, group_id, index.to_string().as_str()], '.')
}

pub fn partition_id(index: usize) -> String {
    format!("partition-{}", index)
}

fn partition_index(partition_id: &str) -> Option<usize> {
    partition_id.strip_prefix("partition-")?.parse().ok()
}

fn exchange_of(partition: &Partition) -> Option<String> {
    partition.extension_properties().remove(EXCHANGE_PROPERTY)
}

// ==========================================
// DRIVERS
// ==========================================

pub struct LocalPartitionDriver {
    transport: Arc<LocalTransport>,
    exchange: String,
}

impl LocalPartitionDriver {
    pub fn new(transport: Arc<LocalTransport>, exchange: impl Into<String>) -> Self {
        Self {
            transport,
            exchange: exchange.into(),
        }
    }

    pub fn from_properties(transport: Arc<LocalTransport>, properties: &Properties) -> anyhow::Result<Self> {
        let exchange = properties
            .get(EXCHANGE_PROPERTY)
            .context("local partition has no exchange property")?;
        Ok(Self::new(transport, exchange.as_str()))
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

impl PartitionDriver for LocalPartitionDriver {
    fn kind(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn provision(&self, _partition: &PartitionKey) -> anyhow::Result<()> {
        self.transport.declare(&self.exchange);
        Ok(())
    }

    fn activate(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        self.verify(partition)
    }

    fn deactivate(&self, _partition: &PartitionKey) -> anyhow::Result<()> {
        Ok(())
    }

    fn verify(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        if !self.transport.exists(&self.exchange) {
            bail!("exchange '{}' of partition {} is not declared", self.exchange, partition);
        }
        Ok(())
    }

    fn teardown(&self, _partition: &PartitionKey) -> anyhow::Result<()> {
        self.transport.delete(&self.exchange);
        Ok(())
    }

    fn extension_properties(&self) -> Properties {
        Properties::from([(EXCHANGE_PROPERTY.to_string(), self.exchange.clone())])
    }
}

/// Routes to ACTIVE partitions, optionally narrowed to one partition id.
#[derive(Debug, Default)]
pub struct LocalGroupDriver;

impl GroupDriver for LocalGroupDriver {
    fn kind(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn filter(&self, partitions: Vec<Arc<Partition>>, requirements: &RouteRequirements) -> Vec<Arc<Partition>> {
        let wanted = requirements.property(PARTITION_REQUIREMENT);
        partitions
            .into_iter()
            .filter(|p| p.state() == PartitionState::Active)
            .filter(|p| wanted.map_or(true, |id| p.id() == id))
            .collect()
    }
}

pub struct LocalConnectorDriver {
    transport: Arc<LocalTransport>,
}

impl LocalConnectorDriver {
    pub fn new(transport: Arc<LocalTransport>) -> Self {
        Self { transport }
    }

    /// Every (producer exchange, consumer exchange) pair of the two groups.
    fn pairs(&self, producer: &Group, consumer: &Group) -> anyhow::Result<Vec<(String, String)>> {
        let exchanges = |group: &Group| -> anyhow::Result<Vec<String>> {
            group
                .partitions()
                .iter()
                .map(|p| exchange_of(p).with_context(|| format!("partition {} has no exchange", p.key())))
                .collect()
        };
        let sources = exchanges(producer)?;
        let destinations = exchanges(consumer)?;

        Ok(sources
            .iter()
            .flat_map(|s| destinations.iter().map(move |d| (s.clone(), d.clone())))
            .collect())
    }
}

impl ConnectorDriver for LocalConnectorDriver {
    fn kind(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn link(&self, producer: &Group, consumer: &Group) -> anyhow::Result<LinkReport> {
        let pairs = self.pairs(producer, consumer)?;
        let reachable = pairs
            .iter()
            .filter(|(source, destination)| match self.transport.bind(source, destination) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("[Local] Cannot bind {} -> {}: {:#}", source, destination, e);
                    false
                }
            })
            .count();
        Ok(LinkReport::new(reachable, pairs.len()))
    }

    fn verify(&self, producer: &Group, consumer: &Group) -> anyhow::Result<LinkReport> {
        let pairs = self.pairs(producer, consumer)?;
        let reachable = pairs
            .iter()
            .filter(|(source, destination)| self.transport.is_bound(source, destination))
            .count();
        Ok(LinkReport::new(reachable, pairs.len()))
    }

    fn unlink(&self, producer: &Group, consumer: &Group) -> anyhow::Result<()> {
        for (source, destination) in self.pairs(producer, consumer)? {
            self.transport.unbind(&source, &destination);
        }
        Ok(())
    }
}

// ==========================================
// FACTORY DELEGATES
// ==========================================

pub struct LocalGroupDelegate {
    transport: Arc<LocalTransport>,
    default_partitions: usize,
}

impl LocalGroupDelegate {
    pub fn new(transport: Arc<LocalTransport>, default_partitions: usize) -> Self {
        Self {
            transport,
            default_partitions,
        }
    }

    fn requested_partitions(&self, specification: &GroupSpecification) -> Result<Option<usize>, TopologyError> {
        match specification.common.hint(PARTITIONS_HINT) {
            None => Ok(None),
            Some(_) => match specification.common.hint_u64(PARTITIONS_HINT) {
                Some(n) if n > 0 => Ok(Some(n as usize)),
                _ => Err(TopologyError::InvalidSpecification(format!(
                    "group '{}': '{}' must be a positive integer",
                    specification.group_id, PARTITIONS_HINT
                ))),
            },
        }
    }

    fn build_partition(&self, bus: &Arc<EventBus>, topic_id: &str, group_id: &str, index: usize) -> Partition {
        let key = PartitionKey::new(topic_id, group_id, partition_id(index));
        let driver = LocalPartitionDriver::new(Arc::clone(&self.transport), exchange_name(topic_id, group_id, index));
        Partition::new(Arc::clone(bus), key, Box::new(driver))
    }

    /// Adds partitions at the lowest free indexes, or removes the highest
    /// ones, until the group holds `desired`.
    fn resize(&self, group: &Group, desired: usize) -> Result<(), TopologyError> {
        let mut current = group.partition_count();
        let mut index = 0;
        while current < desired {
            if !group.has_partition(&partition_id(index)) {
                let partition = self.build_partition(group.bus(), group.topic_id(), group.id(), index);
                group.add_partition(Arc::new(partition))?;
                current += 1;
            }
            index += 1;
        }

        if current > desired {
            let mut ids: Vec<String> = group.partition_ids().into_iter().collect();
            ids.sort_by_key(|id| std::cmp::Reverse(partition_index(id)));
            for id in ids.into_iter().take(current - desired) {
                group.remove_partition(&id)?;
            }
        }
        Ok(())
    }
}

impl GroupFactoryDelegate for LocalGroupDelegate {
    fn name(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn can_handle(&self, specification: &GroupSpecification) -> bool {
        specification.protocol == LOCAL_PROTOCOL
    }

    fn create(&self, bus: &Arc<EventBus>, specification: &GroupSpecification) -> Result<Group, TopologyError> {
        let count = self
            .requested_partitions(specification)?
            .unwrap_or(self.default_partitions);
        let topic_id = specification.common.topic_id.as_str();

        let group = Group::new(
            Arc::clone(bus),
            topic_id,
            specification.group_id.as_str(),
            specification.direction,
            Box::new(LocalGroupDriver),
        );
        group.set_description(specification.common.description.clone());

        for index in 0..count {
            let partition = self.build_partition(bus, topic_id, &specification.group_id, index);
            group.attach_partition(Arc::new(partition))?;
        }
        Ok(group)
    }

    fn modify(&self, group: &Group, specification: &GroupSpecification) -> Result<Modifications, TopologyError> {
        let mut modifications = Modifications::new();

        let description = &specification.common.description;
        if modifications.record("description", group.description(), description) {
            group.set_description(description.clone());
        }

        let current = group.partition_count();
        let desired = self.requested_partitions(specification)?.unwrap_or(current);
        if modifications.record(PARTITIONS_HINT, current, desired) {
            self.resize(group, desired)?;
        }
        Ok(modifications)
    }
}

pub struct LocalConnectorDelegate {
    transport: Arc<LocalTransport>,
}

impl LocalConnectorDelegate {
    pub fn new(transport: Arc<LocalTransport>) -> Self {
        Self { transport }
    }
}

impl ConnectorFactoryDelegate for LocalConnectorDelegate {
    fn name(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn can_handle(&self, _specification: &ConnectorSpecification, producer: &Group, consumer: &Group) -> bool {
        producer.kind() == LOCAL_PROTOCOL && consumer.kind() == LOCAL_PROTOCOL
    }

    fn create(
        &self,
        bus: &Arc<EventBus>,
        specification: &ConnectorSpecification,
        producer: Arc<Group>,
        consumer: Arc<Group>,
    ) -> Result<Connector, TopologyError> {
        let connector = Connector::new(
            Arc::clone(bus),
            specification.common.topic_id.as_str(),
            specification.connector_id.as_str(),
            producer,
            consumer,
            Box::new(LocalConnectorDriver::new(Arc::clone(&self.transport))),
        )?;
        connector.set_description(specification.common.description.clone());
        Ok(connector)
    }

    fn modify(
        &self,
        connector: &Connector,
        specification: &ConnectorSpecification,
    ) -> Result<Modifications, TopologyError> {
        let mut modifications = Modifications::new();

        for (property, current, requested) in [
            ("producer_group_id", connector.producer_group().id(), specification.producer_group_id.as_str()),
            ("consumer_group_id", connector.consumer_group().id(), specification.consumer_group_id.as_str()),
        ] {
            if current != requested {
                return Err(TopologyError::InvalidSpecification(format!(
                    "connector '{}' cannot be rebound ({} '{}' -> '{}'); remove and recreate it",
                    connector.id(),
                    property,
                    current,
                    requested
                )));
            }
            modifications.record(property, current, requested);
        }

        let description = &specification.common.description;
        if modifications.record("description", connector.description(), description) {
            connector.set_description(description.clone());
        }
        Ok(modifications)
    }
}

/// Installs the local type tags so persisted local entities can be hydrated.
pub fn register_local_protocol(catalog: &DriverCatalog, transport: Arc<LocalTransport>) {
    let partitions = Arc::clone(&transport);
    catalog.register_partition_driver(LOCAL_PROTOCOL, move |properties| {
        let driver = LocalPartitionDriver::from_properties(Arc::clone(&partitions), properties)?;
        Ok(Box::new(driver) as Box<dyn PartitionDriver>)
    });
    catalog.register_group_driver(LOCAL_PROTOCOL, |_properties| {
        Ok(Box::new(LocalGroupDriver) as Box<dyn GroupDriver>)
    });
    catalog.register_connector_driver(LOCAL_PROTOCOL, move |_properties| {
        Ok(Box::new(LocalConnectorDriver::new(Arc::clone(&transport))) as Box<dyn ConnectorDriver>)
    });
}
