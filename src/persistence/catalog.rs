//! Type tag -> driver constructor map used during hydration.
//!
//! The set of types that can come back from storage is exactly the set
//! registered here. Unknown tags fail with `UnknownEntityKind`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::errors::TopologyError;
use crate::topology::{ConnectorDriver, GroupDriver, PartitionDriver, Properties};

pub type PartitionDriverCtor =
    Arc<dyn Fn(&Properties) -> anyhow::Result<Box<dyn PartitionDriver>> + Send + Sync>;
pub type GroupDriverCtor =
    Arc<dyn Fn(&Properties) -> anyhow::Result<Box<dyn GroupDriver>> + Send + Sync>;
pub type ConnectorDriverCtor =
    Arc<dyn Fn(&Properties) -> anyhow::Result<Box<dyn ConnectorDriver>> + Send + Sync>;

#[derive(Default)]
pub struct DriverCatalog {
    partitions: DashMap<String, PartitionDriverCtor>,
    groups: DashMap<String, GroupDriverCtor>,
    connectors: DashMap<String, ConnectorDriverCtor>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_partition_driver<F>(&self, kind: impl Into<String>, ctor: F)
    where
        F: Fn(&Properties) -> anyhow::Result<Box<dyn PartitionDriver>> + Send + Sync + 'static,
    {
        self.partitions.insert(kind.into(), Arc::new(ctor));
    }

    pub fn register_group_driver<F>(&self, kind: impl Into<String>, ctor: F)
    where
        F: Fn(&Properties) -> anyhow::Result<Box<dyn GroupDriver>> + Send + Sync + 'static,
    {
        self.groups.insert(kind.into(), Arc::new(ctor));
    }

    pub fn register_connector_driver<F>(&self, kind: impl Into<String>, ctor: F)
    where
        F: Fn(&Properties) -> anyhow::Result<Box<dyn ConnectorDriver>> + Send + Sync + 'static,
    {
        self.connectors.insert(kind.into(), Arc::new(ctor));
    }

    pub fn partition_driver(
        &self,
        kind: &str,
        properties: &Properties,
    ) -> Result<Box<dyn PartitionDriver>, TopologyError> {
        let ctor = self
            .partitions
            .get(kind)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| unknown("partition", kind))?;
        Ok(ctor(properties)?)
    }

    pub fn group_driver(
        &self,
        kind: &str,
        properties: &Properties,
    ) -> Result<Box<dyn GroupDriver>, TopologyError> {
        let ctor = self
            .groups
            .get(kind)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| unknown("group", kind))?;
        Ok(ctor(properties)?)
    }

    pub fn connector_driver(
        &self,
        kind: &str,
        properties: &Properties,
    ) -> Result<Box<dyn ConnectorDriver>, TopologyError> {
        let ctor = self
            .connectors
            .get(kind)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| unknown("connector", kind))?;
        Ok(ctor(properties)?)
    }

    pub fn knows(&self, entity: &str, kind: &str) -> bool {
        match entity {
            "partition" => self.partitions.contains_key(kind),
            "group" => self.groups.contains_key(kind),
            "connector" => self.connectors.contains_key(kind),
            _ => false,
        }
    }
}

fn unknown(entity: &'static str, kind: &str) -> TopologyError {
    TopologyError::UnknownEntityKind {
        entity,
        kind: kind.to_string(),
    }
}
