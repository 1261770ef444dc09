//! Protocol driver seams.
//!
//! Entities own their state machines; drivers only talk to the transport.
//! Every driver error is opaque and reaches the caller unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::topology::filtering::RouteRequirements;
use crate::topology::{Group, Partition, PartitionKey};

/// Opaque string map persisted alongside an entity's identity.
pub type Properties = BTreeMap<String, String>;

pub trait PartitionDriver: Send + Sync {
    /// Type tag used to rebuild the driver on hydration.
    fn kind(&self) -> &str;

    fn provision(&self, partition: &PartitionKey) -> anyhow::Result<()>;

    fn activate(&self, partition: &PartitionKey) -> anyhow::Result<()>;

    fn deactivate(&self, partition: &PartitionKey) -> anyhow::Result<()>;

    /// Re-checks the live transport configuration.
    fn verify(&self, partition: &PartitionKey) -> anyhow::Result<()>;

    fn teardown(&self, partition: &PartitionKey) -> anyhow::Result<()>;

    fn extension_properties(&self) -> Properties {
        Properties::new()
    }
}

pub trait GroupDriver: Send + Sync {
    fn kind(&self) -> &str;

    /// Selects the partitions applicable to a routing request.
    fn filter(
        &self,
        partitions: Vec<Arc<Partition>>,
        requirements: &RouteRequirements,
    ) -> Vec<Arc<Partition>>;

    fn extension_properties(&self) -> Properties {
        Properties::new()
    }
}

/// How many producer/consumer partition pairs a connector could wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    pub reachable: usize,
    pub total: usize,
}

impl LinkReport {
    pub fn new(reachable: usize, total: usize) -> Self {
        Self { reachable, total }
    }

    pub fn is_complete(&self) -> bool {
        self.reachable == self.total
    }
}

pub trait ConnectorDriver: Send + Sync {
    fn kind(&self) -> &str;

    fn link(&self, producer: &Group, consumer: &Group) -> anyhow::Result<LinkReport>;

    fn verify(&self, producer: &Group, consumer: &Group) -> anyhow::Result<LinkReport>;

    fn unlink(&self, producer: &Group, consumer: &Group) -> anyhow::Result<()>;

    fn teardown(&self, producer: &Group, consumer: &Group) -> anyhow::Result<()> {
        self.unlink(producer, consumer)
    }

    fn extension_properties(&self) -> Properties {
        Properties::new()
    }
}
