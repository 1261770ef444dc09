//! Producer/Consumer group: an id-keyed set of partitions within a topic.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::topology::driver::{GroupDriver, Properties};
use crate::topology::filtering::RouteRequirements;
use crate::topology::Partition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Producer,
    Consumer,
}

impl Direction {
    pub fn is_consumer(self) -> bool {
        self == Direction::Consumer
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Producer => f.write_str("Producer"),
            Direction::Consumer => f.write_str("Consumer"),
        }
    }
}

pub struct Group {
    topic_id: String,
    id: String,
    direction: Direction,
    description: RwLock<Option<String>>,
    partitions: DashMap<String, Arc<Partition>>,
    // Serializes structural changes (check + setup/cleanup + insert/remove).
    structure: Mutex<()>,
    driver: Box<dyn GroupDriver>,
    bus: Arc<EventBus>,
}

impl Group {
    pub fn new(
        bus: Arc<EventBus>,
        topic_id: impl Into<String>,
        id: impl Into<String>,
        direction: Direction,
        driver: Box<dyn GroupDriver>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            id: id.into(),
            direction,
            description: RwLock::new(None),
            partitions: DashMap::new(),
            structure: Mutex::new(()),
            driver,
            bus,
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        *self.description.write() = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> &str {
        self.driver.kind()
    }

    pub fn description(&self) -> Option<String> {
        self.description.read().clone()
    }

    pub fn set_description(&self, description: Option<String>) {
        *self.description.write() = description;
    }

    pub fn extension_properties(&self) -> Properties {
        self.driver.extension_properties()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ==========================================
    // PARTITIONS
    // ==========================================

    pub fn partition(&self, partition_id: &str) -> Result<Arc<Partition>, TopologyError> {
        self.partitions
            .get(partition_id)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| self.partition_not_exist(partition_id))
    }

    pub fn has_partition(&self, partition_id: &str) -> bool {
        self.partitions.contains_key(partition_id)
    }

    /// Sorted by partition id.
    pub fn partitions(&self) -> Vec<Arc<Partition>> {
        let mut partitions: Vec<Arc<Partition>> =
            self.partitions.iter().map(|p| Arc::clone(p.value())).collect();
        partitions.sort_by(|a, b| a.id().cmp(b.id()));
        partitions
    }

    pub fn partition_ids(&self) -> BTreeSet<String> {
        self.partitions.iter().map(|p| p.key().clone()).collect()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Provisions the partition, then publishes it.
    pub fn add_partition(&self, partition: Arc<Partition>) -> Result<Arc<Partition>, TopologyError> {
        self.check_owner(&partition)?;
        {
            let _guard = self.structure.lock();
            if self.partitions.contains_key(partition.id()) {
                return Err(self.partition_already_exists(partition.id()));
            }
            partition.setup()?;
            self.partitions
                .insert(partition.id().to_string(), Arc::clone(&partition));
        }

        tracing::debug!("[Group] {}/{}: added partition '{}'", self.topic_id, self.id, partition.id());
        self.bus.partitions.fire_added(&partition);
        self.bus.groups.fire_save_requested(self);
        Ok(partition)
    }

    /// Tears the partition down, then unpublishes it. A failed teardown
    /// leaves the partition in place.
    pub fn remove_partition(&self, partition_id: &str) -> Result<Arc<Partition>, TopologyError> {
        let partition = {
            let _guard = self.structure.lock();
            let partition = self.partition(partition_id)?;
            partition.cleanup()?;
            self.partitions.remove(partition_id);
            partition
        };

        tracing::debug!("[Group] {}/{}: removed partition '{}'", self.topic_id, self.id, partition_id);
        self.bus.partitions.fire_removed(&partition);
        self.bus.groups.fire_save_requested(self);
        Ok(partition)
    }

    /// Places an already-built partition without provisioning or events.
    /// Used while constructing or hydrating a group.
    pub fn attach_partition(&self, partition: Arc<Partition>) -> Result<(), TopologyError> {
        self.check_owner(&partition)?;
        match self.partitions.entry(partition.id().to_string()) {
            Entry::Occupied(_) => Err(self.partition_already_exists(partition.id())),
            Entry::Vacant(slot) => {
                slot.insert(partition);
                Ok(())
            }
        }
    }

    // ==========================================
    // LIFECYCLE
    // ==========================================

    /// Provisions every partition already held by the group.
    pub fn setup(&self) -> Result<(), TopologyError> {
        for partition in self.partitions() {
            partition.setup()?;
        }
        Ok(())
    }

    /// Verifies every partition; reports the first failure after checking all.
    pub fn verify(&self) -> Result<(), TopologyError> {
        let mut first_failure = None;
        for partition in self.partitions() {
            if let Err(e) = partition.verify() {
                first_failure.get_or_insert(e);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// Removes every partition through the regular remove path.
    pub fn cleanup(&self) -> Result<(), TopologyError> {
        for partition_id in self.partition_ids() {
            self.remove_partition(&partition_id)?;
        }
        Ok(())
    }

    pub fn filter(&self, requirements: &RouteRequirements) -> Vec<Arc<Partition>> {
        self.driver.filter(self.partitions(), requirements)
    }

    /// Requests a save of every partition and then of the group itself.
    pub fn save(&self) {
        for partition in self.partitions() {
            self.bus.partitions.fire_save_requested(&partition);
        }
        self.bus.groups.fire_save_requested(self);
    }

    fn check_owner(&self, partition: &Partition) -> Result<(), TopologyError> {
        if partition.topic_id() != self.topic_id || partition.group_id() != self.id {
            return Err(TopologyError::StateMismatch {
                entity: "partition",
                expected: format!("{}/{}", self.topic_id, self.id),
                found: format!("{}/{}", partition.topic_id(), partition.group_id()),
            });
        }
        Ok(())
    }

    fn partition_not_exist(&self, partition_id: &str) -> TopologyError {
        TopologyError::PartitionNotExist {
            topic_id: self.topic_id.clone(),
            group_id: self.id.clone(),
            partition_id: partition_id.to_string(),
        }
    }

    fn partition_already_exists(&self, partition_id: &str) -> TopologyError {
        TopologyError::PartitionAlreadyExists {
            topic_id: self.topic_id.clone(),
            group_id: self.id.clone(),
            partition_id: partition_id.to_string(),
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("topic_id", &self.topic_id)
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("kind", &self.kind())
            .field("partitions", &self.partition_ids())
            .finish()
    }
}
