//! Partition: the leaf unit of transport configuration.
//!
//! State machine (driven only by the partition's own operations):
//! - setup:      ACTIVATING -> ACTIVE | IN_ERROR
//! - activate:   ACTIVATING -> ACTIVE | IN_ERROR
//! - deactivate: DEACTIVATING -> INACTIVE | IN_ERROR
//! - verify:     ACTIVE | IN_ERROR
//! - cleanup:    DEACTIVATING -> NONEXISTENT | IN_ERROR

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::topology::driver::{PartitionDriver, Properties};
use crate::topology::state::{PartitionState, StateCell, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub topic_id: String,
    pub group_id: String,
    pub partition_id: String,
}

impl PartitionKey {
    pub fn new(
        topic_id: impl Into<String>,
        group_id: impl Into<String>,
        partition_id: impl Into<String>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            group_id: group_id.into(),
            partition_id: partition_id.into(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.topic_id, self.group_id, self.partition_id)
    }
}

pub struct Partition {
    key: PartitionKey,
    description: RwLock<Option<String>>,
    state: StateCell<PartitionState>,
    driver: Box<dyn PartitionDriver>,
    bus: Arc<EventBus>,
}

impl Partition {
    pub fn new(bus: Arc<EventBus>, key: PartitionKey, driver: Box<dyn PartitionDriver>) -> Self {
        Self {
            key,
            description: RwLock::new(None),
            state: StateCell::new(PartitionState::Nonexistent, "created"),
            driver,
            bus,
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        *self.description.write() = Some(description.into());
        self
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.key.partition_id
    }

    pub fn topic_id(&self) -> &str {
        &self.key.topic_id
    }

    pub fn group_id(&self) -> &str {
        &self.key.group_id
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

    pub fn state(&self) -> PartitionState {
        self.state.get()
    }

    pub fn transition(&self) -> Transition<PartitionState> {
        self.state.transition()
    }

    // ==========================================
    // LIFECYCLE
    // ==========================================

    pub fn setup(&self) -> Result<(), TopologyError> {
        self.transition_to(PartitionState::Activating, "provisioning");
        let outcome = self.driver.provision(&self.key);
        self.settle("setup", outcome, PartitionState::Active, "provisioned")
    }

    pub fn activate(&self) -> Result<(), TopologyError> {
        self.transition_to(PartitionState::Activating, "activating");
        let outcome = self.driver.activate(&self.key);
        self.settle("activate", outcome, PartitionState::Active, "activated")
    }

    pub fn deactivate(&self) -> Result<(), TopologyError> {
        self.transition_to(PartitionState::Deactivating, "deactivating");
        let outcome = self.driver.deactivate(&self.key);
        self.settle("deactivate", outcome, PartitionState::Inactive, "deactivated")
    }

    pub fn verify(&self) -> Result<(), TopologyError> {
        let outcome = self.driver.verify(&self.key);
        self.settle("verify", outcome, PartitionState::Active, "verified")
    }

    pub fn cleanup(&self) -> Result<(), TopologyError> {
        self.transition_to(PartitionState::Deactivating, "tearing down");
        let outcome = self.driver.teardown(&self.key);
        self.settle("cleanup", outcome, PartitionState::Nonexistent, "torn down")
    }

    fn settle(
        &self,
        operation: &str,
        outcome: anyhow::Result<()>,
        success: PartitionState,
        reason: &str,
    ) -> Result<(), TopologyError> {
        match outcome {
            Ok(()) => {
                self.transition_to(success, reason);
                Ok(())
            }
            Err(e) => {
                self.transition_to(PartitionState::InError, &format!("{} failed: {:#}", operation, e));
                Err(TopologyError::Protocol(e))
            }
        }
    }

    fn transition_to(&self, next: PartitionState, reason: &str) {
        if let Some(previous) = self.state.set(next, reason) {
            tracing::debug!("[Partition] {}: {} -> {} ({})", self.key, previous, next, reason);
            self.bus.partitions.fire_state_change(self, previous, next, reason);
        }
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("key", &self.key)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}
