//! Connector: bridges one producer group to one consumer group of the same topic.
//!
//! Link outcomes map onto states as follows:
//! - every pair reachable -> ACTIVE
//! - some pairs reachable -> PARTIALLY_ACTIVE
//! - none reachable       -> IN_ERROR (ConnectorUnreachable)

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::topology::driver::{ConnectorDriver, LinkReport, Properties};
use crate::topology::state::{ConnectorState, StateCell, Transition};
use crate::topology::{Direction, Group};

pub struct Connector {
    topic_id: String,
    id: String,
    description: RwLock<Option<String>>,
    producer: Arc<Group>,
    consumer: Arc<Group>,
    state: StateCell<ConnectorState>,
    driver: Box<dyn ConnectorDriver>,
    bus: Arc<EventBus>,
}

impl Connector {
    /// Fails when either group belongs to another topic or has the wrong direction.
    pub fn new(
        bus: Arc<EventBus>,
        topic_id: impl Into<String>,
        id: impl Into<String>,
        producer: Arc<Group>,
        consumer: Arc<Group>,
        driver: Box<dyn ConnectorDriver>,
    ) -> Result<Self, TopologyError> {
        let topic_id = topic_id.into();
        for (group, direction) in [(&producer, Direction::Producer), (&consumer, Direction::Consumer)] {
            if group.topic_id() != topic_id || group.direction() != direction {
                return Err(TopologyError::GroupNotExist {
                    topic_id: topic_id.clone(),
                    group_id: group.id().to_string(),
                    direction,
                });
            }
        }

        Ok(Self {
            topic_id,
            id: id.into(),
            description: RwLock::new(None),
            producer,
            consumer,
            state: StateCell::new(ConnectorState::Nonexistent, "created"),
            driver,
            bus,
        })
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

    pub fn kind(&self) -> &str {
        self.driver.kind()
    }

    pub fn description(&self) -> Option<String> {
        self.description.read().clone()
    }

    pub fn set_description(&self, description: Option<String>) {
        *self.description.write() = description;
    }

    pub fn producer_group(&self) -> &Arc<Group> {
        &self.producer
    }

    pub fn consumer_group(&self) -> &Arc<Group> {
        &self.consumer
    }

    pub fn references(&self, group_id: &str) -> bool {
        self.producer.id() == group_id || self.consumer.id() == group_id
    }

    pub fn extension_properties(&self) -> Properties {
        self.driver.extension_properties()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn state(&self) -> ConnectorState {
        self.state.get()
    }

    pub fn transition(&self) -> Transition<ConnectorState> {
        self.state.transition()
    }

    // ==========================================
    // LIFECYCLE
    // ==========================================

    pub fn setup(&self) -> Result<(), TopologyError> {
        self.transition_to(ConnectorState::Activating, "linking groups");
        let outcome = self.driver.link(&self.producer, &self.consumer);
        self.settle_link("setup", outcome)
    }

    pub fn activate(&self) -> Result<(), TopologyError> {
        self.transition_to(ConnectorState::Activating, "activating");
        let outcome = self.driver.link(&self.producer, &self.consumer);
        self.settle_link("activate", outcome)
    }

    pub fn verify(&self) -> Result<(), TopologyError> {
        let outcome = self.driver.verify(&self.producer, &self.consumer);
        self.settle_link("verify", outcome)
    }

    pub fn deactivate(&self) -> Result<(), TopologyError> {
        self.transition_to(ConnectorState::Deactivating, "unlinking groups");
        let outcome = self.driver.unlink(&self.producer, &self.consumer);
        self.settle("deactivate", outcome, ConnectorState::Inactive, "deactivated")
    }

    pub fn cleanup(&self) -> Result<(), TopologyError> {
        self.transition_to(ConnectorState::Deactivating, "tearing down");
        let outcome = self.driver.teardown(&self.producer, &self.consumer);
        self.settle("cleanup", outcome, ConnectorState::Nonexistent, "torn down")
    }

    fn settle_link(
        &self,
        operation: &str,
        outcome: anyhow::Result<LinkReport>,
    ) -> Result<(), TopologyError> {
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                self.transition_to(ConnectorState::InError, &format!("{} failed: {:#}", operation, e));
                return Err(TopologyError::Protocol(e));
            }
        };

        let reason = format!("{}/{} partition pairs reachable", report.reachable, report.total);
        if report.is_complete() {
            self.transition_to(ConnectorState::Active, &reason);
            Ok(())
        } else if report.reachable > 0 {
            self.transition_to(ConnectorState::PartiallyActive, &reason);
            Ok(())
        } else {
            self.transition_to(ConnectorState::InError, &reason);
            Err(TopologyError::ConnectorUnreachable {
                topic_id: self.topic_id.clone(),
                connector_id: self.id.clone(),
                total: report.total,
            })
        }
    }

    fn settle(
        &self,
        operation: &str,
        outcome: anyhow::Result<()>,
        success: ConnectorState,
        reason: &str,
    ) -> Result<(), TopologyError> {
        match outcome {
            Ok(()) => {
                self.transition_to(success, reason);
                Ok(())
            }
            Err(e) => {
                self.transition_to(ConnectorState::InError, &format!("{} failed: {:#}", operation, e));
                Err(TopologyError::Protocol(e))
            }
        }
    }

    fn transition_to(&self, next: ConnectorState, reason: &str) {
        if let Some(previous) = self.state.set(next, reason) {
            tracing::debug!(
                "[Connector] {}/{}: {} -> {} ({})",
                self.topic_id, self.id, previous, next, reason
            );
            self.bus.connectors.fire_state_change(self, previous, next, reason);
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("topic_id", &self.topic_id)
            .field("id", &self.id)
            .field("producer", &self.producer.id())
            .field("consumer", &self.consumer.id())
            .field("state", &self.state())
            .finish()
    }
}
