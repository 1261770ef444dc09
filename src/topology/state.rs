use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::utils::current_time_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionState {
    Nonexistent,
    Activating,
    Active,
    InError,
    Deactivating,
    Inactive,
}

impl PartitionState {
    pub fn is_routable(self) -> bool {
        self == PartitionState::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartitionState::Nonexistent => "NONEXISTENT",
            PartitionState::Activating => "ACTIVATING",
            PartitionState::Active => "ACTIVE",
            PartitionState::InError => "IN_ERROR",
            PartitionState::Deactivating => "DEACTIVATING",
            PartitionState::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorState {
    Nonexistent,
    Activating,
    PartiallyActive,
    Active,
    InError,
    Deactivating,
    Inactive,
}

impl ConnectorState {
    /// Partially active connectors still carry traffic for the reachable pairs.
    pub fn is_routable(self) -> bool {
        matches!(self, ConnectorState::Active | ConnectorState::PartiallyActive)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorState::Nonexistent => "NONEXISTENT",
            ConnectorState::Activating => "ACTIVATING",
            ConnectorState::PartiallyActive => "PARTIALLY_ACTIVE",
            ConnectorState::Active => "ACTIVE",
            ConnectorState::InError => "IN_ERROR",
            ConnectorState::Deactivating => "DEACTIVATING",
            ConnectorState::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// TRANSITIONS
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition<S> {
    pub state: S,
    pub reason: String,
    pub changed_at: i64,
}

/// Single-writer state slot owned by an entity.
pub(crate) struct StateCell<S> {
    inner: RwLock<Transition<S>>,
}

impl<S: Copy + PartialEq> StateCell<S> {
    pub(crate) fn new(initial: S, reason: &str) -> Self {
        Self {
            inner: RwLock::new(Transition {
                state: initial,
                reason: reason.to_string(),
                changed_at: current_time_ms(),
            }),
        }
    }

    pub(crate) fn get(&self) -> S {
        self.inner.read().state
    }

    pub(crate) fn transition(&self) -> Transition<S>
    where
        S: Clone,
    {
        self.inner.read().clone()
    }

    /// Records `next` with its reason. Returns the previous state only when
    /// the state actually changed.
    pub(crate) fn set(&self, next: S, reason: &str) -> Option<S> {
        let mut slot = self.inner.write();
        let previous = slot.state;
        slot.state = next;
        slot.reason = reason.to_string();
        slot.changed_at = current_time_ms();
        (previous != next).then_some(previous)
    }
}
