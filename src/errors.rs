//! Error taxonomy for the topology control plane.
//!
//! - `TopologyError`: lookups, structural mutations, factories, hydration.
//! - `PersistenceError`: persister backends.
//! - `SnapshotError`: snapshot storage and reconciliation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::topology::Direction;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Topic '{topic_id}' does not exist.")]
    TopicNotExist { topic_id: String },

    #[error("Topic '{topic_id}' already exists.")]
    TopicAlreadyExists { topic_id: String },

    #[error("Topic '{topic_id}' does not contain a {direction}Group with an id of '{group_id}'.")]
    GroupNotExist {
        topic_id: String,
        group_id: String,
        direction: Direction,
    },

    #[error("Topic '{topic_id}' already contains a group with an id of '{group_id}' ({direction}).")]
    GroupAlreadyExists {
        topic_id: String,
        group_id: String,
        direction: Direction,
    },

    #[error("Group '{group_id}' of topic '{topic_id}' is referenced by connector '{connector_id}'.")]
    GroupInUse {
        topic_id: String,
        group_id: String,
        connector_id: String,
    },

    #[error("Topic '{topic_id}' does not contain a Connector with an id of '{connector_id}'.")]
    ConnectorNotExist { topic_id: String, connector_id: String },

    #[error("Topic '{topic_id}' already contains a Connector with an id of '{connector_id}'.")]
    ConnectorAlreadyExists { topic_id: String, connector_id: String },

    #[error("Group '{group_id}' does not contain a Partition with an id of '{partition_id}'.")]
    PartitionNotExist {
        topic_id: String,
        group_id: String,
        partition_id: String,
    },

    #[error("Group '{group_id}' already contains a Partition with an id of '{partition_id}'.")]
    PartitionAlreadyExists {
        topic_id: String,
        group_id: String,
        partition_id: String,
    },

    #[error("Connector '{connector_id}' of topic '{topic_id}' cannot reach any of its {total} partition pairs.")]
    ConnectorUnreachable {
        topic_id: String,
        connector_id: String,
        total: usize,
    },

    #[error("No {kind} factory is available for specification {specification}.")]
    NoFactoryAvailable {
        kind: &'static str,
        specification: String,
    },

    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    #[error("No {entity} type is registered under the tag '{kind}'.")]
    UnknownEntityKind { entity: &'static str, kind: String },

    #[error("{entity} state mismatch: expected '{expected}', found '{found}'.")]
    StateMismatch {
        entity: &'static str,
        expected: String,
        found: String,
    },

    #[error("Actor '{actor}' is not allowed to '{operation}' on topic '{topic_id}'.")]
    AccessDenied {
        topic_id: String,
        operation: String,
        actor: String,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Opaque failure raised by a protocol driver. Display and source chain
    /// are the driver's own.
    #[error(transparent)]
    Protocol(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("No {kind} record exists with an id of '{id}'.")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage backend failure: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("Record codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot '{id}' does not exist.")]
    NotExist { id: String },

    #[error("Snapshot record '{}' is missing.", path.display())]
    RecordMissing { path: PathBuf },

    #[error("Snapshot I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization failure: {0:#}")]
    Serialization(anyhow::Error),

    #[error(transparent)]
    Rollup(#[from] ReconciliationRollup),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

// ==========================================
// RECONCILIATION ROLLUP
// ==========================================

/// One failure per topic that could not be reconciled. Only raised after
/// every topic has been attempted.
#[derive(Debug, Default)]
pub struct ReconciliationRollup {
    failures: Vec<(String, TopologyError)>,
}

impl ReconciliationRollup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, topic_id: impl Into<String>, cause: TopologyError) {
        self.failures.push((topic_id.into(), cause));
    }

    pub fn contains(&self, topic_id: &str) -> bool {
        self.failures.iter().any(|(id, _)| id == topic_id)
    }

    pub fn cause(&self, topic_id: &str) -> Option<&TopologyError> {
        self.failures
            .iter()
            .find(|(id, _)| id == topic_id)
            .map(|(_, cause)| cause)
    }

    pub fn topic_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn failures(&self) -> &[(String, TopologyError)] {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn into_result(self) -> Result<(), ReconciliationRollup> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ReconciliationRollup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reconciliation failed for {} topic(s)", self.failures.len())?;
        for (topic_id, cause) in &self.failures {
            write!(f, "; '{}': {}", topic_id, cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconciliationRollup {}
