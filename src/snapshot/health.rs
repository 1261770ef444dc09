//! Staleness signal: registry changes that no snapshot has captured yet.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::registry::TopicRegistry;
use crate::snapshot::snapshot_manager::SnapshotManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SnapshotHealth {
    Healthy { lag_ms: i64 },
    Unhealthy { reason: String },
}

impl SnapshotHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SnapshotHealth::Healthy { .. })
    }
}

impl fmt::Display for SnapshotHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotHealth::Healthy { lag_ms } => write!(f, "healthy (lag {} ms)", lag_ms),
            SnapshotHealth::Unhealthy { reason } => write!(f, "unhealthy: {}", reason),
        }
    }
}

pub struct SnapshotHealthCheck {
    registry: Arc<TopicRegistry>,
    snapshots: Arc<SnapshotManager>,
    stale_threshold_ms: i64,
}

impl SnapshotHealthCheck {
    pub fn new(registry: Arc<TopicRegistry>, snapshots: Arc<SnapshotManager>, stale_threshold_ms: i64) -> Self {
        Self {
            registry,
            snapshots,
            stale_threshold_ms,
        }
    }

    pub fn stale_threshold_ms(&self) -> i64 {
        self.stale_threshold_ms
    }

    pub fn check(&self) -> SnapshotHealth {
        let last_persisted = self.snapshots.last_persisted();
        if last_persisted < 0 {
            return SnapshotHealth::Unhealthy {
                reason: "no snapshot has been persisted".to_string(),
            };
        }

        // Negative when nothing changed since the last export.
        let lag_ms = (self.registry.last_modified() - last_persisted).max(0);
        if lag_ms > self.stale_threshold_ms {
            return SnapshotHealth::Unhealthy {
                reason: format!(
                    "registry changed {} ms after the last snapshot (threshold {} ms)",
                    lag_ms, self.stale_threshold_ms
                ),
            };
        }
        SnapshotHealth::Healthy { lag_ms }
    }
}
