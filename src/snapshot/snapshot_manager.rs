//! Snapshot Manager: export/list/get plus merge/overwrite reconciliation.
//!
//! Reconciliation per registry topic T, with M the snapshot's topic of the same id:
//! - M absent:  overwrite unregisters T, merge leaves it
//! - M == T:    nothing
//! - otherwise: unregister T, register M
//! Snapshot topics missing from the registry are registered afterwards.
//! Failures are collected per topic and raised together at the end.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::errors::{ReconciliationRollup, SnapshotError, TopologyError};
use crate::persistence::Hydrator;
use crate::registry::TopicRegistry;
use crate::snapshot::store::SnapshotStore;
use crate::snapshot::types::{Snapshot, SnapshotDescriptor, SnapshotDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    Merge,
    Overwrite,
}

/// What a successful reconciliation did, by topic id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub unchanged: Vec<String>,
    pub replaced: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retained: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Unchanged,
    Replaced,
    Added,
    Removed,
    Retained,
}

impl ReconciliationSummary {
    fn record(&mut self, outcome: Outcome, topic_id: String) {
        let bucket = match outcome {
            Outcome::Unchanged => &mut self.unchanged,
            Outcome::Replaced => &mut self.replaced,
            Outcome::Added => &mut self.added,
            Outcome::Removed => &mut self.removed,
            Outcome::Retained => &mut self.retained,
        };
        bucket.push(topic_id);
    }
}

pub struct SnapshotManager {
    registry: Arc<TopicRegistry>,
    hydrator: Arc<Hydrator>,
    store: Box<dyn SnapshotStore>,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotManager {
    pub fn new(registry: Arc<TopicRegistry>, hydrator: Arc<Hydrator>, store: Box<dyn SnapshotStore>) -> Self {
        Self {
            registry,
            hydrator,
            store,
            current: RwLock::new(None),
        }
    }

    // ==========================================
    // EXPORT / RETRIEVAL
    // ==========================================

    pub fn export(&self, description: Option<String>) -> Result<Arc<Snapshot>, SnapshotError> {
        let snapshot = Arc::new(Snapshot::capture(description, self.registry.entries()));
        self.store.write(&snapshot.document())?;
        *self.current.write() = Some(Arc::clone(&snapshot));

        tracing::info!(
            "[Snapshot] Exported '{}' with {} topic(s)",
            snapshot.id(),
            snapshot.topics().len()
        );
        Ok(snapshot)
    }

    /// Cached current snapshot, loaded from the latest record on first use.
    pub fn latest(&self) -> Result<Option<Arc<Snapshot>>, SnapshotError> {
        if let Some(current) = self.current.read().as_ref() {
            return Ok(Some(Arc::clone(current)));
        }

        let Some(document) = self.store.read_latest()? else {
            return Ok(None);
        };
        let snapshot = Arc::new(self.materialize(document)?);

        let mut current = self.current.write();
        // An export may have won the race while we were reading.
        let current = current.get_or_insert_with(|| Arc::clone(&snapshot));
        Ok(Some(Arc::clone(current)))
    }

    /// Timestamp of `latest()`, -1 when there is none.
    pub fn last_persisted(&self) -> i64 {
        match self.latest() {
            Ok(Some(snapshot)) => snapshot.timestamp(),
            Ok(None) => -1,
            Err(e) => {
                tracing::warn!("[Snapshot] Cannot read latest snapshot: {}", e);
                -1
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Snapshot, SnapshotError> {
        let document = self.store.read(id)?;
        self.materialize(document)
    }

    /// Descriptors from record names only; payloads are not read.
    pub fn list(&self) -> Result<Vec<SnapshotDescriptor>, SnapshotError> {
        self.store.list()
    }

    fn materialize(&self, document: SnapshotDocument) -> Result<Snapshot, SnapshotError> {
        let topics = document
            .topics
            .iter()
            .map(|tree| self.hydrator.hydrate_tree(tree))
            .collect::<Result<Vec<_>, TopologyError>>()?;
        Ok(Snapshot::from_parts(document.id, document.description, document.timestamp, topics))
    }

    // ==========================================
    // RECONCILIATION
    // ==========================================

    /// Never removes registry topics missing from the snapshot.
    pub fn merge(&self, snapshot: &Snapshot) -> Result<ReconciliationSummary, SnapshotError> {
        self.reconcile(snapshot, ReconcileMode::Merge)
    }

    /// Leaves the registry holding exactly the snapshot's topics.
    pub fn overwrite(&self, snapshot: &Snapshot) -> Result<ReconciliationSummary, SnapshotError> {
        self.reconcile(snapshot, ReconcileMode::Overwrite)
    }

    pub fn reconcile(
        &self,
        snapshot: &Snapshot,
        mode: ReconcileMode,
    ) -> Result<ReconciliationSummary, SnapshotError> {
        let _guard = self.registry.lock();
        let mut summary = ReconciliationSummary::default();
        let mut rollup = ReconciliationRollup::new();

        for live in self.registry.entries() {
            let topic_id = live.id().to_string();
            let outcome = match snapshot.topic(&topic_id) {
                None if mode == ReconcileMode::Overwrite => self
                    .registry
                    .unregister(&topic_id)
                    .map(|_| Outcome::Removed),
                None => Ok(Outcome::Retained),
                Some(stored) if **stored == *live => Ok(Outcome::Unchanged),
                Some(stored) => self
                    .registry
                    .unregister(&topic_id)
                    .and_then(|_| self.registry.register(Arc::clone(stored)))
                    .map(|_| Outcome::Replaced),
            };

            match outcome {
                Ok(outcome) => summary.record(outcome, topic_id),
                Err(e) => {
                    tracing::warn!("[Snapshot] Reconciling topic '{}' failed: {}", topic_id, e);
                    rollup.push(topic_id, e);
                }
            }
        }

        for stored in snapshot.topics() {
            if self.registry.exists(stored.id()) || rollup.contains(stored.id()) {
                continue;
            }
            match self.registry.register(Arc::clone(stored)) {
                Ok(()) => summary.record(Outcome::Added, stored.id().to_string()),
                Err(e) => {
                    tracing::warn!("[Snapshot] Registering topic '{}' failed: {}", stored.id(), e);
                    rollup.push(stored.id(), e);
                }
            }
        }

        tracing::info!(
            "[Snapshot] {:?} of '{}': {} unchanged, {} replaced, {} added, {} removed, {} retained, {} failed",
            mode,
            snapshot.id(),
            summary.unchanged.len(),
            summary.replaced.len(),
            summary.added.len(),
            summary.removed.len(),
            summary.retained.len(),
            rollup.len()
        );

        rollup.into_result()?;
        Ok(summary)
    }
}
