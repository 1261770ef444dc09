//! Point-in-time captures of the registry, and reconciliation back into it.
//!
//! - `types`: in-memory snapshot and its serializable document
//! - `serializer`: pluggable formats
//! - `store`: instance records + latest pointer on disk
//! - `snapshot_manager`: export, retrieval, merge/overwrite
//! - `health`: staleness check

pub mod health;
pub mod serializer;
pub mod snapshot_manager;
pub mod store;
pub mod types;

pub use health::{SnapshotHealth, SnapshotHealthCheck};
pub use serializer::{JsonSnapshotSerializer, SnapshotSerializer};
pub use snapshot_manager::{ReconcileMode, ReconciliationSummary, SnapshotManager};
pub use store::{FileSystemSnapshotStore, SnapshotStore};
pub use types::{Snapshot, SnapshotDescriptor, SnapshotDocument};
