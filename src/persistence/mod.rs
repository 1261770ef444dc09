//! Hydrate/Dehydrate persistence.
//!
//! - `types`: dehydrated states, record keys, topic trees
//! - `persister`: persister contract + in-memory backend
//! - `sqlite`: SQLite backend
//! - `observers`: event-driven persistence
//! - `catalog` / `hydrator`: rebuilding live graphs

pub mod catalog;
pub mod hydrator;
pub mod manager;
pub mod observers;
pub mod persistable;
pub mod persister;
pub mod sqlite;
pub mod types;

pub use catalog::DriverCatalog;
pub use hydrator::Hydrator;
pub use manager::PersistenceManager;
pub use observers::PersistenceObservers;
pub use persistable::Persistable;
pub use persister::{MemoryPersister, StatePersister};
pub use sqlite::{SqlitePersister, SqliteStore};
pub use types::{
    keys, DehydratedConnector, DehydratedGroup, DehydratedPartition, DehydratedTopic, GroupTree,
    StateHeader, StateRecord, StateSource, TopicTree,
};
