pub mod config;
pub mod errors;
pub mod events;
pub mod factory;
pub mod persistence;
pub mod protocols;
pub mod registry;
pub mod snapshot;
pub mod topology;
pub mod utils;

use std::sync::Arc;

use anyhow::Context;

use crate::config::{Config, FactoryConfig, PersistenceBackend};
use crate::errors::{PersistenceError, TopologyError};
use crate::events::EventBus;
use crate::factory::{ConnectorFactory, GroupFactory, TopicFactory};
use crate::persistence::{DriverCatalog, Hydrator, PersistenceManager, PersistenceObservers};
use crate::protocols::local::{register_local_protocol, LocalConnectorDelegate, LocalGroupDelegate, LocalTransport};
use crate::registry::TopicRegistry;
use crate::snapshot::{
    FileSystemSnapshotStore, JsonSnapshotSerializer, SnapshotHealthCheck, SnapshotManager, SnapshotStore,
};

// ========================================
// ENGINE
// ========================================

/// Everything one control-plane instance needs, wired around a single event bus.
/// Cheap to clone (all fields are Arcs).
#[derive(Clone)]
pub struct Engine {
    pub bus: Arc<EventBus>,
    pub catalog: Arc<DriverCatalog>,
    pub hydrator: Arc<Hydrator>,
    pub persistence: Arc<PersistenceManager>,
    pub observers: Arc<PersistenceObservers>,
    pub registry: Arc<TopicRegistry>,
    pub groups: Arc<GroupFactory>,
    pub connectors: Arc<ConnectorFactory>,
    pub topics: Arc<TopicFactory>,
    pub snapshots: Arc<SnapshotManager>,
    pub health: Arc<SnapshotHealthCheck>,
    pub transport: Arc<LocalTransport>,
}

impl Engine {
    /// Production wiring: persisters and snapshot directory from config,
    /// registry warm-started from the persisters.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let persistence = match config.persistence.backend {
            PersistenceBackend::Memory => PersistenceManager::in_memory(),
            PersistenceBackend::Sqlite => PersistenceManager::sqlite(&config.persistence.sqlite_path)
                .with_context(|| format!("opening sqlite store at {}", config.persistence.sqlite_path))?,
        };
        let store = FileSystemSnapshotStore::new(
            config.snapshot.directory.as_str(),
            Box::new(JsonSnapshotSerializer::new()),
        )
        .with_context(|| format!("opening snapshot directory {}", config.snapshot.directory))?;

        let engine = Self::with_parts(
            Arc::new(persistence),
            Box::new(store),
            config.factory.clone(),
            config.snapshot.stale_threshold_ms,
        )?;
        Ok(engine)
    }

    pub fn with_parts(
        persistence: Arc<PersistenceManager>,
        store: Box<dyn SnapshotStore>,
        factory: FactoryConfig,
        stale_threshold_ms: i64,
    ) -> Result<Self, PersistenceError> {
        let bus = EventBus::shared();
        let transport = LocalTransport::shared();

        let catalog = Arc::new(DriverCatalog::new());
        register_local_protocol(&catalog, Arc::clone(&transport));
        let hydrator = Arc::new(Hydrator::new(Arc::clone(&bus), Arc::clone(&catalog)));

        let observers = Arc::new(PersistenceObservers::install(&bus, &persistence));
        let registry = Arc::new(TopicRegistry::load(
            Arc::clone(&bus),
            Arc::clone(&persistence),
            &hydrator,
        )?);

        let groups = Arc::new(GroupFactory::new(Arc::clone(&registry)));
        groups.add_delegate(Arc::new(LocalGroupDelegate::new(
            Arc::clone(&transport),
            factory.default_partitions,
        )));
        let connectors = Arc::new(ConnectorFactory::new(Arc::clone(&registry)));
        connectors.add_delegate(Arc::new(LocalConnectorDelegate::new(Arc::clone(&transport))));
        let topics = Arc::new(TopicFactory::new(
            Arc::clone(&registry),
            Arc::clone(&groups),
            Arc::clone(&connectors),
            factory,
        ));

        let snapshots = Arc::new(SnapshotManager::new(Arc::clone(&registry), Arc::clone(&hydrator), store));
        let health = Arc::new(SnapshotHealthCheck::new(
            Arc::clone(&registry),
            Arc::clone(&snapshots),
            stale_threshold_ms,
        ));

        tracing::info!("[Engine] Ready with {} topic(s)", registry.len());
        Ok(Self {
            bus,
            catalog,
            hydrator,
            persistence,
            observers,
            registry,
            groups,
            connectors,
            topics,
            snapshots,
            health,
            transport,
        })
    }

    /// Provisions every registered topic again, e.g. after a warm start
    /// against a fresh transport. Returns the failures; the rest stay provisioned.
    pub fn reprovision(&self) -> Vec<(String, TopologyError)> {
        let mut failures = Vec::new();
        for topic in self.registry.entries() {
            if let Err(e) = topic.setup() {
                tracing::warn!("[Engine] Re-provisioning topic '{}' failed: {}", topic.id(), e);
                failures.push((topic.id().to_string(), e));
            }
        }
        failures
    }
}
