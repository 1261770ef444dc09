//! Lifecycle Event Bus
//!
//! One typed channel per entity kind. The bus is built once per service
//! instance and handed to the registry, factories and observers.
//!
//! Dispatch is synchronous, in the caller's thread, over a copy of the
//! listener list taken before the first call. A failing listener is logged
//! and skipped: the triggering mutation never sees listener errors.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::topology::{Connector, ConnectorState, Group, Partition, PartitionState, Topic};

/// Binds an entity type to its channel name and state type.
pub trait Lifecycle: Send + Sync + 'static {
    type State: Copy + fmt::Debug + Send + Sync + 'static;
    const CHANNEL: &'static str;
}

impl Lifecycle for Topic {
    type State = ();
    const CHANNEL: &'static str = "topic";
}

impl Lifecycle for Group {
    type State = ();
    const CHANNEL: &'static str = "group";
}

impl Lifecycle for Partition {
    type State = PartitionState;
    const CHANNEL: &'static str = "partition";
}

impl Lifecycle for Connector {
    type State = ConnectorState;
    const CHANNEL: &'static str = "connector";
}

/// Every hook defaults to a no-op so listeners only implement what they use.
pub trait LifecycleListener<E: Lifecycle>: Send + Sync {
    fn on_added(&self, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_removed(&self, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_state_change(
        &self,
        _entity: &E,
        _from: E::State,
        _to: E::State,
        _reason: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn save_requested(&self, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_saved(&self, _entity: &E) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// ==========================================
// CHANNEL
// ==========================================

pub struct Channel<E: Lifecycle> {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn LifecycleListener<E>>)>>,
    next_id: AtomicU64,
}

impl<E: Lifecycle> Channel<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn fire_added(&self, entity: &E) {
        self.dispatch("on_added", |l| l.on_added(entity));
    }

    pub fn fire_removed(&self, entity: &E) {
        self.dispatch("on_removed", |l| l.on_removed(entity));
    }

    pub fn fire_state_change(&self, entity: &E, from: E::State, to: E::State, reason: &str) {
        self.dispatch("on_state_change", |l| l.on_state_change(entity, from, to, reason));
    }

    pub fn fire_save_requested(&self, entity: &E) {
        self.dispatch("save_requested", |l| l.save_requested(entity));
    }

    pub fn fire_saved(&self, entity: &E) {
        self.dispatch("on_saved", |l| l.on_saved(entity));
    }

    fn dispatch<F>(&self, event: &'static str, call: F)
    where
        F: Fn(&dyn LifecycleListener<E>) -> anyhow::Result<()>,
    {
        // Copy out so listeners may (un)subscribe while being notified.
        let listeners: Vec<Arc<dyn LifecycleListener<E>>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if let Err(e) = call(listener.as_ref()) {
                tracing::warn!("[EventBus] {} listener failed on {}: {:#}", E::CHANNEL, event, e);
            }
        }
    }
}

impl<E: Lifecycle> Default for Channel<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// BUS
// ==========================================

#[derive(Default)]
pub struct EventBus {
    pub topics: Channel<Topic>,
    pub groups: Channel<Group>,
    pub connectors: Channel<Connector>,
    pub partitions: Channel<Partition>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}
