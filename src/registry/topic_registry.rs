//! Topic Registry: the root of the live graph.
//!
//! Registry-level mutations run under a reentrant lock so snapshot
//! reconciliation can hold it across a whole pass while still calling
//! `register`/`unregister`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::errors::{PersistenceError, TopologyError};
use crate::events::EventBus;
use crate::persistence::{keys, Hydrator, PersistenceManager};
use crate::topology::Topic;
use crate::utils::current_time_ms;

pub struct TopicRegistry {
    topics: DashMap<String, Arc<Topic>>,
    lock: ReentrantMutex<()>,
    last_modified: AtomicI64,
    bus: Arc<EventBus>,
    persistence: Option<Arc<PersistenceManager>>,
}

impl TopicRegistry {
    /// Registry without persistence.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            topics: DashMap::new(),
            lock: ReentrantMutex::new(()),
            last_modified: AtomicI64::new(-1),
            bus,
            persistence: None,
        }
    }

    pub fn with_persistence(bus: Arc<EventBus>, persistence: Arc<PersistenceManager>) -> Self {
        Self {
            persistence: Some(persistence),
            ..Self::new(bus)
        }
    }

    /// Warm start: hydrates every persisted topic without re-provisioning.
    /// Topics that fail to hydrate are logged and skipped.
    pub fn load(
        bus: Arc<EventBus>,
        persistence: Arc<PersistenceManager>,
        hydrator: &Hydrator,
    ) -> Result<Self, PersistenceError> {
        let registry = Self::with_persistence(bus, Arc::clone(&persistence));

        for topic_id in persistence.topic_ids()? {
            match hydrator.hydrate_topic(&topic_id, persistence.as_ref()) {
                Ok(topic) => {
                    registry.topics.insert(topic_id.clone(), topic);
                    tracing::info!("[Registry] Warm start: restored topic '{}'", topic_id);
                }
                Err(e) => {
                    tracing::error!("[Registry] Warm start: skipping topic '{}': {}", topic_id, e);
                }
            }
        }

        if !registry.topics.is_empty() {
            registry.mark_modified();
        }
        Ok(registry)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn persistence(&self) -> Option<&Arc<PersistenceManager>> {
        self.persistence.as_ref()
    }

    // ==========================================
    // QUERIES
    // ==========================================

    pub fn get(&self, topic_id: &str) -> Result<Arc<Topic>, TopologyError> {
        self.topics
            .get(topic_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| TopologyError::TopicNotExist {
                topic_id: topic_id.to_string(),
            })
    }

    pub fn exists(&self, topic_id: &str) -> bool {
        self.topics.contains_key(topic_id)
    }

    /// Sorted by topic id.
    pub fn entries(&self) -> Vec<Arc<Topic>> {
        let mut topics: Vec<Arc<Topic>> = self.topics.iter().map(|t| Arc::clone(t.value())).collect();
        topics.sort_by(|a, b| a.id().cmp(b.id()));
        topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Milliseconds of the last registry change, -1 if never changed.
    pub fn last_modified(&self) -> i64 {
        self.last_modified.load(Ordering::SeqCst)
    }

    /// Advances `last_modified`, strictly increasing even within one millisecond.
    pub fn mark_modified(&self) {
        let now = current_time_ms();
        let mut previous = self.last_modified.load(Ordering::SeqCst);
        loop {
            let next = now.max(previous + 1);
            match self
                .last_modified
                .compare_exchange(previous, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(actual) => previous = actual,
            }
        }
    }

    /// Serializes against `register`/`unregister` for as long as it is held.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    // ==========================================
    // MUTATIONS
    // ==========================================

    /// setup -> persist -> publish -> fire `on_added`.
    pub fn register(&self, topic: Arc<Topic>) -> Result<(), TopologyError> {
        let _guard = self.lock.lock();
        if self.topics.contains_key(topic.id()) {
            return Err(TopologyError::TopicAlreadyExists {
                topic_id: topic.id().to_string(),
            });
        }

        topic.setup()?;

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save_tree(&topic) {
                tracing::error!("[Registry] Failed to persist topic '{}': {}", topic.id(), e);
                if let Err(cleanup) = topic.cleanup() {
                    tracing::warn!("[Registry] Rollback of topic '{}' incomplete: {}", topic.id(), cleanup);
                }
                return Err(e.into());
            }
        }

        self.topics.insert(topic.id().to_string(), Arc::clone(&topic));
        tracing::info!("[Registry] Registered topic '{}'", topic.id());
        self.bus.topics.fire_added(&topic);
        self.mark_modified();
        Ok(())
    }

    /// cleanup -> unpublish -> drop record -> fire `on_removed`.
    /// A failed cleanup leaves the topic registered.
    pub fn unregister(&self, topic_id: &str) -> Result<Arc<Topic>, TopologyError> {
        let _guard = self.lock.lock();
        let topic = self.get(topic_id)?;

        topic.cleanup()?;
        self.topics.remove(topic_id);

        if let Some(persistence) = &self.persistence {
            match persistence.topics.remove(&keys::topic(topic_id)) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::error!("[Registry] Failed to delete record of topic '{}': {}", topic_id, e),
            }
        }

        tracing::info!("[Registry] Unregistered topic '{}'", topic_id);
        self.bus.topics.fire_removed(&topic);
        self.mark_modified();
        Ok(topic)
    }
}
