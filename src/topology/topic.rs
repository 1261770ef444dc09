//! Topic: the root routing namespace.
//!
//! Owns disjoint id spaces of producer groups, consumer groups and
//! connectors. Group ids are unique across both directions.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::errors::TopologyError;
use crate::events::EventBus;
use crate::persistence::TopicTree;
use crate::topology::acl::AccessControlList;
use crate::topology::driver::Properties;
use crate::topology::filtering::{GroupRoute, RouteFilterResults, RouteRequirements};
use crate::topology::{Connector, Direction, Group};

/// ACL operation checked by `Topic::filter`.
pub const ROUTE_OPERATION: &str = "route";

pub struct Topic {
    id: String,
    description: RwLock<Option<String>>,
    acl: RwLock<Option<AccessControlList>>,
    extensions: RwLock<Properties>,
    producer_groups: DashMap<String, Arc<Group>>,
    consumer_groups: DashMap<String, Arc<Group>>,
    connectors: DashMap<String, Arc<Connector>>,
    // Serializes adds/removes across the three collections.
    structure: Mutex<()>,
    // Set by a completed cleanup; adds are refused until the next setup.
    retired: AtomicBool,
    bus: Arc<EventBus>,
}

impl Topic {
    pub const KIND: &'static str = "basic";

    pub fn new(bus: Arc<EventBus>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: RwLock::new(None),
            acl: RwLock::new(None),
            extensions: RwLock::new(Properties::new()),
            producer_groups: DashMap::new(),
            consumer_groups: DashMap::new(),
            connectors: DashMap::new(),
            structure: Mutex::new(()),
            retired: AtomicBool::new(false),
            bus,
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        *self.description.write() = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        Self::KIND
    }

    pub fn description(&self) -> Option<String> {
        self.description.read().clone()
    }

    pub fn set_description(&self, description: Option<String>) {
        *self.description.write() = description;
    }

    pub fn acl(&self) -> Option<AccessControlList> {
        self.acl.read().clone()
    }

    pub fn set_acl(&self, acl: Option<AccessControlList>) {
        *self.acl.write() = acl;
    }

    pub fn extension_properties(&self) -> Properties {
        self.extensions.read().clone()
    }

    pub fn set_extension_properties(&self, properties: Properties) {
        *self.extensions.write() = properties;
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // ==========================================
    // GROUPS
    // ==========================================

    fn groups_of(&self, direction: Direction) -> &DashMap<String, Arc<Group>> {
        match direction {
            Direction::Producer => &self.producer_groups,
            Direction::Consumer => &self.consumer_groups,
        }
    }

    pub fn group(&self, direction: Direction, group_id: &str) -> Result<Arc<Group>, TopologyError> {
        self.groups_of(direction)
            .get(group_id)
            .map(|g| Arc::clone(g.value()))
            .ok_or_else(|| TopologyError::GroupNotExist {
                topic_id: self.id.clone(),
                group_id: group_id.to_string(),
                direction,
            })
    }

    pub fn producer_group(&self, group_id: &str) -> Result<Arc<Group>, TopologyError> {
        self.group(Direction::Producer, group_id)
    }

    pub fn consumer_group(&self, group_id: &str) -> Result<Arc<Group>, TopologyError> {
        self.group(Direction::Consumer, group_id)
    }

    /// Sorted by group id.
    pub fn groups(&self, direction: Direction) -> Vec<Arc<Group>> {
        let mut groups: Vec<Arc<Group>> = self
            .groups_of(direction)
            .iter()
            .map(|g| Arc::clone(g.value()))
            .collect();
        groups.sort_by(|a, b| a.id().cmp(b.id()));
        groups
    }

    pub fn producer_groups(&self) -> Vec<Arc<Group>> {
        self.groups(Direction::Producer)
    }

    pub fn consumer_groups(&self) -> Vec<Arc<Group>> {
        self.groups(Direction::Consumer)
    }

    pub fn group_ids(&self, direction: Direction) -> BTreeSet<String> {
        self.groups_of(direction).iter().map(|g| g.key().clone()).collect()
    }

    fn group_id_taken(&self, group_id: &str) -> Option<Direction> {
        if self.producer_groups.contains_key(group_id) {
            Some(Direction::Producer)
        } else if self.consumer_groups.contains_key(group_id) {
            Some(Direction::Consumer)
        } else {
            None
        }
    }

    /// Provisions the group (and the partitions it already holds), then publishes it.
    pub fn add_group(&self, group: Arc<Group>) -> Result<Arc<Group>, TopologyError> {
        self.check_owner("group", group.topic_id())?;
        {
            let _guard = self.structure.lock();
            self.check_open()?;
            if let Some(direction) = self.group_id_taken(group.id()) {
                return Err(TopologyError::GroupAlreadyExists {
                    topic_id: self.id.clone(),
                    group_id: group.id().to_string(),
                    direction,
                });
            }
            group.setup()?;
            self.groups_of(group.direction())
                .insert(group.id().to_string(), Arc::clone(&group));
        }

        tracing::info!("[Topic] {}: added {} group '{}'", self.id, group.direction(), group.id());
        self.bus.groups.fire_added(&group);
        self.bus.topics.fire_save_requested(self);
        Ok(group)
    }

    /// Refuses while a connector still references the group.
    pub fn remove_group(&self, direction: Direction, group_id: &str) -> Result<Arc<Group>, TopologyError> {
        let group = {
            let _guard = self.structure.lock();
            self.take_group(direction, group_id)?
        };
        self.announce_group_removed(&group);
        self.bus.topics.fire_save_requested(self);
        Ok(group)
    }

    // Caller holds `structure`.
    fn take_group(&self, direction: Direction, group_id: &str) -> Result<Arc<Group>, TopologyError> {
        let group = self.group(direction, group_id)?;
        if let Some(connector) = self.connectors.iter().find(|c| c.references(group_id)) {
            return Err(TopologyError::GroupInUse {
                topic_id: self.id.clone(),
                group_id: group_id.to_string(),
                connector_id: connector.key().clone(),
            });
        }
        group.cleanup()?;
        self.groups_of(direction).remove(group_id);
        Ok(group)
    }

    fn announce_group_removed(&self, group: &Group) {
        tracing::info!("[Topic] {}: removed {} group '{}'", self.id, group.direction(), group.id());
        self.bus.groups.fire_removed(group);
    }

    /// Places an already-built group without provisioning or events.
    pub fn attach_group(&self, group: Arc<Group>) -> Result<(), TopologyError> {
        self.check_owner("group", group.topic_id())?;
        let _guard = self.structure.lock();
        if let Some(direction) = self.group_id_taken(group.id()) {
            return Err(TopologyError::GroupAlreadyExists {
                topic_id: self.id.clone(),
                group_id: group.id().to_string(),
                direction,
            });
        }
        self.groups_of(group.direction())
            .insert(group.id().to_string(), group);
        Ok(())
    }

    // ==========================================
    // CONNECTORS
    // ==========================================

    pub fn connector(&self, connector_id: &str) -> Result<Arc<Connector>, TopologyError> {
        self.connectors
            .get(connector_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| TopologyError::ConnectorNotExist {
                topic_id: self.id.clone(),
                connector_id: connector_id.to_string(),
            })
    }

    /// Sorted by connector id.
    pub fn connectors(&self) -> Vec<Arc<Connector>> {
        let mut connectors: Vec<Arc<Connector>> =
            self.connectors.iter().map(|c| Arc::clone(c.value())).collect();
        connectors.sort_by(|a, b| a.id().cmp(b.id()));
        connectors
    }

    pub fn connector_ids(&self) -> BTreeSet<String> {
        self.connectors.iter().map(|c| c.key().clone()).collect()
    }

    pub fn add_connector(&self, connector: Arc<Connector>) -> Result<Arc<Connector>, TopologyError> {
        self.check_owner("connector", connector.topic_id())?;
        {
            let _guard = self.structure.lock();
            self.check_open()?;
            if self.connectors.contains_key(connector.id()) {
                return Err(TopologyError::ConnectorAlreadyExists {
                    topic_id: self.id.clone(),
                    connector_id: connector.id().to_string(),
                });
            }
            self.check_connector_groups(&connector)?;
            connector.setup()?;
            self.connectors
                .insert(connector.id().to_string(), Arc::clone(&connector));
        }

        tracing::info!("[Topic] {}: added connector '{}'", self.id, connector.id());
        self.bus.connectors.fire_added(&connector);
        self.bus.topics.fire_save_requested(self);
        Ok(connector)
    }

    pub fn remove_connector(&self, connector_id: &str) -> Result<Arc<Connector>, TopologyError> {
        let connector = {
            let _guard = self.structure.lock();
            self.take_connector(connector_id)?
        };
        self.announce_connector_removed(&connector);
        self.bus.topics.fire_save_requested(self);
        Ok(connector)
    }

    // Caller holds `structure`.
    fn take_connector(&self, connector_id: &str) -> Result<Arc<Connector>, TopologyError> {
        let connector = self.connector(connector_id)?;
        connector.cleanup()?;
        self.connectors.remove(connector_id);
        Ok(connector)
    }

    fn announce_connector_removed(&self, connector: &Connector) {
        tracing::info!("[Topic] {}: removed connector '{}'", self.id, connector.id());
        self.bus.connectors.fire_removed(connector);
    }

    /// Places an already-built connector without provisioning or events.
    pub fn attach_connector(&self, connector: Arc<Connector>) -> Result<(), TopologyError> {
        self.check_owner("connector", connector.topic_id())?;
        let _guard = self.structure.lock();
        if self.connectors.contains_key(connector.id()) {
            return Err(TopologyError::ConnectorAlreadyExists {
                topic_id: self.id.clone(),
                connector_id: connector.id().to_string(),
            });
        }
        self.check_connector_groups(&connector)?;
        self.connectors
            .insert(connector.id().to_string(), connector);
        Ok(())
    }

    fn check_connector_groups(&self, connector: &Connector) -> Result<(), TopologyError> {
        self.producer_group(connector.producer_group().id())?;
        self.consumer_group(connector.consumer_group().id())?;
        Ok(())
    }

    fn check_open(&self) -> Result<(), TopologyError> {
        if self.retired.load(Ordering::SeqCst) {
            return Err(TopologyError::TopicNotExist {
                topic_id: self.id.clone(),
            });
        }
        Ok(())
    }

    fn check_owner(&self, entity: &'static str, topic_id: &str) -> Result<(), TopologyError> {
        if topic_id != self.id {
            return Err(TopologyError::StateMismatch {
                entity,
                expected: self.id.clone(),
                found: topic_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // LIFECYCLE
    // ==========================================

    /// Provisions every child already held: producer groups, consumer
    /// groups, then connectors. Reopens a retired topic.
    pub fn setup(&self) -> Result<(), TopologyError> {
        self.retired.store(false, Ordering::SeqCst);
        for group in self.producer_groups() {
            group.setup()?;
        }
        for group in self.consumer_groups() {
            group.setup()?;
        }
        for connector in self.connectors() {
            connector.setup()?;
        }
        Ok(())
    }

    /// Removes every child: connectors first (stop traffic), then producer
    /// groups, then consumer groups. Stops at the first failure.
    ///
    /// The whole pass holds the structure lock, so nothing can be added in
    /// between phases. On success the topic is retired and refuses further
    /// adds. Removal events fire once the lock is released, including for
    /// children removed before a failure.
    pub fn cleanup(&self) -> Result<(), TopologyError> {
        let mut connectors = Vec::new();
        let mut groups = Vec::new();

        let outcome = {
            let _guard = self.structure.lock();
            let outcome = self.take_all(&mut connectors, &mut groups);
            if outcome.is_ok() {
                self.retired.store(true, Ordering::SeqCst);
            }
            outcome
        };

        for connector in &connectors {
            self.announce_connector_removed(connector);
        }
        for group in &groups {
            self.announce_group_removed(group);
        }
        if !connectors.is_empty() || !groups.is_empty() {
            self.bus.topics.fire_save_requested(self);
        }
        outcome
    }

    // Caller holds `structure`.
    fn take_all(
        &self,
        connectors: &mut Vec<Arc<Connector>>,
        groups: &mut Vec<Arc<Group>>,
    ) -> Result<(), TopologyError> {
        for connector_id in self.connector_ids() {
            connectors.push(self.take_connector(&connector_id)?);
        }
        for direction in [Direction::Producer, Direction::Consumer] {
            for group_id in self.group_ids(direction) {
                groups.push(self.take_group(direction, &group_id)?);
            }
        }
        Ok(())
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub fn filter(&self, requirements: &RouteRequirements) -> Result<RouteFilterResults, TopologyError> {
        if let (Some(actor), Some(acl)) = (requirements.actor.as_deref(), self.acl()) {
            if !acl.is_allowed(ROUTE_OPERATION, actor) {
                return Err(TopologyError::AccessDenied {
                    topic_id: self.id.clone(),
                    operation: ROUTE_OPERATION.to_string(),
                    actor: actor.to_string(),
                });
            }
        }

        let routes = |groups: Vec<Arc<Group>>| -> Vec<GroupRoute> {
            groups
                .into_iter()
                .filter_map(|group| {
                    let partitions = group.filter(requirements);
                    (!partitions.is_empty()).then(|| GroupRoute {
                        group_id: group.id().to_string(),
                        partitions,
                    })
                })
                .collect()
        };

        Ok(RouteFilterResults {
            producers: routes(self.producer_groups()),
            consumers: routes(self.consumer_groups()),
        })
    }

    /// Requests a save of every descendant and then of the topic itself.
    pub fn save(&self) {
        for group in self.producer_groups().into_iter().chain(self.consumer_groups()) {
            group.save();
        }
        for connector in self.connectors() {
            self.bus.connectors.fire_save_requested(&connector);
        }
        self.bus.topics.fire_save_requested(self);
    }

    /// Full value view: topic, groups with partitions, connectors.
    pub fn tree(&self) -> TopicTree {
        TopicTree::capture(self)
    }
}

/// Value equality over the dehydrated tree. Runtime states are ignored.
impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.tree() == other.tree()
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("id", &self.id)
            .field("description", &self.description())
            .field("producer_groups", &self.group_ids(Direction::Producer))
            .field("consumer_groups", &self.group_ids(Direction::Consumer))
            .field("connectors", &self.connector_ids())
            .finish()
    }
}
