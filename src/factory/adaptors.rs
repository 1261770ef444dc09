//! Version adaptors: turn a versioned wire body into a canonical specification.
//!
//! A chain tries its adaptors most-preferred-first and falls back to the
//! designated latest adaptor when nothing claims the version.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::TopologyError;
use crate::factory::specification::{
    CommonSpec, ConnectorSpecification, GroupSpecification, TopicSpecification,
};
use crate::topology::{AccessControlList, Direction};

pub const CURRENT_VERSION: &str = "4.0.0";
pub const LEGACY_VERSION: &str = "3.3.0";

pub trait SpecificationAdaptor<S>: Send + Sync {
    fn version(&self) -> &str;

    fn can_adapt(&self, version: &str) -> bool {
        version == self.version()
    }

    fn adapt(&self, body: &Value) -> Result<S, TopologyError>;
}

fn decode<W: DeserializeOwned>(version: &str, body: &Value) -> Result<W, TopologyError> {
    W::deserialize(body).map_err(|e| {
        TopologyError::InvalidSpecification(format!("cannot read a {} body: {}", version, e))
    })
}

/// Reads the canonical snake_case body as is.
pub struct CurrentAdaptor<S> {
    _marker: PhantomData<fn() -> S>,
}

impl<S> CurrentAdaptor<S> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<S> Default for CurrentAdaptor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: DeserializeOwned> SpecificationAdaptor<S> for CurrentAdaptor<S> {
    fn version(&self) -> &str {
        CURRENT_VERSION
    }

    fn adapt(&self, body: &Value) -> Result<S, TopologyError> {
        decode(CURRENT_VERSION, body)
    }
}

// ==========================================
// 3.3.0 WIRE FORMAT
// ==========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCommon {
    topic_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    access_control_list: Option<AccessControlList>,
    #[serde(default)]
    configuration_hints: Map<String, Value>,
}

impl From<LegacyCommon> for CommonSpec {
    fn from(legacy: LegacyCommon) -> Self {
        Self {
            topic_id: legacy.topic_id,
            description: legacy.description,
            acl: legacy.access_control_list,
            configuration_hints: legacy.configuration_hints,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTopic {
    #[serde(flatten)]
    common: LegacyCommon,
    #[serde(default)]
    create_defaults: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyGroup {
    #[serde(flatten)]
    common: LegacyCommon,
    group_id: String,
    #[serde(default)]
    is_consumer_group: bool,
    protocol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConnector {
    #[serde(flatten)]
    common: LegacyCommon,
    connector_id: String,
    producer_group_id: String,
    consumer_group_id: String,
}

#[derive(Debug, Default)]
pub struct LegacyTopicAdaptor;

impl SpecificationAdaptor<TopicSpecification> for LegacyTopicAdaptor {
    fn version(&self) -> &str {
        LEGACY_VERSION
    }

    fn adapt(&self, body: &Value) -> Result<TopicSpecification, TopologyError> {
        let wire: LegacyTopic = decode(LEGACY_VERSION, body)?;
        Ok(TopicSpecification {
            common: wire.common.into(),
            create_defaults: wire.create_defaults,
        })
    }
}

#[derive(Debug, Default)]
pub struct LegacyGroupAdaptor;

impl SpecificationAdaptor<GroupSpecification> for LegacyGroupAdaptor {
    fn version(&self) -> &str {
        LEGACY_VERSION
    }

    fn adapt(&self, body: &Value) -> Result<GroupSpecification, TopologyError> {
        let wire: LegacyGroup = decode(LEGACY_VERSION, body)?;
        let direction = if wire.is_consumer_group {
            Direction::Consumer
        } else {
            Direction::Producer
        };
        Ok(GroupSpecification {
            common: wire.common.into(),
            group_id: wire.group_id,
            direction,
            protocol: wire.protocol,
        })
    }
}

#[derive(Debug, Default)]
pub struct LegacyConnectorAdaptor;

impl SpecificationAdaptor<ConnectorSpecification> for LegacyConnectorAdaptor {
    fn version(&self) -> &str {
        LEGACY_VERSION
    }

    fn adapt(&self, body: &Value) -> Result<ConnectorSpecification, TopologyError> {
        let wire: LegacyConnector = decode(LEGACY_VERSION, body)?;
        Ok(ConnectorSpecification {
            common: wire.common.into(),
            connector_id: wire.connector_id,
            producer_group_id: wire.producer_group_id,
            consumer_group_id: wire.consumer_group_id,
        })
    }
}

// ==========================================
// CHAIN
// ==========================================

pub struct AdaptorChain<S> {
    latest: Box<dyn SpecificationAdaptor<S>>,
    adaptors: Vec<Box<dyn SpecificationAdaptor<S>>>,
}

impl<S> AdaptorChain<S> {
    pub fn new(latest: impl SpecificationAdaptor<S> + 'static) -> Self {
        Self {
            latest: Box::new(latest),
            adaptors: Vec::new(),
        }
    }

    /// Appends an adaptor; earlier ones are preferred.
    pub fn with(mut self, adaptor: impl SpecificationAdaptor<S> + 'static) -> Self {
        self.adaptors.push(Box::new(adaptor));
        self
    }

    pub fn versions(&self) -> Vec<&str> {
        std::iter::once(&self.latest)
            .chain(self.adaptors.iter())
            .map(|a| a.version())
            .collect()
    }

    /// No version, or one nobody claims, selects the latest adaptor.
    pub fn select(&self, version: Option<&str>) -> &dyn SpecificationAdaptor<S> {
        let Some(version) = version else {
            return self.latest.as_ref();
        };
        std::iter::once(&self.latest)
            .chain(self.adaptors.iter())
            .find(|a| a.can_adapt(version))
            .unwrap_or(&self.latest)
            .as_ref()
    }

    pub fn adapt(&self, version: Option<&str>, body: &Value) -> Result<S, TopologyError> {
        let adaptor = self.select(version);
        tracing::debug!(
            "[Adaptor] {:?} body handled by the {} adaptor",
            version.unwrap_or("unversioned"),
            adaptor.version()
        );
        adaptor.adapt(body)
    }
}

/// One chain per specification kind.
pub struct SpecificationChains {
    pub topics: AdaptorChain<TopicSpecification>,
    pub groups: AdaptorChain<GroupSpecification>,
    pub connectors: AdaptorChain<ConnectorSpecification>,
}

impl Default for SpecificationChains {
    fn default() -> Self {
        specification_chains()
    }
}

/// Current format as latest, 3.3.0 as the legacy fallback.
pub fn specification_chains() -> SpecificationChains {
    SpecificationChains {
        topics: AdaptorChain::new(CurrentAdaptor::new()).with(LegacyTopicAdaptor),
        groups: AdaptorChain::new(CurrentAdaptor::new()).with(LegacyGroupAdaptor),
        connectors: AdaptorChain::new(CurrentAdaptor::new()).with(LegacyConnectorAdaptor),
    }
}
