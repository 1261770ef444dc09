//! Canonical (current-version) specifications accepted by the factories.
//!
//! Identity, description, ACL and configuration hints live in `CommonSpec`,
//! embedded by field in each concrete specification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::TopologyError;
use crate::topology::{AccessControlList, Direction, Properties};

/// Every id a factory accepts must hold a visible character and no control
/// characters.
pub fn check_id(entity: &str, id: &str) -> Result<(), TopologyError> {
    if id.trim().is_empty() {
        return Err(TopologyError::InvalidSpecification(format!("{} id must not be empty", entity)));
    }
    if id.chars().any(char::is_control) {
        return Err(TopologyError::InvalidSpecification(format!(
            "{} id {:?} contains control characters",
            entity, id
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonSpec {
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<AccessControlList>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration_hints: Map<String, Value>,
}

impl CommonSpec {
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            ..Self::default()
        }
    }

    pub fn hint(&self, key: &str) -> Option<&Value> {
        self.configuration_hints.get(key)
    }

    pub fn hint_str(&self, key: &str) -> Option<&str> {
        self.hint(key).and_then(Value::as_str)
    }

    /// Accepts JSON numbers and numeric strings.
    pub fn hint_u64(&self, key: &str) -> Option<u64> {
        match self.hint(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Hints flattened to strings, as stored in extension properties.
    pub fn hints_as_properties(&self) -> Properties {
        self.configuration_hints
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Shared fluent setters over the embedded `CommonSpec`.
pub trait Specification: Serialize {
    const KIND: &'static str;

    fn common(&self) -> &CommonSpec;

    fn common_mut(&mut self) -> &mut CommonSpec;

    fn topic_id(&self) -> &str {
        &self.common().topic_id
    }

    /// Checks every id the specification names.
    fn validate(&self) -> Result<(), TopologyError> {
        check_id("topic", self.topic_id())
    }

    fn with_description(mut self, description: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.common_mut().description = Some(description.into());
        self
    }

    fn with_acl(mut self, acl: AccessControlList) -> Self
    where
        Self: Sized,
    {
        self.common_mut().acl = Some(acl);
        self
    }

    fn with_hint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self
    where
        Self: Sized,
    {
        self.common_mut().configuration_hints.insert(key.into(), value.into());
        self
    }

    /// Compact JSON rendering used in error messages and logs.
    fn summary(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("<{} specification>", Self::KIND))
    }
}

// ==========================================
// TOPIC
// ==========================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicSpecification {
    #[serde(flatten)]
    pub common: CommonSpec,
    #[serde(default)]
    pub create_defaults: bool,
}

impl TopicSpecification {
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            common: CommonSpec::new(topic_id),
            create_defaults: false,
        }
    }

    pub fn with_defaults(mut self, create_defaults: bool) -> Self {
        self.create_defaults = create_defaults;
        self
    }
}

impl Specification for TopicSpecification {
    const KIND: &'static str = "topic";

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonSpec {
        &mut self.common
    }
}

// ==========================================
// GROUP
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpecification {
    #[serde(flatten)]
    pub common: CommonSpec,
    pub group_id: String,
    pub direction: Direction,
    pub protocol: String,
}

impl GroupSpecification {
    pub fn new(
        topic_id: impl Into<String>,
        group_id: impl Into<String>,
        direction: Direction,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            common: CommonSpec::new(topic_id),
            group_id: group_id.into(),
            direction,
            protocol: protocol.into(),
        }
    }

    pub fn producer(topic_id: impl Into<String>, group_id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self::new(topic_id, group_id, Direction::Producer, protocol)
    }

    pub fn consumer(topic_id: impl Into<String>, group_id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self::new(topic_id, group_id, Direction::Consumer, protocol)
    }
}

impl Specification for GroupSpecification {
    const KIND: &'static str = "group";

    fn validate(&self) -> Result<(), TopologyError> {
        check_id("topic", self.topic_id())?;
        check_id("group", &self.group_id)
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonSpec {
        &mut self.common
    }
}

// ==========================================
// CONNECTOR
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpecification {
    #[serde(flatten)]
    pub common: CommonSpec,
    pub connector_id: String,
    pub producer_group_id: String,
    pub consumer_group_id: String,
}

impl ConnectorSpecification {
    pub fn new(
        topic_id: impl Into<String>,
        connector_id: impl Into<String>,
        producer_group_id: impl Into<String>,
        consumer_group_id: impl Into<String>,
    ) -> Self {
        Self {
            common: CommonSpec::new(topic_id),
            connector_id: connector_id.into(),
            producer_group_id: producer_group_id.into(),
            consumer_group_id: consumer_group_id.into(),
        }
    }
}

impl Specification for ConnectorSpecification {
    const KIND: &'static str = "connector";

    fn validate(&self) -> Result<(), TopologyError> {
        check_id("topic", self.topic_id())?;
        check_id("connector", &self.connector_id)?;
        check_id("group", &self.producer_group_id)?;
        check_id("group", &self.consumer_group_id)
    }

    fn common(&self) -> &CommonSpec {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonSpec {
        &mut self.common
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hints_accept_numbers_and_numeric_strings() {
        let spec = GroupSpecification::producer("orders", "billing", "local")
            .with_hint("partitions", 3)
            .with_hint("replicas", "2")
            .with_hint("durable", true);

        assert_eq!(spec.common.hint_u64("partitions"), Some(3));
        assert_eq!(spec.common.hint_u64("replicas"), Some(2));
        assert_eq!(spec.common.hint_u64("durable"), None);
        assert_eq!(spec.common.hint_u64("missing"), None);
    }

    #[test]
    fn hints_flatten_to_string_properties() {
        let spec = TopicSpecification::new("orders")
            .with_hint("region", "eu-west")
            .with_hint("retention", 60);

        let properties = spec.common.hints_as_properties();
        assert_eq!(properties.get("region").map(String::as_str), Some("eu-west"));
        assert_eq!(properties.get("retention").map(String::as_str), Some("60"));
    }

    #[test]
    fn every_named_id_is_checked() {
        assert!(GroupSpecification::producer("orders", "eu/in", "local").validate().is_ok());
        assert!(GroupSpecification::producer("orders", " ", "local").validate().is_err());
        assert!(GroupSpecification::producer("", "in", "local").validate().is_err());
        assert!(ConnectorSpecification::new("orders", "", "in", "out").validate().is_err());
        assert!(ConnectorSpecification::new("orders", "bridge", "in", "").validate().is_err());

        let err = TopicSpecification::new("ord\nrs").validate().unwrap_err();
        assert!(matches!(err, TopologyError::InvalidSpecification(ref msg) if msg.contains("control")));
    }

    #[test]
    fn common_fields_are_flattened_on_the_wire() {
        let spec = ConnectorSpecification::new("orders", "bridge", "in", "out").with_description("main path");
        let wire = serde_json::to_value(&spec).unwrap();

        assert_eq!(
            wire,
            json!({
                "topic_id": "orders",
                "description": "main path",
                "connector_id": "bridge",
                "producer_group_id": "in",
                "consumer_group_id": "out"
            })
        );
    }
}
