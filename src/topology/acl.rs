use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Allow/deny lists for one operation. An empty allow list admits everyone
/// not explicitly denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allow: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub deny: BTreeSet<String>,
}

impl AccessRule {
    pub fn allowing<I, S>(actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: actors.into_iter().map(Into::into).collect(),
            deny: BTreeSet::new(),
        }
    }

    pub fn denying<I, S>(actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: BTreeSet::new(),
            deny: actors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admits(&self, actor: &str) -> bool {
        if self.deny.contains(actor) {
            return false;
        }
        self.allow.is_empty() || self.allow.contains(actor)
    }
}

/// Operation name -> rule. Operations without a rule are open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControlList {
    rules: BTreeMap<String, AccessRule>,
}

impl AccessControlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, operation: impl Into<String>, rule: AccessRule) -> Self {
        self.rules.insert(operation.into(), rule);
        self
    }

    pub fn set_rule(&mut self, operation: impl Into<String>, rule: AccessRule) {
        self.rules.insert(operation.into(), rule);
    }

    pub fn rule(&self, operation: &str) -> Option<&AccessRule> {
        self.rules.get(operation)
    }

    pub fn remove_rule(&mut self, operation: &str) -> bool {
        self.rules.remove(operation).is_some()
    }

    pub fn is_allowed(&self, operation: &str, actor: &str) -> bool {
        self.rules
            .get(operation)
            .map_or(true, |rule| rule.admits(actor))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
