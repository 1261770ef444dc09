use serde::Serialize;
use serde_json::Value;

/// One property a `modify` call looked at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modification {
    pub property: String,
    pub changed: bool,
    pub old_value: Value,
    pub new_value: Value,
}

/// Ordered audit log returned by every `modify`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Modifications {
    entries: Vec<Modification>,
}

impl Modifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares the serialized forms and logs the outcome. Returns whether
    /// the property changed, so callers apply only diffs.
    pub fn record<O: Serialize, N: Serialize>(&mut self, property: impl Into<String>, old: O, new: N) -> bool {
        let old_value = serde_json::to_value(old).unwrap_or(Value::Null);
        let new_value = serde_json::to_value(new).unwrap_or(Value::Null);
        let changed = old_value != new_value;
        self.entries.push(Modification {
            property: property.into(),
            changed,
            old_value,
            new_value,
        });
        changed
    }

    pub fn push(&mut self, modification: Modification) {
        self.entries.push(modification);
    }

    pub fn extend(&mut self, other: Modifications) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Modification] {
        &self.entries
    }

    pub fn get(&self, property: &str) -> Option<&Modification> {
        self.entries.iter().find(|m| m.property == property)
    }

    pub fn changed(&self) -> impl Iterator<Item = &Modification> {
        self.entries.iter().filter(|m| m.changed)
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|m| m.changed)
    }

    /// True when nothing was changed, even if properties were inspected.
    pub fn is_empty_change(&self) -> bool {
        !self.has_changes()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_reports_only_real_changes() {
        let mut log = Modifications::new();

        assert!(!log.record("description", Some("orders"), Some("orders")));
        assert!(log.record("partitions", 2, 4));

        assert_eq!(log.len(), 2);
        assert!(log.has_changes());
        assert_eq!(log.changed().count(), 1);

        let entry = log.get("partitions").unwrap();
        assert_eq!(entry.old_value, json!(2));
        assert_eq!(entry.new_value, json!(4));
    }

    #[test]
    fn inspected_but_unchanged_is_an_empty_change() {
        let mut log = Modifications::new();
        log.record("description", None::<String>, None::<String>);

        assert!(!log.is_empty());
        assert!(log.is_empty_change());
    }
}
