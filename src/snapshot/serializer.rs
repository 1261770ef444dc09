use anyhow::Context;

use crate::snapshot::types::SnapshotDocument;

/// Pluggable snapshot format. Several may coexist, told apart by extension.
pub trait SnapshotSerializer: Send + Sync {
    fn file_extension(&self) -> &str;

    fn serialize(&self, document: &SnapshotDocument) -> anyhow::Result<String>;

    fn deserialize(&self, raw: &str) -> anyhow::Result<SnapshotDocument>;
}

pub struct JsonSnapshotSerializer {
    pretty: bool,
}

impl JsonSnapshotSerializer {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonSnapshotSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSerializer for JsonSnapshotSerializer {
    fn file_extension(&self) -> &str {
        "json"
    }

    fn serialize(&self, document: &SnapshotDocument) -> anyhow::Result<String> {
        let raw = if self.pretty {
            serde_json::to_string_pretty(document)
        } else {
            serde_json::to_string(document)
        };
        raw.with_context(|| format!("encoding snapshot '{}'", document.id))
    }

    fn deserialize(&self, raw: &str) -> anyhow::Result<SnapshotDocument> {
        serde_json::from_str(raw).context("decoding snapshot document")
    }
}
