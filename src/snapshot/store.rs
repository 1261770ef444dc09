//! Snapshot records on disk.
//!
//! Layout inside the snapshot directory:
//! - `snapshot.<id>.<yyyyMMddHHmmssSSS>.<ext>`: one permanent record per export
//! - `snapshot.latest.<ext>`: overwritten on every export

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::errors::SnapshotError;
use crate::snapshot::serializer::SnapshotSerializer;
use crate::snapshot::types::{SnapshotDescriptor, SnapshotDocument};
use crate::utils::utils_time::{friendly_timestamp, parse_friendly_timestamp};

const PREFIX: &str = "snapshot";
const LATEST: &str = "latest";

pub trait SnapshotStore: Send + Sync {
    /// Writes the permanent record and replaces the latest pointer.
    fn write(&self, document: &SnapshotDocument) -> Result<(), SnapshotError>;

    fn read_latest(&self) -> Result<Option<SnapshotDocument>, SnapshotError>;

    fn read(&self, id: &str) -> Result<SnapshotDocument, SnapshotError>;

    /// Newest first.
    fn list(&self) -> Result<Vec<SnapshotDescriptor>, SnapshotError>;
}

pub fn instance_file_name(id: &str, timestamp: i64, extension: &str) -> String {
    format!("{}.{}.{}.{}", PREFIX, id, friendly_timestamp(timestamp), extension)
}

pub fn latest_file_name(extension: &str) -> String {
    format!("{}.{}.{}", PREFIX, LATEST, extension)
}

/// Parses `snapshot.<id>.<timestamp>.<ext>`. Anything else yields `None`.
pub fn parse_file_name(file_name: &str, extension: &str) -> Option<SnapshotDescriptor> {
    let parts: Vec<&str> = file_name.split('.').collect();
    match parts.as_slice() {
        [prefix, id, stamp, ext] if *prefix == PREFIX && *ext == extension && *id != LATEST => {
            Some(SnapshotDescriptor {
                id: id.to_string(),
                timestamp: parse_friendly_timestamp(stamp)?,
            })
        }
        _ => None,
    }
}

// ==========================================
// FILE SYSTEM STORE
// ==========================================

pub struct FileSystemSnapshotStore {
    directory: PathBuf,
    serializer: Box<dyn SnapshotSerializer>,
}

impl FileSystemSnapshotStore {
    pub fn new(
        directory: impl Into<PathBuf>,
        serializer: Box<dyn SnapshotSerializer>,
    ) -> Result<Self, SnapshotError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory, serializer })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn extension(&self) -> &str {
        self.serializer.file_extension()
    }

    fn read_file(&self, path: &Path) -> Result<SnapshotDocument, SnapshotError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SnapshotError::RecordMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        self.serializer
            .deserialize(&raw)
            .map_err(SnapshotError::Serialization)
    }
}

impl SnapshotStore for FileSystemSnapshotStore {
    fn write(&self, document: &SnapshotDocument) -> Result<(), SnapshotError> {
        let raw = self
            .serializer
            .serialize(document)
            .map_err(SnapshotError::Serialization)?;

        let instance = self
            .directory
            .join(instance_file_name(&document.id, document.timestamp, self.extension()));
        fs::write(&instance, &raw)?;

        // Replace the pointer through a rename so readers never see half a file.
        let latest = self.directory.join(latest_file_name(self.extension()));
        let staging = self.directory.join(format!(".{}.tmp", latest_file_name(self.extension())));
        fs::write(&staging, &raw)?;
        fs::rename(&staging, &latest)?;

        tracing::debug!("[Snapshot] Wrote {:?}", instance);
        Ok(())
    }

    fn read_latest(&self) -> Result<Option<SnapshotDocument>, SnapshotError> {
        let latest = self.directory.join(latest_file_name(self.extension()));
        match self.read_file(&latest) {
            Ok(document) => Ok(Some(document)),
            Err(SnapshotError::RecordMissing { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read(&self, id: &str) -> Result<SnapshotDocument, SnapshotError> {
        let descriptor = self
            .list()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| SnapshotError::NotExist { id: id.to_string() })?;

        let path = self
            .directory
            .join(instance_file_name(&descriptor.id, descriptor.timestamp, self.extension()));
        self.read_file(&path)
    }

    fn list(&self) -> Result<Vec<SnapshotDescriptor>, SnapshotError> {
        let mut descriptors = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Some(descriptor) = parse_file_name(name, self.extension()) {
                    descriptors.push(descriptor);
                }
            }
        }
        descriptors.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(descriptors)
    }
}
