//! Persistent knowledge of what has been imported, keyed by checksum.

pub mod catalog;
pub mod sidecar;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::{MediaClass, MediaRecord, Topic};
use crate::metadata::Metadata;

pub use catalog::CatalogIndex;
pub use sidecar::SidecarIndex;

/// Library bookkeeping directory, at the root of a destination.
pub const STORE_DIR: &str = ".shoebox";
pub const METADATA_DIR: &str = "metadata";
pub const DUPLICATES_DIR: &str = "duplicates";
pub const CATALOG_FILE: &str = "catalog.json";
pub const RUN_LOG_FILE: &str = "runs.jsonl";

pub fn store_dir(library: &Path) -> PathBuf {
    library.join(STORE_DIR)
}

/// What the library remembers about one imported checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub checksum: String,
    pub size: u64,
    pub source_path: PathBuf,
    pub source_name: String,
    /// `/`-separated, relative to the library root.
    pub destination: String,
    pub created: DateTime<FixedOffset>,
    pub timezone: String,
    pub classification: MediaClass,
    pub topic: Topic,
    pub imported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl IndexEntry {
    pub fn from_record(record: &MediaRecord, with_metadata: bool) -> Self {
        Self {
            checksum: record.checksum.clone(),
            size: record.size,
            source_path: record.source_path.clone(),
            source_name: record.source_name(),
            destination: record.destination.relative_path(),
            created: record.created.time,
            timezone: record.created.timezone.clone(),
            classification: record.classification,
            topic: record.topic.clone(),
            imported_at: Utc::now(),
            metadata: with_metadata.then(|| record.metadata.clone()),
        }
    }

    /// Same entry without the metadata blob.
    pub fn summary(&self) -> Self {
        Self {
            metadata: None,
            ..self.clone()
        }
    }

    #[cfg(test)]
    pub(crate) fn test_entry(checksum: &str, destination: &str, source_name: &str) -> Self {
        Self {
            checksum: checksum.to_string(),
            size: 1234,
            source_path: PathBuf::from("/in").join(source_name),
            source_name: source_name.to_string(),
            destination: destination.to_string(),
            created: DateTime::parse_from_rfc3339("2020-06-01T10:00:00+00:00").unwrap(),
            timezone: "UTC".to_string(),
            classification: MediaClass::Image,
            topic: Topic::Generic,
            imported_at: Utc::now(),
            metadata: None,
        }
    }
}

/// Checksum-keyed store of imported items.
pub trait Index {
    fn find(&self, checksum: &str) -> Result<Option<IndexEntry>>;

    /// Store `entry` unless its checksum is already known; `true` when stored.
    fn insert_if_absent(&self, entry: &IndexEntry) -> Result<bool>;

    fn has_checksum(&self, checksum: &str) -> Result<bool> {
        Ok(self.find(checksum)?.is_some())
    }
}

/// Indexes consulted in order, first match wins.
#[derive(Default)]
pub struct IndexChain<'a> {
    members: Vec<&'a dyn Index>,
}

impl<'a> IndexChain<'a> {
    pub fn new(members: Vec<&'a dyn Index>) -> Self {
        Self { members }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Index for IndexChain<'_> {
    fn find(&self, checksum: &str) -> Result<Option<IndexEntry>> {
        for index in &self.members {
            if let Some(entry) = index.find(checksum)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Inserts into the first member, only if no member knows the checksum.
    fn insert_if_absent(&self, entry: &IndexEntry) -> Result<bool> {
        if self.has_checksum(&entry.checksum)? {
            return Ok(false);
        }
        match self.members.first() {
            Some(first) => first.insert_if_absent(entry),
            None => Ok(false),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
