//! Normalized metadata and its resolution: reuse an indexed record when one
//! exists for the checksum, otherwise ask the extractor, otherwise fall back
//! to a minimal error-tagged record.

pub mod builtin;
pub mod exiftool;
pub mod gps;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::Result;
use crate::index::Index;
use crate::media::MediaClass;
use gps::GpsCoord;

pub use builtin::BuiltinExif;
pub use exiftool::Exiftool;

pub const KEY_SOURCE_FILE: &str = "SourceFile";
pub const KEY_ERROR: &str = "Error";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("extractor i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("unparseable extractor output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("extractor reported: {0}")]
    Reported(String),

    #[error("extractor returned no record")]
    Empty,

    #[error("path cannot be passed to the extractor: {}", .0.display())]
    UnsupportedPath(PathBuf),
}

/// Source of raw attributes for one file.
pub trait MetadataExtractor {
    fn extract(&self, path: &Path, class: MediaClass)
        -> std::result::Result<Metadata, ExtractError>;
}

/// Flat, string-valued attribute map. Ordered so serialized sidecars are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten one extractor JSON object; nulls are dropped.
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        let map = object
            .iter()
            .filter_map(|(key, value)| normalize_value(value).map(|v| (key.clone(), v)))
            .collect();
        Self(map)
    }

    /// Minimal record used when extraction fails.
    pub fn fallback(path: &Path) -> Self {
        let mut meta = Self::new();
        meta.insert(KEY_SOURCE_FILE, path.to_string_lossy());
        meta.insert(KEY_ERROR, "true");
        meta
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.get(KEY_ERROR).is_some()
    }

    /// "Make Model", without repeating the make when the model already carries it.
    pub fn camera(&self) -> Option<String> {
        match (self.get("Make"), self.get("Model")) {
            (Some(make), Some(model)) => {
                if model.to_lowercase().starts_with(&make.to_lowercase()) {
                    Some(model.to_string())
                } else {
                    Some(format!("{make} {model}"))
                }
            }
            (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
            (None, None) => None,
        }
    }

    pub fn creation_tool(&self) -> Option<String> {
        match (self.get("CreatorTool"), self.get("Software")) {
            (Some(tool), Some(software)) if tool != software => {
                Some(format!("{tool} ({software})"))
            }
            (Some(tool), _) => Some(tool.to_string()),
            (None, Some(software)) => Some(software.to_string()),
            (None, None) => None,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.get("MIMEType")
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let dim = |keys: [&str; 2]| {
            keys.iter()
                .filter_map(|k| self.get(k))
                .find_map(|v| v.split('.').next().and_then(|n| n.parse::<u32>().ok()))
        };
        Some((
            dim(["ImageWidth", "ExifImageWidth"])?,
            dim(["ImageHeight", "ExifImageHeight"])?,
        ))
    }

    pub fn duration(&self) -> Option<String> {
        ["Duration", "MediaDuration", "TrackDuration"]
            .iter()
            .filter_map(|k| self.get(k))
            .map(|v| v.replace("(approx)", "").replace(' ', ""))
            .find(|v| !v.is_empty())
    }

    pub fn gps(&self) -> Option<GpsCoord> {
        gps::parse_position(self.get("GPSPosition")?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Stringify a JSON value: integers as-is, floats with 6 decimals.
pub fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| format!("{f:.6}"))
            }
        }
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOrigin {
    Indexed,
    Extracted,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    pub metadata: Metadata,
    pub origin: MetadataOrigin,
}

pub struct MetadataResolver<'a> {
    extractor: &'a dyn MetadataExtractor,
    lookup: &'a dyn Index,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(extractor: &'a dyn MetadataExtractor, lookup: &'a dyn Index) -> Self {
        Self { extractor, lookup }
    }

    /// Only index failures are errors; extraction failures yield the fallback record.
    pub fn resolve(
        &self,
        path: &Path,
        class: MediaClass,
        checksum: &str,
    ) -> Result<ResolvedMetadata> {
        if let Some(metadata) = self.lookup.find(checksum)?.and_then(|entry| entry.metadata) {
            debug!(path = %path.display(), "reusing indexed metadata");
            return Ok(ResolvedMetadata {
                metadata,
                origin: MetadataOrigin::Indexed,
            });
        }

        match self.extractor.extract(path, class) {
            Ok(metadata) => Ok(ResolvedMetadata {
                metadata,
                origin: MetadataOrigin::Extracted,
            }),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    "metadata extraction failed, using fallback record: {err}"
                );
                Ok(ResolvedMetadata {
                    metadata: Metadata::fallback(path),
                    origin: MetadataOrigin::Fallback,
                })
            }
        }
    }
}
