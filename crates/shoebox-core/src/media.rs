use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// Media type bucket, decided from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Contact,
    Unknown,
}

impl MediaClass {
    /// Top-level destination directory for this class.
    pub fn bucket(self) -> &'static str {
        match self {
            MediaClass::Image => "images",
            MediaClass::Video => "videos",
            MediaClass::Audio => "audio",
            MediaClass::Document => "documents",
            MediaClass::Archive => "archives",
            MediaClass::Contact => "contacts",
            MediaClass::Unknown => "others",
        }
    }

    pub fn is_multimedia(self) -> bool {
        matches!(self, MediaClass::Image | MediaClass::Video | MediaClass::Audio)
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaClass::Image => "image",
            MediaClass::Video => "video",
            MediaClass::Audio => "audio",
            MediaClass::Document => "document",
            MediaClass::Archive => "archive",
            MediaClass::Contact => "contact",
            MediaClass::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateStatus {
    Unique,
    DuplicateByContent,
    DuplicateByName,
    Skipped,
}

/// Grouping label shaping the directory layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Topic {
    /// Slugged camera make/model.
    Camera(String),
    /// Matched source rule (screenshots, whatsapp, ...).
    Source(String),
    Generic,
}

impl Topic {
    /// Directory segment(s) contributed by this topic, if any.
    pub fn subpath(&self) -> Option<String> {
        match self {
            Topic::Camera(slug) => Some(format!("cameras/{slug}")),
            Topic::Source(name) => Some(name.clone()),
            Topic::Generic => None,
        }
    }
}

/// Planned location relative to the destination root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// `/`-separated directory, e.g. `images/2020/06`.
    pub directory: String,
    pub basename: String,
    /// Normalized extension without the dot; may be empty.
    pub extension: String,
}

impl Destination {
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.basename.clone()
        } else {
            format!("{}.{}", self.basename, self.extension)
        }
    }

    /// `/`-separated path relative to the destination root; the stable index key.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.directory, self.file_name())
    }

    pub fn under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.directory.split('/'));
        path.push(self.file_name());
        path
    }
}

/// Where the authoritative timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    FileModified,
    Takeout,
    CreateDate,
    DateTimeOriginal,
    DateTimeDigitized,
    GpsDateTime,
    FileModifyDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTime {
    /// Localized to `timezone`.
    pub time: DateTime<FixedOffset>,
    /// IANA zone name.
    pub timezone: String,
    pub source: TimeSource,
}

/// One imported (or import-candidate) file, fully resolved before any side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub source_path: PathBuf,
    pub size: u64,
    pub checksum: String,
    pub metadata: Metadata,
    pub created: ResolvedTime,
    pub modified: DateTime<FixedOffset>,
    pub classification: MediaClass,
    pub topic: Topic,
    pub destination: Destination,
    pub status: DuplicateStatus,
}

impl MediaRecord {
    pub fn source_name(&self) -> String {
        file_name_of(&self.source_path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
