use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{lock, store_dir, Index, IndexEntry, CATALOG_FILE};
use crate::error::{Error, Result};

/// Current catalog file format version
const CATALOG_VERSION: u32 = 1;

const SAVE_INTERVAL: Duration = Duration::from_secs(5);
const SAVE_EVERY: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    entries: BTreeMap<String, IndexEntry>,
}

struct State {
    entries: BTreeMap<String, IndexEntry>,
    last_save: Instant,
    unsaved: usize,
}

/// Whole-library catalog, one JSON document under `.shoebox/`.
///
/// Writes are buffered in memory and flushed atomically (temp file +
/// rename) every few seconds or inserts, and on [`CatalogIndex::save`].
/// An in-memory catalog never touches disk.
pub struct CatalogIndex {
    path: Option<PathBuf>,
    state: Mutex<State>,
}

impl CatalogIndex {
    pub fn in_memory() -> Self {
        Self::with_entries(None, BTreeMap::new())
    }

    /// Load `<library>/.shoebox/catalog.json`, or start empty.
    pub fn open(library: &Path) -> Result<Self> {
        let path = store_dir(library).join(CATALOG_FILE);
        let entries = match File::open(&path) {
            Ok(file) => {
                let catalog: CatalogFile = serde_json::from_reader(BufReader::new(file))
                    .map_err(|source| Error::CorruptRecord {
                        path: path.clone(),
                        source,
                    })?;
                debug!(path = %path.display(), entries = catalog.entries.len(), "loaded catalog");
                catalog.entries
            }
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(Error::index(path, err)),
        };
        Ok(Self::with_entries(Some(path), entries))
    }

    /// Copy of `library`'s catalog that is never written back.
    pub fn snapshot(library: &Path) -> Result<Self> {
        let loaded = Self::open(library)?;
        let entries = std::mem::take(&mut lock(&loaded.state).entries);
        Ok(Self::with_entries(None, entries))
    }

    fn with_entries(path: Option<PathBuf>, entries: BTreeMap<String, IndexEntry>) -> Self {
        Self {
            path,
            state: Mutex::new(State {
                entries,
                last_save: Instant::now(),
                unsaved: 0,
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush pending inserts now.
    pub fn save(&self) -> Result<()> {
        let mut state = lock(&self.state);
        self.write(&mut state)
    }

    fn write(&self, state: &mut State) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if state.unsaved == 0 && path.exists() {
            return Ok(());
        }
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::create_dir(dir, e))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        let document = CatalogFile {
            version: CATALOG_VERSION,
            entries: std::mem::take(&mut state.entries),
        };
        let written = write_json(&temp_path, &document);
        state.entries = document.entries;
        written.and_then(|_| fs::rename(&temp_path, path)).map_err(|e| Error::index(path, e))?;

        state.last_save = Instant::now();
        state.unsaved = 0;
        Ok(())
    }
}

fn write_json(path: &Path, document: &CatalogFile) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.flush()
}

impl Index for CatalogIndex {
    fn find(&self, checksum: &str) -> Result<Option<IndexEntry>> {
        Ok(lock(&self.state).entries.get(checksum).cloned())
    }

    fn insert_if_absent(&self, entry: &IndexEntry) -> Result<bool> {
        let mut state = lock(&self.state);
        if state.entries.contains_key(&entry.checksum) {
            return Ok(false);
        }
        state.entries.insert(entry.checksum.clone(), entry.clone());
        state.unsaved += 1;
        if state.unsaved >= SAVE_EVERY || state.last_save.elapsed() >= SAVE_INTERVAL {
            self.write(&mut state)?;
        }
        Ok(true)
    }
}

impl Drop for CatalogIndex {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if state.unsaved > 0 {
            debug!("catalog dropped with {} unsaved entries", state.unsaved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_insert_if_absent() {
        let catalog = CatalogIndex::in_memory();
        let entry = IndexEntry::test_entry("abc", "images/2020/06/a.jpg", "a.jpg");
        assert!(catalog.insert_if_absent(&entry).unwrap());
        assert!(!catalog
            .insert_if_absent(&IndexEntry::test_entry("abc", "images/other.jpg", "b.jpg"))
            .unwrap());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find("abc").unwrap().unwrap().destination, "images/2020/06/a.jpg");
        assert!(!catalog.has_checksum("def").unwrap());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempdir().unwrap();
        {
            let catalog = CatalogIndex::open(dir.path()).unwrap();
            assert!(catalog.is_empty());
            catalog
                .insert_if_absent(&IndexEntry::test_entry("abc", "images/a.jpg", "a.jpg"))
                .unwrap();
            catalog.save().unwrap();
        }
        let path = dir.path().join(".shoebox").join("catalog.json");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = CatalogIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.find("abc").unwrap().unwrap().source_name, "a.jpg");
    }

    #[test]
    fn test_snapshot_is_never_written() {
        let dir = tempdir().unwrap();
        let catalog = CatalogIndex::open(dir.path()).unwrap();
        catalog
            .insert_if_absent(&IndexEntry::test_entry("abc", "images/a.jpg", "a.jpg"))
            .unwrap();
        catalog.save().unwrap();

        let snapshot = CatalogIndex::snapshot(dir.path()).unwrap();
        assert!(snapshot.path().is_none());
        snapshot
            .insert_if_absent(&IndexEntry::test_entry("def", "images/d.jpg", "d.jpg"))
            .unwrap();
        snapshot.save().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(CatalogIndex::open(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_catalog() {
        let dir = tempdir().unwrap();
        let store = dir.path().join(".shoebox");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("catalog.json"), b"{ not json").unwrap();
        assert!(matches!(
            CatalogIndex::open(dir.path()),
            Err(Error::CorruptRecord { .. })
        ));
    }
}
