//! One JSON file per checksum, sharded as `<ab>/<c>/<checksum>.json`.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{lock, store_dir, Index, IndexEntry, METADATA_DIR};
use crate::error::{Error, Result};

const SIDECAR_EXT: &str = "json";
const TAKEOUT_EXT: &str = "takeout.json";

/// `<root>/<ab>/<c>/<checksum>.<ext>`
pub fn shard_path(root: &Path, checksum: &str, ext: &str) -> PathBuf {
    let first = checksum.get(..2).unwrap_or(checksum);
    let second = checksum.get(2..3).unwrap_or("_");
    root.join(first).join(second).join(format!("{checksum}.{ext}"))
}

/// Where a library keeps the exported takeout document for `checksum`.
pub fn takeout_path(library: &Path, checksum: &str) -> PathBuf {
    shard_path(&store_dir(library).join(METADATA_DIR), checksum, TAKEOUT_EXT)
}

#[derive(Debug)]
pub struct SidecarIndex {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl SidecarIndex {
    /// Sidecar store rooted at an arbitrary directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The `.shoebox/metadata` store of a library.
    pub fn for_library(library: &Path) -> Self {
        Self::at(store_dir(library).join(METADATA_DIR))
    }

    pub fn path_for(&self, checksum: &str) -> PathBuf {
        shard_path(&self.root, checksum, SIDECAR_EXT)
    }

    fn write(&self, path: &Path, entry: &IndexEntry) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| Error::create_dir(dir, e))?;

        let temp_path = path.with_extension("json.tmp");
        let written = (|| -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer_pretty(&mut writer, entry)?;
            writer.flush()?;
            fs::rename(&temp_path, path)
        })();
        written.map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::index(path, e)
        })
    }
}

impl Index for SidecarIndex {
    fn find(&self, checksum: &str) -> Result<Option<IndexEntry>> {
        let path = self.path_for(checksum);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::index(path, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| Error::CorruptRecord { path, source })
    }

    fn insert_if_absent(&self, entry: &IndexEntry) -> Result<bool> {
        let _guard = lock(&self.write_lock);
        let path = self.path_for(&entry.checksum);
        if path.exists() {
            return Ok(false);
        }
        self.write(&path, entry)?;
        Ok(true)
    }
}
