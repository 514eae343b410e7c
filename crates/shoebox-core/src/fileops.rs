use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use filetime::FileTime;
use tracing::debug;

/// Raw filesystem primitives the importer drives.
pub trait FileOps {
    /// Copy `src` to `dest`; with `preserve`, carry over permissions and times.
    fn copy(&self, src: &Path, dest: &Path, preserve: bool) -> io::Result<u64>;
    fn move_file(&self, src: &Path, dest: &Path) -> io::Result<()>;
    fn ensure_dir(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// mtime becomes `created`, atime becomes `modified`.
    fn fix_timestamps(
        &self,
        path: &Path,
        created: DateTime<FixedOffset>,
        modified: DateTime<FixedOffset>,
    ) -> io::Result<()>;
}

/// The local filesystem. Copies never expose a partial file at `dest`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.part"))
}

fn file_time(time: DateTime<FixedOffset>) -> FileTime {
    FileTime::from_unix_time(time.timestamp(), time.timestamp_subsec_nanos())
}

impl FileOps for LocalFs {
    fn copy(&self, src: &Path, dest: &Path, preserve: bool) -> io::Result<u64> {
        let partial = partial_path(dest);
        let result = (|| -> io::Result<u64> {
            let mut reader = File::open(src)?;
            let mut writer = BufWriter::new(File::create(&partial)?);
            let bytes = io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            drop(writer);

            if preserve {
                let meta = fs::metadata(src)?;
                fs::set_permissions(&partial, meta.permissions())?;
                filetime::set_file_times(
                    &partial,
                    FileTime::from_last_access_time(&meta),
                    FileTime::from_last_modification_time(&meta),
                )?;
            }
            fs::rename(&partial, dest)?;
            Ok(bytes)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }

    fn move_file(&self, src: &Path, dest: &Path) -> io::Result<()> {
        match fs::rename(src, dest) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Typically a cross-device move.
                debug!(from = %src.display(), "rename failed ({err}), copying instead");
                self.copy(src, dest, true)?;
                fs::remove_file(src)
            }
        }
    }

    fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn fix_timestamps(
        &self,
        path: &Path,
        created: DateTime<FixedOffset>,
        modified: DateTime<FixedOffset>,
    ) -> io::Result<()> {
        filetime::set_file_times(path, file_time(modified), file_time(created))
    }
}
