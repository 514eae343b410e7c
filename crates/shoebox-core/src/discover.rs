//! Source walk: prune, filter by type and size, then hash the survivors.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::mpsc::SyncSender;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::control::CancellationToken;
use crate::error::{Error, Result};
use crate::identity;
use crate::index::STORE_DIR;
use crate::media::MediaClass;
use crate::tables::Tables;

/// A file that passed every filter, with its identity.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
    pub class: MediaClass,
    pub modified: DateTime<Utc>,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SkipReason {
    UnknownType,
    NotWhitelisted,
    TooSmall { size: u64, minimum: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownType => f.write_str("unknown file type"),
            SkipReason::NotWhitelisted => f.write_str("extension not selected"),
            SkipReason::TooSmall { size, minimum } => {
                write!(f, "too small ({size} bytes, minimum {minimum})")
            }
        }
    }
}

#[derive(Debug)]
pub enum Discovered {
    Candidate(Candidate),
    Skipped { path: PathBuf, reason: SkipReason },
}

pub struct Filter<'a> {
    pub tables: &'a Tables,
    /// Lowercase extensions without the dot; `None` accepts every known type.
    pub whitelist: Option<&'a [String]>,
    pub min_multimedia_size: u64,
    pub min_other_size: u64,
    /// Directories never descended into (the destination root).
    pub prune: &'a [PathBuf],
}

impl Filter<'_> {
    fn minimum(&self, class: MediaClass) -> u64 {
        let min = if class.is_multimedia() {
            self.min_multimedia_size
        } else {
            self.min_other_size
        };
        min.max(1)
    }

    /// Type and size checks, done before anything reads the file.
    pub fn check(&self, path: &Path, size: u64) -> std::result::Result<MediaClass, SkipReason> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let class = self.tables.classify(&ext);
        if class == MediaClass::Unknown {
            return Err(SkipReason::UnknownType);
        }
        if let Some(list) = self.whitelist {
            if !list.iter().any(|e| *e == ext) {
                return Err(SkipReason::NotWhitelisted);
            }
        }
        let minimum = self.minimum(class);
        if size < minimum {
            return Err(SkipReason::TooSmall { size, minimum });
        }
        Ok(class)
    }

    fn keep_dir(&self, root: &Path, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        if entry.file_name() == STORE_DIR || self.prune.iter().any(|p| p == entry.path()) {
            return false;
        }
        let relative = relative_dir(root, entry.path());
        if self.tables.is_excluded_dir(&relative) {
            trace!(dir = %relative, "pruned");
            return false;
        }
        true
    }
}

fn relative_dir(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy();
    if MAIN_SEPARATOR == '/' {
        relative.into_owned()
    } else {
        relative.replace(MAIN_SEPARATOR, "/")
    }
}

/// Walk `root` in file-name order and send every file's outcome to `sender`.
///
/// Returns early without error once the receiver hangs up. Unreadable
/// entries below the root are logged and skipped; an unreadable root and
/// a hashing failure are fatal.
pub fn walk(
    root: &Path,
    filter: &Filter<'_>,
    token: &CancellationToken,
    sender: &SyncSender<Result<Discovered>>,
) -> Result<()> {
    fs::read_dir(root).map_err(|source| Error::SourceUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| filter.keep_dir(root, entry));

    for entry in walker {
        token.check()?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(Error::SourceUnreadable {
                        path: root.to_path_buf(),
                        source: err.into(),
                    });
                }
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let stat = match entry.metadata() {
            Ok(stat) => stat,
            Err(err) => {
                warn!(path = %entry.path().display(), "cannot stat file: {err}");
                continue;
            }
        };

        let path = entry.into_path();
        let outcome = match filter.check(&path, stat.len()) {
            Err(reason) => Ok(Discovered::Skipped { path, reason }),
            Ok(class) => identity::checksum(&path).map(|checksum| {
                let modified = stat
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Discovered::Candidate(Candidate {
                    path,
                    size: stat.len(),
                    class,
                    modified,
                    checksum,
                })
            }),
        };

        let fatal = outcome.is_err();
        if sender.send(outcome).is_err() || fatal {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;
    use tempfile::tempdir;

    fn collect(root: &Path, filter: &Filter<'_>) -> Vec<Discovered> {
        let (tx, rx) = sync_channel(4);
        std::thread::scope(|s| {
            s.spawn(move || walk(root, filter, &CancellationToken::new(), &tx).unwrap());
            rx.iter().map(|item| item.unwrap()).collect()
        })
    }

    fn filter<'a>(tables: &'a Tables, prune: &'a [PathBuf]) -> Filter<'a> {
        Filter {
            tables,
            whitelist: None,
            min_multimedia_size: 1000,
            min_other_size: 10,
            prune,
        }
    }

    #[test]
    fn test_filter_checks() {
        let tables = Tables::default();
        let f = filter(&tables, &[]);
        assert_eq!(f.check(Path::new("a.jpg"), 5000), Ok(MediaClass::Image));
        assert_eq!(
            f.check(Path::new("a.jpg"), 5),
            Err(SkipReason::TooSmall { size: 5, minimum: 1000 })
        );
        assert_eq!(f.check(Path::new("a.pdf"), 50), Ok(MediaClass::Document));
        assert!(f.check(Path::new("a.pdf"), 0).is_err());
        assert_eq!(f.check(Path::new("a.json"), 5000), Err(SkipReason::UnknownType));

        let list = vec!["png".to_string()];
        let f = Filter {
            whitelist: Some(&list),
            ..filter(&tables, &[])
        };
        assert_eq!(f.check(Path::new("a.JPG"), 5000), Err(SkipReason::NotWhitelisted));
        assert_eq!(f.check(Path::new("a.PNG"), 5000), Ok(MediaClass::Image));
    }

    #[test]
    fn test_walk_prunes_and_hashes() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("src");
        let dest = root.join("library");
        for sub in ["", "node_modules", ".shoebox", "library", "trip"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        fs::write(root.join("a.jpg"), vec![1u8; 2000]).unwrap();
        fs::write(root.join("tiny.jpg"), b"12345").unwrap();
        fs::write(root.join("trip").join("b.png"), vec![2u8; 2000]).unwrap();
        fs::write(root.join("node_modules").join("c.png"), vec![3u8; 2000]).unwrap();
        fs::write(root.join(".shoebox").join("d.png"), vec![4u8; 2000]).unwrap();
        fs::write(dest.join("e.png"), vec![5u8; 2000]).unwrap();

        let tables = Tables::default();
        let prune = vec![dest];
        let items = collect(&root, &filter(&tables, &prune));

        let names: Vec<String> = items
            .iter()
            .map(|item| match item {
                Discovered::Candidate(c) => {
                    c.path.file_name().unwrap().to_string_lossy().into_owned()
                }
                Discovered::Skipped { path, .. } => {
                    format!("skip:{}", path.file_name().unwrap().to_string_lossy())
                }
            })
            .collect();
        assert_eq!(names, ["a.jpg", "skip:tiny.jpg", "b.png"]);

        let Discovered::Candidate(first) = &items[0] else {
            panic!("expected a candidate");
        };
        assert_eq!(first.size, 2000);
        assert_eq!(first.checksum.len(), 64);
        assert_eq!(first.class, MediaClass::Image);
    }

    #[test]
    fn test_unreadable_root() {
        let dir = tempdir().unwrap();
        let tables = Tables::default();
        let (tx, _rx) = sync_channel(1);
        let err = walk(
            &dir.path().join("missing"),
            &filter(&tables, &[]),
            &CancellationToken::new(),
            &tx,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable { .. }));
    }
}
