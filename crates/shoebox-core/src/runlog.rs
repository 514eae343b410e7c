use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::import::{ImportStats, TransferMode};
use crate::index::{store_dir, RUN_LOG_FILE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    Completed,
    LimitReached,
    Cancelled,
    Failed,
}

/// One line of `.shoebox/runs.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub outcome: RunOutcome,
    pub stats: ImportStats,
}

pub fn append(library: &Path, record: &RunRecord) -> Result<()> {
    let dir = store_dir(library);
    fs::create_dir_all(&dir).map_err(|e| Error::create_dir(&dir, e))?;
    let path = dir.join(RUN_LOG_FILE);

    let mut line = serde_json::to_string(record).map_err(|source| Error::CorruptRecord {
        path: path.clone(),
        source,
    })?;
    line.push('\n');

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(line.as_bytes()))
        .map_err(|e| Error::index(path, e))
}

/// All recorded runs, oldest first.
pub fn read(library: &Path) -> Result<Vec<RunRecord>> {
    let path = store_dir(library).join(RUN_LOG_FILE);
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::index(path, err)),
    };

    let mut runs = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::index(&path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let run = serde_json::from_str(&line).map_err(|source| Error::CorruptRecord {
            path: path.clone(),
            source,
        })?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read() {
        let dir = tempdir().unwrap();
        assert!(read(dir.path()).unwrap().is_empty());

        let record = RunRecord {
            started: Utc::now(),
            finished: Utc::now(),
            source: PathBuf::from("/in"),
            destination: dir.path().to_path_buf(),
            mode: TransferMode::Copy,
            outcome: RunOutcome::Completed,
            stats: ImportStats {
                imported: 3,
                ..ImportStats::default()
            },
        };
        append(dir.path(), &record).unwrap();
        append(
            dir.path(),
            &RunRecord {
                outcome: RunOutcome::LimitReached,
                ..record
            },
        )
        .unwrap();

        let runs = read(dir.path()).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].stats.imported, 3);
        assert_eq!(runs[1].outcome, RunOutcome::LimitReached);
    }
}
