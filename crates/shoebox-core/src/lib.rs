pub mod control;
pub mod date;
pub mod discover;
pub mod duplicate;
pub mod error;
pub mod fileops;
pub mod identity;
pub mod import;
pub mod index;
pub mod media;
pub mod metadata;
pub mod planner;
pub mod runlog;
pub mod tables;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use control::CancellationToken;
pub use error::{Error, Result};
pub use fileops::LocalFs;
pub use import::{Decision, DuplicatePolicy, ImportReport, ImportStats, Importer, TransferMode};
pub use media::{Destination, DuplicateStatus, MediaClass, MediaRecord, Topic};
pub use metadata::gps::{GeoTimezones, NoTimezones};
pub use metadata::{BuiltinExif, Exiftool};

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_queue_depth() -> usize {
    64
}

fn default_min_multimedia_size() -> u64 {
    1000
}

fn default_min_other_size() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub dry_run: bool,
    /// Stop cleanly after this many records got past the filters. 0 means no limit.
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub mode: TransferMode,
    /// Only these extensions (without the dot), when set.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// Replaces the default directory exclusions.
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub fix_dates: bool,
    /// IANA zone for times that carry none and no GPS position.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_min_multimedia_size")]
    pub min_multimedia_size: u64,
    #[serde(default = "default_min_other_size")]
    pub min_other_size: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            dry_run: false,
            limit: None,
            mode: TransferMode::default(),
            extensions: None,
            exclude: None,
            fix_dates: false,
            timezone: default_timezone(),
            duplicates: DuplicatePolicy::default(),
            queue_depth: default_queue_depth(),
            min_multimedia_size: default_min_multimedia_size(),
            min_other_size: default_min_other_size(),
        }
    }
}

/// Control options for a run (cancellation).
#[derive(Debug, Clone, Default)]
pub struct ImportControl {
    pub cancel_token: Option<CancellationToken>,
}

impl ImportControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Type alias for progress callback: `(stage, current, total, message)`.
/// A `total` of 0 means the total is not known yet.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total > 0 && current + 1 >= total;
        if !is_done {
            let mut last = index::lock(&self.last_emit);
            if last.elapsed() < PROGRESS_INTERVAL {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }

    /// Final event, never throttled.
    pub fn finish(&self, stage: &str, current: u64, message: &str) {
        (self.inner)(stage, current, current, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_throttled_progress() {
        let calls = AtomicU64::new(0);
        let callback = |_: &str, _: u64, _: u64, _: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let tp = ThrottledProgress::new(&callback);
        for i in 0..100 {
            tp.report("import", i, 0, "file");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tp.report("import", 9, 10, "done");
        tp.finish("import", 10, "finished");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_options_defaults_from_json() {
        let options: ImportOptions =
            serde_json::from_str(r#"{"source": "/in", "destination": "/out"}"#).unwrap();
        assert_eq!(options.timezone, "UTC");
        assert_eq!(options.queue_depth, 64);
        assert_eq!(options.min_multimedia_size, 1000);
        assert_eq!(options.mode, TransferMode::Copy);
        assert_eq!(options.duplicates, DuplicatePolicy::Quarantine);
        assert!(!options.dry_run);
    }
}
