//! The import pass: discovery on a worker thread feeding one consumer that
//! resolves, plans, classifies and applies side effects record by record.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::control::CancellationToken;
use crate::date::{collect_candidates, takeout, Reconciler};
use crate::discover::{self, Candidate, Discovered, Filter};
use crate::duplicate;
use crate::error::{Error, Result};
use crate::fileops::FileOps;
use crate::index::{
    store_dir, CatalogIndex, Index, IndexChain, IndexEntry, SidecarIndex, DUPLICATES_DIR,
};
use crate::media::{file_name_of, DuplicateStatus, MediaRecord};
use crate::metadata::gps::TimezoneLookup;
use crate::metadata::{MetadataExtractor, MetadataOrigin, MetadataResolver};
use crate::planner;
use crate::runlog::{self, RunOutcome, RunRecord};
use crate::tables::Tables;
use crate::{ImportControl, ImportOptions, ProgressCallback, ThrottledProgress};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

impl TransferMode {
    fn verb(self) -> &'static str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }
}

/// What happens to content already present in the library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep a copy under `.shoebox/duplicates/`, laid out like the library.
    #[default]
    Quarantine,
    /// Record only.
    Drop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub discovered: u64,
    pub imported: u64,
    pub skipped: u64,
    pub duplicated_by_content: u64,
    pub duplicated_by_name: u64,
    pub metadata_failures: u64,
    /// Bytes of newly imported files.
    pub total_bytes: u64,
}

impl ImportStats {
    /// Records that got past the filters.
    pub fn processed(&self) -> u64 {
        self.imported + self.duplicated_by_content + self.duplicated_by_name
    }

    pub fn duplicated(&self) -> u64 {
        self.duplicated_by_content + self.duplicated_by_name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub source_path: PathBuf,
    pub status: DuplicateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Planned path relative to the library root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub stats: ImportStats,
    pub decisions: Vec<Decision>,
    pub limit_reached: bool,
    pub dry_run: bool,
}

/// Per-run state shared by the consumer.
struct Run<'r> {
    source: &'r Path,
    library: &'r Path,
    catalog: &'r CatalogIndex,
    sidecars: &'r SidecarIndex,
    library_chain: IndexChain<'r>,
    resolver: MetadataResolver<'r>,
    reconciler: Reconciler,
}

pub struct Importer<'a> {
    options: &'a ImportOptions,
    tables: Tables,
    reconciler: Reconciler,
    extractor: &'a dyn MetadataExtractor,
    zones: &'a dyn TimezoneLookup,
    fs: &'a dyn FileOps,
}

impl<'a> Importer<'a> {
    /// Validates the exclusion pattern and timezone up front.
    pub fn new(
        options: &'a ImportOptions,
        extractor: &'a dyn MetadataExtractor,
        zones: &'a dyn TimezoneLookup,
        fs: &'a dyn FileOps,
    ) -> Result<Self> {
        let tables = match &options.exclude {
            Some(pattern) => Tables::default().with_exclusions(pattern)?,
            None => Tables::default(),
        };
        Ok(Self {
            options,
            tables,
            reconciler: Reconciler::from_zone_name(&options.timezone)?,
            extractor,
            zones,
            fs,
        })
    }

    /// Replace the lookup tables.
    pub fn with_tables(mut self, tables: Tables) -> Self {
        self.tables = tables;
        self
    }

    pub fn run(
        &self,
        control: &ImportControl,
        progress: &ProgressCallback<'_>,
    ) -> Result<ImportReport> {
        let started = Utc::now();
        let token = control.cancel_token.clone().unwrap_or_default();
        token.check()?;

        let options = self.options;
        let source = fs::canonicalize(&options.source).map_err(|source| Error::SourceUnreadable {
            path: options.source.clone(),
            source,
        })?;
        let library = if options.dry_run {
            fs::canonicalize(&options.destination)
                .or_else(|_| std::path::absolute(&options.destination))?
        } else {
            self.fs
                .ensure_dir(&options.destination)
                .map_err(|e| Error::create_dir(&options.destination, e))?;
            fs::canonicalize(&options.destination)?
        };
        info!(
            source = %source.display(),
            library = %library.display(),
            dry_run = options.dry_run,
            "starting import"
        );

        let catalog = if options.dry_run {
            CatalogIndex::snapshot(&library)?
        } else {
            CatalogIndex::open(&library)?
        };
        let sidecars = SidecarIndex::for_library(&library);
        let source_sidecars = SidecarIndex::for_library(&source);
        let lookup = IndexChain::new(vec![&source_sidecars as &dyn Index, &sidecars]);

        let run = Run {
            source: &source,
            library: &library,
            catalog: &catalog,
            sidecars: &sidecars,
            library_chain: IndexChain::new(vec![&catalog as &dyn Index, &sidecars]),
            resolver: MetadataResolver::new(self.extractor, &lookup),
            reconciler: self.reconciler,
        };

        let whitelist: Option<Vec<String>> = options.extensions.as_ref().map(|exts| {
            exts.iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect()
        });
        let prune = [library.clone()];
        let filter = Filter {
            tables: &self.tables,
            whitelist: whitelist.as_deref(),
            min_multimedia_size: options.min_multimedia_size,
            min_other_size: options.min_other_size,
            prune: &prune,
        };

        let tp = ThrottledProgress::new(progress);
        let mut report = ImportReport {
            dry_run: options.dry_run,
            ..ImportReport::default()
        };

        let (tx, rx) = sync_channel(options.queue_depth.max(1));
        let result = thread::scope(|s| {
            let walk_token = token.clone();
            let source = run.source;
            let filter = &filter;
            let walker = s.spawn(move || discover::walk(source, filter, &walk_token, &tx));

            let consumed = self.consume(&run, rx, &token, &tp, &mut report);
            let walked = walker
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            consumed.and(walked)
        });
        tp.finish("import", report.stats.processed(), "Import finished");

        if !options.dry_run {
            let saved = catalog.save();
            let outcome = match &result {
                Ok(()) if report.limit_reached => RunOutcome::LimitReached,
                Ok(()) => RunOutcome::Completed,
                Err(Error::Cancelled) => RunOutcome::Cancelled,
                Err(_) => RunOutcome::Failed,
            };
            let logged = runlog::append(
                &library,
                &RunRecord {
                    started,
                    finished: Utc::now(),
                    source: source.clone(),
                    destination: library.clone(),
                    mode: options.mode,
                    outcome,
                    stats: report.stats.clone(),
                },
            );
            result?;
            saved?;
            logged?;
        } else {
            result?;
        }

        info!(
            imported = report.stats.imported,
            duplicates = report.stats.duplicated(),
            skipped = report.stats.skipped,
            "import finished"
        );
        Ok(report)
    }

    fn consume(
        &self,
        run: &Run<'_>,
        rx: Receiver<Result<Discovered>>,
        token: &CancellationToken,
        progress: &ThrottledProgress<'_>,
        report: &mut ImportReport,
    ) -> Result<()> {
        for item in rx {
            token.check()?;
            report.stats.discovered += 1;

            let decision = match item? {
                Discovered::Skipped { path, reason } => {
                    debug!(path = %path.display(), "skipped: {reason}");
                    report.stats.skipped += 1;
                    Decision {
                        source_path: path,
                        status: DuplicateStatus::Skipped,
                        checksum: None,
                        destination: None,
                        reason: Some(reason.to_string()),
                    }
                }
                Discovered::Candidate(candidate) => {
                    self.process(run, candidate, &mut report.stats)?
                }
            };
            progress.report(
                "import",
                report.stats.discovered,
                0,
                &file_name_of(&decision.source_path),
            );
            report.decisions.push(decision);

            if let Some(limit) = self.options.limit.filter(|&limit| limit > 0) {
                if report.stats.processed() >= limit {
                    info!(limit, "processing limit reached");
                    report.limit_reached = true;
                    break;
                }
            }
        }
        // Dropping `rx` here makes the walker's next send fail and stop.
        Ok(())
    }

    /// Build the record for one candidate, then act on its classification.
    fn process(
        &self,
        run: &Run<'_>,
        candidate: Candidate,
        stats: &mut ImportStats,
    ) -> Result<Decision> {
        let Candidate {
            path,
            size,
            class,
            modified,
            checksum,
        } = candidate;
        let source_name = file_name_of(&path);

        let resolved = run.resolver.resolve(&path, class, &checksum)?;
        if resolved.origin == MetadataOrigin::Fallback {
            stats.metadata_failures += 1;
        }
        let metadata = resolved.metadata;

        let takeout = takeout::find_takeout(&path, run.source, &checksum);
        let candidates = collect_candidates(&metadata, takeout, modified);
        let gps_zone = metadata.gps().and_then(|coord| self.zones.zone_at(coord));
        let created = run.reconciler.reconcile(&candidates, gps_zone, modified);

        let topic = planner::derive_topic(&metadata, &path, &self.tables);
        let destination = planner::plan(&checksum, &created, class, &topic, &source_name);
        let target = destination.under(run.library);
        let classification = duplicate::classify(
            &destination,
            &checksum,
            &source_name,
            &run.library_chain,
            self.fs.exists(&target),
        )?;

        let record = MediaRecord {
            source_path: path,
            size,
            checksum,
            metadata,
            created,
            modified: modified.fixed_offset(),
            classification: class,
            topic,
            destination,
            status: classification.status,
        };

        let mut reason = None;
        match record.status {
            DuplicateStatus::Unique => {
                self.import_unique(run, &record, &target)?;
                stats.imported += 1;
                stats.total_bytes += record.size;
            }
            DuplicateStatus::DuplicateByName => {
                if classification.known.is_none() {
                    warn!(path = %target.display(), "file present without index entry, repairing");
                    reason = Some("index repaired".to_string());
                }
                self.remember(run, &record)?;
                stats.duplicated_by_name += 1;
            }
            DuplicateStatus::DuplicateByContent => {
                if let Some(known) = &classification.known {
                    reason = Some(format!("same content as {}", known.destination));
                }
                self.quarantine(run, &record)?;
                stats.duplicated_by_content += 1;
            }
            DuplicateStatus::Skipped => {}
        }
        debug!(path = %record.source_path.display(), status = ?record.status, "classified");

        Ok(Decision {
            destination: Some(record.destination.relative_path()),
            checksum: Some(record.checksum),
            source_path: record.source_path,
            status: record.status,
            reason,
        })
    }

    fn import_unique(&self, run: &Run<'_>, record: &MediaRecord, target: &Path) -> Result<()> {
        if self.options.dry_run {
            run.catalog.insert_if_absent(&IndexEntry::from_record(record, false))?;
            return Ok(());
        }
        self.transfer(&record.source_path, target)?;

        if self.options.fix_dates {
            if let Err(err) = self.fs.fix_timestamps(target, record.created.time, record.modified) {
                warn!(path = %target.display(), "cannot set file times: {err}");
            }
        }

        // Data first, then sidecar, then catalog.
        self.remember(run, record)
    }

    /// Index `record` at its primary destination, where it is missing.
    fn remember(&self, run: &Run<'_>, record: &MediaRecord) -> Result<()> {
        let entry = IndexEntry::from_record(record, true);
        if !self.options.dry_run {
            run.sidecars.insert_if_absent(&entry)?;
        }
        run.catalog.insert_if_absent(&entry.summary())?;
        Ok(())
    }

    fn quarantine(&self, run: &Run<'_>, record: &MediaRecord) -> Result<()> {
        if self.options.dry_run || self.options.duplicates == DuplicatePolicy::Drop {
            return Ok(());
        }
        let area = store_dir(run.library).join(DUPLICATES_DIR);
        let target = record.destination.under(&area);
        if self.fs.exists(&target) {
            debug!(path = %target.display(), "already quarantined");
            return Ok(());
        }
        self.transfer(&record.source_path, &target)?;
        SidecarIndex::for_library(&area).insert_if_absent(&IndexEntry::from_record(record, true))?;
        Ok(())
    }

    fn transfer(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(dir) = to.parent() {
            self.fs.ensure_dir(dir).map_err(|e| Error::create_dir(dir, e))?;
        }
        let mode = self.options.mode;
        let result = match mode {
            TransferMode::Copy => self.fs.copy(from, to, true).map(|_| ()),
            TransferMode::Move => self.fs.move_file(from, to),
        };
        result.map_err(|source| Error::Transfer {
            op: mode.verb(),
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
    }
}
