use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use shoebox_core::metadata::MetadataExtractor;
use shoebox_core::{
    BuiltinExif, CancellationToken, DuplicatePolicy, Exiftool, GeoTimezones, ImportControl,
    ImportOptions, ImportReport, Importer, LocalFs, TransferMode,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_CANCELLED: u8 = 130;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExtractorKind {
    Exiftool,
    Builtin,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DuplicatesArg {
    Quarantine,
    Drop,
}

#[derive(Parser)]
#[command(
    name = "shoebox",
    version,
    about = "Import photos, videos and documents into a date-organized library"
)]
struct Cli {
    /// Directory to import from
    source: PathBuf,

    /// Library root (default: <SOURCE>-shoebox)
    destination: Option<PathBuf>,

    /// Resolve and classify everything, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many imported or duplicate files (0: no limit)
    #[arg(long)]
    limit: Option<u64>,

    /// Move files instead of copying them
    #[arg(long = "move")]
    move_files: bool,

    /// Only import these extensions, e.g. jpg,png
    #[arg(long, value_delimiter = ',')]
    ext: Vec<String>,

    /// Directory pattern to skip, replacing the default exclusions
    #[arg(long)]
    exclude: Option<String>,

    /// Set imported files' modification time to the resolved creation time
    #[arg(long)]
    fix_dates: bool,

    /// Timezone for times without offset or GPS position
    #[arg(long, env = "SHOEBOX_TIMEZONE", default_value = "UTC")]
    timezone: String,

    /// What to do with content already in the library
    #[arg(long, value_enum, default_value = "quarantine")]
    duplicates: DuplicatesArg,

    /// Metadata source
    #[arg(long, value_enum, default_value = "exiftool")]
    extractor: ExtractorKind,

    /// exiftool executable
    #[arg(long, default_value = "exiftool")]
    exiftool: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn options(&self) -> ImportOptions {
        let destination = self
            .destination
            .clone()
            .unwrap_or_else(|| default_destination(&self.source));
        ImportOptions {
            source: self.source.clone(),
            destination,
            dry_run: self.dry_run,
            limit: self.limit,
            mode: if self.move_files {
                TransferMode::Move
            } else {
                TransferMode::Copy
            },
            extensions: (!self.ext.is_empty()).then(|| self.ext.clone()),
            exclude: self.exclude.clone(),
            fix_dates: self.fix_dates,
            timezone: self.timezone.clone(),
            duplicates: match self.duplicates {
                DuplicatesArg::Quarantine => DuplicatePolicy::Quarantine,
                DuplicatesArg::Drop => DuplicatePolicy::Drop,
            },
            ..ImportOptions::default()
        }
    }
}

fn default_destination(source: &Path) -> PathBuf {
    let normalized: PathBuf = source.components().collect();
    let mut name = normalized.into_os_string();
    name.push("-shoebox");
    PathBuf::from(name)
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn extractor(cli: &Cli) -> Box<dyn MetadataExtractor> {
    match cli.extractor {
        ExtractorKind::Exiftool if Exiftool::is_available(&cli.exiftool) => {
            Box::new(Exiftool::new(&cli.exiftool))
        }
        ExtractorKind::Exiftool => {
            warn!(
                "{} not found, falling back to the built-in EXIF reader",
                cli.exiftool.display()
            );
            Box::new(BuiltinExif)
        }
        ExtractorKind::Builtin => Box::new(BuiltinExif),
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn run(cli: &Cli, token: CancellationToken) -> anyhow::Result<ImportReport> {
    let options = cli.options();
    let extractor = extractor(cli);
    let zones = GeoTimezones::new();
    let importer = Importer::new(&options, extractor.as_ref(), &zones, &LocalFs)
        .context("invalid import options")?;

    let pb = spinner(cli.quiet);
    let control = ImportControl::new().with_cancel_token(token);
    let result = importer.run(&control, &|_stage, current, _total, message| {
        pb.set_position(current);
        pb.set_message(message.to_string());
    });
    pb.finish_and_clear();

    result.with_context(|| {
        format!(
            "import from {} into {} failed",
            options.source.display(),
            options.destination.display()
        )
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let t_total = Instant::now();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("cannot install Ctrl-C handler: {err}");
    }

    match run(&cli, token) {
        Ok(report) => {
            let stats = &report.stats;
            info!(
                "{}{} imported, {} duplicates ({} by content, {} by name), {} skipped, {} metadata failures, {} bytes ({:.2}s)",
                if report.dry_run { "[dry run] " } else { "" },
                stats.imported,
                stats.duplicated(),
                stats.duplicated_by_content,
                stats.duplicated_by_name,
                stats.skipped,
                stats.metadata_failures,
                stats.total_bytes,
                t_total.elapsed().as_secs_f64()
            );
            if report.limit_reached {
                info!("stopped at the configured limit");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let cancelled = err.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<shoebox_core::Error>(),
                    Some(shoebox_core::Error::Cancelled)
                )
            });
            if cancelled {
                eprintln!("Cancelled.");
                ExitCode::from(EXIT_CANCELLED)
            } else {
                eprintln!("Error: {err:#}");
                ExitCode::FAILURE
            }
        }
    }
}
