//! Creation-time reconciliation.
//!
//! Every timestamp the file carries is a candidate. Valid candidates are
//! pooled and the earliest one wins; when none survives, the filesystem
//! modification time is used in the default zone.

pub mod layout;
pub mod takeout;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::trace;

use crate::error::{Error, Result};
use crate::media::{ResolvedTime, TimeSource};
use crate::metadata::Metadata;
pub use layout::{Layout, Parsed};

/// Candidates from a camera with an unset clock land at or before this year.
const MIN_VALID_YEAR: i32 = 1970;

/// Embedded fields considered, in the order they are gathered.
const EMBEDDED_FIELDS: &[(TimeSource, &str, Layout)] = &[
    (TimeSource::CreateDate, "CreateDate", Layout::Exif),
    (TimeSource::DateTimeOriginal, "DateTimeOriginal", Layout::Exif),
    (TimeSource::DateTimeDigitized, "DateTimeDigitized", Layout::Exif),
    (TimeSource::GpsDateTime, "GPSDateTime", Layout::GpsUtc),
    (TimeSource::FileModifyDate, "FileModifyDate", Layout::Exif),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeCandidate {
    pub source: TimeSource,
    pub raw: String,
    pub layout: Layout,
}

impl TimeCandidate {
    pub fn new(source: TimeSource, raw: impl Into<String>, layout: Layout) -> Self {
        Self {
            source,
            raw: raw.into(),
            layout,
        }
    }
}

/// Gather the candidate list for one file.
pub fn collect_candidates(
    metadata: &Metadata,
    takeout: Option<i64>,
    fs_modified: DateTime<Utc>,
) -> Vec<TimeCandidate> {
    let mut candidates = vec![TimeCandidate::new(
        TimeSource::FileModified,
        fs_modified.to_rfc3339(),
        Layout::Rfc3339,
    )];
    if let Some(epoch) = takeout {
        candidates.push(TimeCandidate::new(
            TimeSource::Takeout,
            epoch.to_string(),
            Layout::UnixSeconds,
        ));
    }
    for (source, key, layout) in EMBEDDED_FIELDS {
        if let Some(raw) = metadata.get(key) {
            candidates.push(TimeCandidate::new(*source, raw, *layout));
        }
    }
    candidates
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    default_zone: Tz,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl Reconciler {
    pub fn new(default_zone: Tz) -> Self {
        Self { default_zone }
    }

    /// Build from an IANA name such as `Europe/Berlin`.
    pub fn from_zone_name(name: &str) -> Result<Self> {
        name.parse::<Tz>()
            .map(Self::new)
            .map_err(|_| Error::UnknownTimezone(name.to_string()))
    }

    /// Pick the authoritative creation time. Never fails.
    ///
    /// `gps_zone` localizes the result (and any naive wall-clock candidate);
    /// without it the default zone is used.
    pub fn reconcile(
        &self,
        candidates: &[TimeCandidate],
        gps_zone: Option<Tz>,
        fs_modified: DateTime<Utc>,
    ) -> ResolvedTime {
        let zone = gps_zone.unwrap_or(self.default_zone);

        let chosen = candidates
            .iter()
            .filter_map(|c| {
                let parsed = c.layout.parse(&c.raw)?;
                if parsed.year() <= MIN_VALID_YEAR {
                    trace!(source = ?c.source, raw = %c.raw, "discarding pre-epoch candidate");
                    return None;
                }
                Some((localize(parsed, zone), c.source))
            })
            .min_by_key(|(time, source)| {
                (time.timestamp(), time.timestamp_subsec_nanos(), *source)
            });

        match chosen {
            Some((time, source)) => ResolvedTime {
                time: time.fixed_offset(),
                timezone: zone.name().to_string(),
                source,
            },
            None => ResolvedTime {
                time: fs_modified.with_timezone(&self.default_zone).fixed_offset(),
                timezone: self.default_zone.name().to_string(),
                source: TimeSource::FileModified,
            },
        }
    }
}

fn localize(parsed: Parsed, zone: Tz) -> DateTime<Tz> {
    match parsed {
        Parsed::Instant(instant) => instant.with_timezone(&zone),
        // A wall-clock time inside a DST gap has no local reading; take it as UTC.
        Parsed::Local(naive) => zone
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| zone.from_utc_datetime(&naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn mtime() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2023, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn exif(source: TimeSource, raw: &str) -> TimeCandidate {
        TimeCandidate::new(source, raw, Layout::Exif)
    }

    #[test]
    fn test_earliest_candidate_wins() {
        let candidates = [
            exif(TimeSource::CreateDate, "2021:05:01 00:00:00"),
            exif(TimeSource::DateTimeOriginal, "2021:03:01 00:00:00"),
            exif(TimeSource::DateTimeDigitized, "2021:04:01 00:00:00"),
        ];
        let resolved = Reconciler::default().reconcile(&candidates, None, mtime());
        assert_eq!(resolved.time.to_rfc3339(), "2021-03-01T00:00:00+00:00");
        assert_eq!(resolved.source, TimeSource::DateTimeOriginal);
        assert_eq!(resolved.timezone, "UTC");
    }

    #[test]
    fn test_choice_ignores_candidate_order() {
        let mut candidates = vec![
            exif(TimeSource::CreateDate, "2021:05:01 00:00:00"),
            exif(TimeSource::DateTimeOriginal, "2021:03:01 00:00:00"),
            exif(TimeSource::FileModifyDate, "2021:04:01 00:00:00+00:00"),
        ];
        let reconciler = Reconciler::default();
        let first = reconciler.reconcile(&candidates, None, mtime());
        candidates.reverse();
        assert_eq!(reconciler.reconcile(&candidates, None, mtime()), first);
    }

    #[test]
    fn test_invalid_years_fall_back_to_mtime() {
        let candidates = [
            exif(TimeSource::DateTimeOriginal, "0000:00:00 00:00:00"),
            exif(TimeSource::CreateDate, "1969:12:31 23:00:00"),
            exif(TimeSource::DateTimeDigitized, "garbage"),
        ];
        let resolved = Reconciler::default().reconcile(&candidates, None, mtime());
        assert_eq!(resolved.source, TimeSource::FileModified);
        assert_eq!(resolved.time, mtime().fixed_offset());
    }

    #[test]
    fn test_year_guard_ignores_zone() {
        let candidates = [TimeCandidate::new(
            TimeSource::FileModifyDate,
            "1971-01-01T00:30:00+00:00",
            Layout::Rfc3339,
        )];
        let resolved = Reconciler::from_zone_name("America/New_York")
            .unwrap()
            .reconcile(&candidates, None, mtime());
        assert_eq!(resolved.source, TimeSource::FileModifyDate);
        assert_eq!(resolved.time.to_rfc3339(), "1970-12-31T19:30:00-05:00");
    }

    #[test]
    fn test_fallback_uses_default_zone() {
        let reconciler = Reconciler::from_zone_name("Europe/Berlin").unwrap();
        let resolved = reconciler.reconcile(&[], Some(Tz::Asia__Tokyo), mtime());
        assert_eq!(resolved.timezone, "Europe/Berlin");
        assert_eq!(resolved.time.to_rfc3339(), "2023-01-15T13:00:00+01:00");
    }

    #[test]
    fn test_gps_zone_localizes_result() {
        let candidates = [
            exif(TimeSource::DateTimeOriginal, "2020:06:01 10:00:00"),
            TimeCandidate::new(TimeSource::GpsDateTime, "2020:06:01 08:30:00", Layout::GpsUtc),
        ];
        let resolved =
            Reconciler::default().reconcile(&candidates, Some(Tz::Europe__Madrid), mtime());
        assert_eq!(resolved.timezone, "Europe/Madrid");
        // 10:00 local in Madrid is 08:00 UTC, earlier than the 08:30 GPS stamp.
        assert_eq!(resolved.time.to_rfc3339(), "2020-06-01T10:00:00+02:00");
        assert_eq!(resolved.source, TimeSource::DateTimeOriginal);
    }

    #[test]
    fn test_collect_candidates() {
        let mut meta = Metadata::new();
        meta.insert("DateTimeOriginal", "2020:06:01 10:00:00");
        meta.insert("GPSDateTime", "2020:06:01 08:00:00Z");
        meta.insert("Make", "Canon");
        let candidates = collect_candidates(&meta, Some(1591005600), mtime());
        let sources: Vec<TimeSource> = candidates.iter().map(|c| c.source).collect();
        assert_eq!(
            sources,
            [
                TimeSource::FileModified,
                TimeSource::Takeout,
                TimeSource::DateTimeOriginal,
                TimeSource::GpsDateTime
            ]
        );
    }

    #[test]
    fn test_unknown_zone_name() {
        assert!(matches!(
            Reconciler::from_zone_name("Mars/Olympus"),
            Err(Error::UnknownTimezone(_))
        ));
    }
}
