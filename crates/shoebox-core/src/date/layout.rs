use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `2020:06:01 10:00:00`, optionally with sub-seconds and `Z`/`+02:00`.
/// Dashes or slashes are accepted as date separators.
static EXIF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})[:\-/](\d{2})[:\-/](\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:\.\d+)?\s*(Z|[+\-]\d{2}:?\d{2})?$",
    )
    .unwrap()
});

/// How a raw candidate string is expected to be laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Rfc3339,
    /// EXIF style; a value without offset is wall-clock time in the resolved zone.
    Exif,
    /// EXIF style, but a value without offset is UTC (GPS clocks).
    GpsUtc,
    UnixSeconds,
}

/// A parsed value, before it is placed in a timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    Instant(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

impl Parsed {
    /// Year as written for wall-clock values, in UTC for instants.
    pub fn year(&self) -> i32 {
        match self {
            Parsed::Instant(instant) => instant.naive_utc().year(),
            Parsed::Local(naive) => naive.year(),
        }
    }
}

impl Layout {
    /// `None` for empty or malformed input.
    pub fn parse(self, raw: &str) -> Option<Parsed> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(raw).ok().map(Parsed::Instant),
            Layout::UnixSeconds => {
                let secs = raw.parse::<i64>().ok()?;
                let utc = DateTime::<Utc>::from_timestamp(secs, 0)?;
                Some(Parsed::Instant(utc.fixed_offset()))
            }
            Layout::Exif => parse_exif(raw, false),
            Layout::GpsUtc => parse_exif(raw, true),
        }
    }
}

fn parse_exif(raw: &str, naive_is_utc: bool) -> Option<Parsed> {
    let caps = EXIF_RE.captures(raw)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = i32::try_from(num(1)?).ok()?;
    let naive =
        NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?.and_hms_opt(num(4)?, num(5)?, num(6)?)?;

    match caps.get(7).map(|m| m.as_str()) {
        Some("Z") => Some(Parsed::Instant(naive.and_utc().fixed_offset())),
        Some(offset) => {
            let offset = parse_offset(offset)?;
            naive
                .and_local_timezone(offset)
                .single()
                .map(Parsed::Instant)
        }
        None if naive_is_utc => Some(Parsed::Instant(naive.and_utc().fixed_offset())),
        None => Some(Parsed::Local(naive)),
    }
}

/// `+02:00`, `-0530`.
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = s[1..].chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_exif_naive_is_local() {
        assert_eq!(
            Layout::Exif.parse("2020:06:01 10:00:00"),
            Some(Parsed::Local(naive("2020-06-01 10:00:00")))
        );
        assert_eq!(
            Layout::Exif.parse("2020-06-01 10:00:00.25"),
            Some(Parsed::Local(naive("2020-06-01 10:00:00")))
        );
    }

    #[test]
    fn test_exif_with_offset() {
        let Some(Parsed::Instant(dt)) = Layout::Exif.parse("2020:06:01 10:00:00+02:00") else {
            panic!("expected an instant");
        };
        assert_eq!(dt.to_rfc3339(), "2020-06-01T10:00:00+02:00");

        let Some(Parsed::Instant(dt)) = Layout::Exif.parse("2020:06:01 10:00:00Z") else {
            panic!("expected an instant");
        };
        assert_eq!(dt.timestamp(), naive("2020-06-01 10:00:00").and_utc().timestamp());
    }

    #[test]
    fn test_gps_naive_is_utc() {
        let Some(Parsed::Instant(dt)) = Layout::GpsUtc.parse("2020:06:01 08:00:00") else {
            panic!("expected an instant");
        };
        assert_eq!(dt.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_unix_and_rfc3339() {
        let Some(Parsed::Instant(dt)) = Layout::UnixSeconds.parse("1591005600") else {
            panic!("expected an instant");
        };
        assert_eq!(dt.to_rfc3339(), "2020-06-01T10:00:00+00:00");
        assert!(Layout::Rfc3339.parse("2020-06-01T10:00:00+02:00").is_some());
    }

    #[test]
    fn test_malformed_values_are_discarded() {
        assert_eq!(Layout::Exif.parse(""), None);
        assert_eq!(Layout::Exif.parse("0000:00:00 00:00:00"), None);
        assert_eq!(Layout::Exif.parse("2020:13:01 10:00:00"), None);
        assert_eq!(Layout::Exif.parse("yesterday"), None);
        assert_eq!(Layout::UnixSeconds.parse("12abc"), None);
        assert_eq!(Layout::Rfc3339.parse("2020:06:01 10:00:00"), None);
    }
}
