use chrono_tz::Tz;
use tzf_rs::DefaultFinder;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoord {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parse an exiftool position, either `39 deg 34' 4.66" N, 2 deg 38' 40.34" E`
/// or decimal `39.5679, 2.6445`. Anything else is `None`.
pub fn parse_position(position: &str) -> Option<GpsCoord> {
    let (lat, lng) = position.trim().split_once(',')?;
    let coord = GpsCoord {
        latitude: parse_part(lat.trim())?,
        longitude: parse_part(lng.trim())?,
    };
    let valid = coord.latitude.abs() <= 90.0 && coord.longitude.abs() <= 180.0;
    valid.then_some(coord)
}

fn parse_part(part: &str) -> Option<f64> {
    if let Ok(decimal) = part.parse::<f64>() {
        return decimal.is_finite().then_some(decimal);
    }

    // `2 deg 38' 40.34" E`
    let chunks: Vec<&str> = part.split_whitespace().collect();
    let &[deg, "deg", minutes, seconds, reference] = chunks.as_slice() else {
        return None;
    };
    let number = |s: &str| s.trim_matches(|c| c == '\'' || c == '"').parse::<f64>().ok();
    let value = number(deg)? + number(minutes)? / 60.0 + number(seconds)? / 3600.0;

    match reference.to_uppercase().as_str() {
        "N" | "E" => Some(value),
        "S" | "W" => Some(-value),
        _ => None,
    }
}

/// Maps a coordinate to the zone observed there.
pub trait TimezoneLookup {
    fn zone_at(&self, coord: GpsCoord) -> Option<Tz>;
}

/// Offline lookup over the bundled timezone boundary polygons.
pub struct GeoTimezones {
    finder: DefaultFinder,
}

impl GeoTimezones {
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }
}

impl Default for GeoTimezones {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneLookup for GeoTimezones {
    fn zone_at(&self, coord: GpsCoord) -> Option<Tz> {
        let name = self.finder.get_tz_name(coord.longitude, coord.latitude);
        name.parse::<Tz>().ok()
    }
}

/// Never resolves a zone; every record uses the configured default.
pub struct NoTimezones;

impl TimezoneLookup for NoTimezones {
    fn zone_at(&self, _coord: GpsCoord) -> Option<Tz> {
        None
    }
}
