use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Local};
use exif::{Exif, Field, In, Reader, Tag, Value};

use super::{ExtractError, Metadata, MetadataExtractor, KEY_SOURCE_FILE};
use crate::media::{file_name_of, MediaClass};

/// EXIF tags copied verbatim, under the names exiftool reports them with.
const ASCII_TAGS: &[(Tag, &str)] = &[
    (Tag::Make, "Make"),
    (Tag::Model, "Model"),
    (Tag::Software, "Software"),
    (Tag::DateTimeOriginal, "DateTimeOriginal"),
    (Tag::DateTimeDigitized, "DateTimeDigitized"),
    (Tag::DateTime, "ModifyDate"),
];

/// Pure-Rust extractor: filesystem attributes for every file, EXIF for images.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinExif;

impl MetadataExtractor for BuiltinExif {
    fn extract(&self, path: &Path, class: MediaClass) -> Result<Metadata, ExtractError> {
        let stat = std::fs::metadata(path)?;
        let mut meta = Metadata::new();
        meta.insert(KEY_SOURCE_FILE, path.to_string_lossy());
        meta.insert("FileName", file_name_of(path));
        meta.insert("FileSize", stat.len().to_string());
        if let Ok(modified) = stat.modified() {
            let local: DateTime<Local> = modified.into();
            meta.insert("FileModifyDate", local.format("%Y:%m:%d %H:%M:%S%:z").to_string());
        }
        if let Some(mime) = mime_guess::from_path(path).first() {
            meta.insert("MIMEType", mime.essence_str());
        }

        if class == MediaClass::Image {
            // Containers without EXIF (png, svg, ...) are normal; keep the file attributes.
            if let Ok(exif) = read_exif(path) {
                copy_exif(&exif, &mut meta);
            }
        }
        Ok(meta)
    }
}

fn read_exif(path: &Path) -> Result<Exif, exif::Error> {
    let file = File::open(path)?;
    Reader::new().read_from_container(&mut BufReader::new(file))
}

fn copy_exif(exif: &Exif, meta: &mut Metadata) {
    let field = |tag| exif.get_field(tag, In::PRIMARY);

    for (tag, key) in ASCII_TAGS {
        if let Some(text) = field(*tag).and_then(ascii) {
            meta.insert(*key, text);
        }
    }

    let width = [Tag::PixelXDimension, Tag::ImageWidth]
        .into_iter()
        .find_map(|t| field(t).and_then(|f| f.value.get_uint(0)));
    let height = [Tag::PixelYDimension, Tag::ImageLength]
        .into_iter()
        .find_map(|t| field(t).and_then(|f| f.value.get_uint(0)));
    if let (Some(w), Some(h)) = (width, height) {
        meta.insert("ImageWidth", w.to_string());
        meta.insert("ImageHeight", h.to_string());
    }

    let lat = coordinate(field(Tag::GPSLatitude), field(Tag::GPSLatitudeRef), "S");
    let lon = coordinate(field(Tag::GPSLongitude), field(Tag::GPSLongitudeRef), "W");
    if let (Some(lat), Some(lon)) = (lat, lon) {
        meta.insert("GPSPosition", format!("{lat:.6}, {lon:.6}"));
    }

    if let (Some(date), Some(time)) = (
        field(Tag::GPSDateStamp).and_then(ascii),
        field(Tag::GPSTimeStamp).and_then(rationals),
    ) {
        if let [h, m, s] = time.as_slice() {
            meta.insert(
                "GPSDateTime",
                format!("{date} {:02}:{:02}:{:02}Z", *h as u32, *m as u32, *s as u32),
            );
        }
    }
}

fn ascii(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(parts) => {
            let text = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

fn rationals(field: &Field) -> Option<Vec<f64>> {
    match &field.value {
        Value::Rational(values) => Some(values.iter().map(|r| r.to_f64()).collect()),
        _ => None,
    }
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn coordinate(value: Option<&Field>, reference: Option<&Field>, negative: &str) -> Option<f64> {
    let parts = rationals(value?)?;
    let [deg, min, sec] = parts.as_slice() else {
        return None;
    };
    let decimal = deg + min / 60.0 + sec / 3600.0;
    if !decimal.is_finite() {
        return None;
    }
    let is_negative = reference
        .and_then(ascii)
        .is_some_and(|r| r.eq_ignore_ascii_case(negative));
    Some(if is_negative { -decimal } else { decimal })
}
