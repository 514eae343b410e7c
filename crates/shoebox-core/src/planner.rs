//! Destination layout: `<bucket>/[<topic>/]<YYYY>/<MM>/<basename>.<ext>`.

use std::path::Path;

use unicode_normalization::UnicodeNormalization;

use crate::media::{Destination, MediaClass, ResolvedTime, Topic};
use crate::metadata::Metadata;
use crate::tables::Tables;

const MAX_BASENAME: usize = 224;

/// Camera first, then the first keyword rule over path and tool names, else generic.
pub fn derive_topic(metadata: &Metadata, source_path: &Path, tables: &Tables) -> Topic {
    if let Some(camera) = metadata.camera() {
        let slug = slugify(&camera);
        if !slug.is_empty() {
            return Topic::Camera(slug);
        }
    }

    let path = source_path.to_string_lossy();
    let haystacks = [
        path.as_ref(),
        metadata.get("CreatorTool").unwrap_or_default(),
        metadata.get("Software").unwrap_or_default(),
    ];
    match tables.match_topic(haystacks) {
        Some(name) => Topic::Source(name.to_string()),
        None => Topic::Generic,
    }
}

/// Compute the destination for one file. Pure: equal inputs give equal output.
///
/// `name_hint` is the original file name; its stem becomes a slug for
/// non-multimedia files and its extension is normalized.
pub fn plan(
    checksum: &str,
    created: &ResolvedTime,
    class: MediaClass,
    topic: &Topic,
    name_hint: &str,
) -> Destination {
    let time = created.time;
    let mut directory = class.bucket().to_string();
    if let Some(sub) = topic.subpath() {
        directory.push('/');
        directory.push_str(&sub);
    }
    directory.push_str(&time.format("/%Y/%m").to_string());

    let hint = Path::new(name_hint);
    let slug = if class.is_multimedia() {
        String::new()
    } else {
        hint.file_stem()
            .map(|s| slugify(&s.to_string_lossy()))
            .unwrap_or_default()
    };

    let basename = join_basename(&time.format("%Y%m%d-%H%M%S").to_string(), checksum, slug);

    let extension = hint
        .extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default();

    Destination {
        directory,
        basename,
        extension,
    }
}

pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim_start_matches('.').to_lowercase();
    match ext.as_str() {
        "jpeg" | "jpe" => "jpg".to_string(),
        "tif" => "tiff".to_string(),
        _ => ext,
    }
}

/// Lowercase ASCII slug; runs of anything else become one `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for c in text.nfkd().filter(char::is_ascii) {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// `<stamp>[-<checksum>][-<slug>]` within the length cap. Only the slug is
/// cut; the checksum always survives whole, exactly once.
fn join_basename(stamp: &str, checksum: &str, mut slug: String) -> String {
    let sum = checksum.to_lowercase();
    let contains_sum = |s: &str| s.to_lowercase().contains(&sum);

    let mut basename = stamp.to_string();
    if contains_sum(&slug) {
        let mut cut = slug.clone();
        truncate(&mut cut, MAX_BASENAME.saturating_sub(basename.len() + 1));
        if contains_sum(&cut) {
            basename.push('-');
            basename.push_str(&cut);
            return basename;
        }
    }

    basename.push('-');
    basename.push_str(checksum);
    truncate(&mut slug, MAX_BASENAME.saturating_sub(basename.len() + 1));
    if !slug.is_empty() {
        basename.push('-');
        basename.push_str(&slug);
    }
    basename
}

fn truncate(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TimeSource;
    use chrono::DateTime;

    const SUM: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn at(rfc3339: &str) -> ResolvedTime {
        ResolvedTime {
            time: DateTime::parse_from_rfc3339(rfc3339).unwrap(),
            timezone: "UTC".to_string(),
            source: TimeSource::DateTimeOriginal,
        }
    }

    fn document(name: &str) -> Destination {
        plan(
            SUM,
            &at("2021-03-01T08:00:00+00:00"),
            MediaClass::Document,
            &Topic::Generic,
            name,
        )
    }

    #[test]
    fn test_plan_image() {
        let dest = plan(
            SUM,
            &at("2020-06-01T10:00:00+00:00"),
            MediaClass::Image,
            &Topic::Generic,
            "photo1.JPEG",
        );
        assert_eq!(dest.directory, "images/2020/06");
        assert_eq!(dest.basename, format!("20200601-100000-{SUM}"));
        assert_eq!(dest.extension, "jpg");
    }

    #[test]
    fn test_plan_is_deterministic() {
        let created = at("2019-12-31T23:59:59+09:00");
        let topic = Topic::Camera("apple_iphone_12".into());
        let first = plan(SUM, &created, MediaClass::Video, &topic, "IMG_0001.MOV");
        for _ in 0..10 {
            assert_eq!(plan(SUM, &created, MediaClass::Video, &topic, "IMG_0001.MOV"), first);
        }
        assert_eq!(first.directory, "videos/cameras/apple_iphone_12/2019/12");
        assert_eq!(first.basename, format!("20191231-235959-{SUM}"));
    }

    #[test]
    fn test_documents_carry_a_slug() {
        let dest = plan(
            SUM,
            &at("2021-03-01T08:00:00+00:00"),
            MediaClass::Document,
            &Topic::Generic,
            "Tax Return (Final) – 2020.PDF",
        );
        assert_eq!(dest.basename, format!("20210301-080000-{SUM}-tax_return_final_2020"));
        assert_eq!(dest.extension, "pdf");
    }

    #[test]
    fn test_checksum_not_repeated_when_slug_has_it() {
        let name = format!("backup-{}.txt", SUM.to_uppercase());
        let dest = document(&name);
        assert_eq!(dest.basename.to_lowercase().matches(SUM).count(), 1);
        assert_eq!(dest.basename, format!("20210301-080000-backup_{SUM}"));
    }

    #[test]
    fn test_basename_is_capped() {
        let name = format!("{}.md", "word ".repeat(100));
        let dest = document(&name);
        assert_eq!(dest.basename.len(), MAX_BASENAME);
        assert_eq!(dest.extension, "md");
    }

    #[test]
    fn test_cap_keeps_embedded_checksum() {
        let name = format!("{}{SUM}.txt", "x".repeat(150));
        let dest = document(&name);
        assert_eq!(dest.basename.len(), MAX_BASENAME);
        assert_eq!(dest.basename.matches(SUM).count(), 1);
        assert!(dest.basename.starts_with(&format!("20210301-080000-{SUM}-xxx")));

        let other = "0".repeat(64);
        let other_dest = plan(
            &other,
            &at("2021-03-01T08:00:00+00:00"),
            MediaClass::Document,
            &Topic::Generic,
            &format!("{}{other}.txt", "x".repeat(150)),
        );
        assert_ne!(dest.basename, other_dest.basename);
        assert_eq!(other_dest.basename.matches(other.as_str()).count(), 1);
    }

    #[test]
    fn test_missing_extension() {
        let dest = plan(
            SUM,
            &at("2021-03-01T08:00:00+00:00"),
            MediaClass::Unknown,
            &Topic::Generic,
            "README",
        );
        assert_eq!(dest.extension, "");
        assert_eq!(dest.file_name(), dest.basename);
        assert!(dest.directory.starts_with("others/"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Canon EOS 5D Mark II"), "canon_eos_5d_mark_ii");
        assert_eq!(slugify("  Café déjà-vu!! "), "cafe_deja_vu");
        assert_eq!(slugify("スクリーンショット"), "");
        assert_eq!(normalize_extension(".TIF"), "tiff");
        assert_eq!(normalize_extension("jpe"), "jpg");
    }

    #[test]
    fn test_derive_topic() {
        let tables = Tables::default();
        let mut meta = Metadata::new();
        assert_eq!(derive_topic(&meta, Path::new("/in/IMG_1.jpg"), &tables), Topic::Generic);
        assert_eq!(
            derive_topic(&meta, Path::new("/in/WhatsApp Images/IMG-1.jpg"), &tables),
            Topic::Source("whatsapp".into())
        );

        meta.insert("Software", "Instagram 150.0");
        assert_eq!(
            derive_topic(&meta, Path::new("/in/IMG_1.jpg"), &tables),
            Topic::Source("instagram".into())
        );

        meta.insert("Make", "Apple");
        meta.insert("Model", "iPhone 12");
        assert_eq!(
            derive_topic(&meta, Path::new("/in/WhatsApp/IMG-1.jpg"), &tables),
            Topic::Camera("apple_iphone_12".into())
        );
    }
}
