//! Export sidecars (`<name>.json` next to the media file) carrying
//! `photoTakenTime.timestamp`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::index::sidecar;

/// Longest sidecar file name the exporter writes, `.json` included.
const MAX_JSON_NAME: usize = 51;

static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d+\)\.").unwrap());

/// Epoch seconds from a takeout JSON document; values <= 1 mean "unset".
pub fn parse_takeout(bytes: &[u8]) -> Option<i64> {
    let data: Value = serde_json::from_slice(bytes).ok()?;
    let timestamp = data.get("photoTakenTime")?.get("timestamp")?;
    let epoch = match timestamp {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    (epoch > 1).then_some(epoch)
}

/// Paths probed for a takeout document, in order.
pub fn sidecar_candidates(source: &Path, source_root: &Path, checksum: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let name = source.file_name().and_then(|n| n.to_str());
    if let (Some(dir), Some(name)) = (source.parent(), name) {
        let variants = [
            name.to_string(),
            shorten_name(name),
            bracket_swap(name),
            no_extension(name),
        ];
        for variant in variants {
            let path = dir.join(format!("{variant}.json"));
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths.push(sidecar::takeout_path(source_root, checksum));
    paths
}

/// First parseable takeout timestamp for `source`.
pub fn find_takeout(source: &Path, source_root: &Path, checksum: &str) -> Option<i64> {
    sidecar_candidates(source, source_root, checksum)
        .into_iter()
        .find_map(|path| {
            let bytes = std::fs::read(&path).ok()?;
            let epoch = parse_takeout(&bytes);
            if epoch.is_some() {
                debug!(path = %path.display(), "using takeout timestamp");
            }
            epoch
        })
}

fn shorten_name(name: &str) -> String {
    let max = MAX_JSON_NAME - ".json".len();
    if name.len() <= max {
        return name.to_string();
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// `IMG(1).jpg` is described by `IMG.jpg(1).json`.
fn bracket_swap(name: &str) -> String {
    let Some(found) = BRACKET_RE.find_iter(name).last() else {
        return name.to_string();
    };
    let bracket = &found.as_str()[..found.as_str().len() - 1];
    let mut swapped = String::with_capacity(name.len());
    swapped.push_str(&name[..found.start()]);
    swapped.push_str(&name[found.start() + bracket.len()..]);
    swapped.push_str(bracket);
    swapped
}

fn no_extension(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}
