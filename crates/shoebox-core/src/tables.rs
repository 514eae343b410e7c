use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::media::MediaClass;

/// Extensions per media class, lowercase without the dot.
/// Contacts come first so `vcf` never falls through to documents.
const CLASS_EXTENSIONS: &[(MediaClass, &[&str])] = &[
    (MediaClass::Contact, &["vcf"]),
    (
        MediaClass::Image,
        &[
            "jpg", "jpeg", "jpe", "gif", "png", "heic", "heif", "webp", "tiff", "tif", "bmp",
            "raw", "svg", "psd", "ai", "cr2", "nef", "arw", "dng",
        ],
    ),
    (
        MediaClass::Video,
        &[
            "mpg", "mpeg", "wmv", "avi", "mov", "m4v", "3gp", "mp4", "flv", "webm", "ogv", "ts",
            "mts", "divx", "mkv",
        ],
    ),
    (
        MediaClass::Audio,
        &["mp3", "m4a", "aac", "wav", "ogg", "oga", "wma", "flac", "opus", "amr"],
    ),
    (
        MediaClass::Document,
        &["doc", "docx", "xls", "xlsx", "md", "pdf", "ics", "mbox", "afphoto", "txt"],
    ),
    (
        MediaClass::Archive,
        &["zip", "gz", "tgz", "7z", "rar", "tar", "bz2", "xz", "bak"],
    ),
];

/// Directory names pruned from the walk unless a custom pattern is given.
const DEFAULT_EXCLUDED_DIRS: &str =
    r"(?i)(^|/)(\.[^/]*|node_modules|bower_components|vendor|developer)(/|$)";

/// Keyword rules for the destination topic, first match wins.
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "screenshots",
        &[
            "Screen Shot",
            "Screenshot",
            "Screen Record",
            "Captura",
            "Bildschirmfoto",
            "スクリーンショット",
            "截屏",
        ],
    ),
    ("whatsapp", &["whatsapp"]),
    ("telegram", &["telegram"]),
    ("signal", &["signal"]),
    ("messenger", &["messenger"]),
    ("facebook", &["facebook"]),
    ("instagram", &["instagram"]),
    ("twitter", &["twitter"]),
    ("snapchat", &["snapchat"]),
    ("music", &["itunes", "music", "songs", "karaoke", "bgm"]),
];

static DEFAULT_EXCLUSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_EXCLUDED_DIRS).unwrap());

static DEFAULT_TOPICS: LazyLock<Vec<TopicRule>> = LazyLock::new(|| {
    TOPIC_KEYWORDS
        .iter()
        .map(|(name, keywords)| TopicRule {
            name: name.to_string(),
            pattern: keyword_regex(keywords),
        })
        .collect()
});

#[derive(Debug, Clone)]
pub struct TopicRule {
    pub name: String,
    pub pattern: Regex,
}

/// Immutable lookup tables handed to discovery and the planner.
#[derive(Debug, Clone)]
pub struct Tables {
    pub classes: Vec<(MediaClass, Vec<String>)>,
    /// Matched against the `/`-separated directory path relative to the source root.
    pub exclusions: Regex,
    pub topics: Vec<TopicRule>,
}

impl Default for Tables {
    fn default() -> Self {
        let classes = CLASS_EXTENSIONS
            .iter()
            .map(|(class, exts)| (*class, exts.iter().map(|e| e.to_string()).collect()))
            .collect();

        Self {
            classes,
            exclusions: DEFAULT_EXCLUSIONS.clone(),
            topics: DEFAULT_TOPICS.clone(),
        }
    }
}

impl Tables {
    /// Replace the default exclusion set with a user pattern (case-insensitive).
    pub fn with_exclusions(mut self, pattern: &str) -> Result<Self> {
        self.exclusions = Regex::new(&format!("(?i){pattern}"))?;
        Ok(self)
    }

    pub fn classify(&self, extension: &str) -> MediaClass {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.classes
            .iter()
            .find(|(_, exts)| exts.iter().any(|e| *e == ext))
            .map(|(class, _)| *class)
            .unwrap_or(MediaClass::Unknown)
    }

    pub fn is_excluded_dir(&self, relative_dir: &str) -> bool {
        !relative_dir.is_empty() && self.exclusions.is_match(relative_dir)
    }

    /// Name of the first topic rule matching any of the haystacks.
    pub fn match_topic<'a, I>(&self, haystacks: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.topics
            .iter()
            .find(|rule| haystacks.clone().into_iter().any(|h| rule.pattern.is_match(h)))
            .map(|rule| rule.name.as_str())
    }
}

fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!("(?i)({})", alternatives.join("|"))).unwrap()
}
