use crate::error::Result;
use crate::index::{Index, IndexEntry};
use crate::media::{Destination, DuplicateStatus};

/// Outcome plus the index entry that decided it, when there is one.
#[derive(Debug, Clone)]
pub struct Classification {
    pub status: DuplicateStatus,
    pub known: Option<IndexEntry>,
}

/// Classify one planned import against the destination index.
///
/// * by name: this file was already imported at exactly this derived path,
///   or the derived path is occupied but no index remembers it;
/// * by content: the checksum is known under another path or source name;
/// * unique otherwise.
///
/// `destination_exists` reports whether the planned path is present on disk.
pub fn classify(
    planned: &Destination,
    checksum: &str,
    source_name: &str,
    index: &dyn Index,
    destination_exists: bool,
) -> Result<Classification> {
    let known = index.find(checksum)?;
    let status = match &known {
        Some(entry)
            if entry.destination == planned.relative_path()
                && (entry.source_name == source_name || source_name == planned.file_name()) =>
        {
            DuplicateStatus::DuplicateByName
        }
        Some(_) => DuplicateStatus::DuplicateByContent,
        None if destination_exists => DuplicateStatus::DuplicateByName,
        None => DuplicateStatus::Unique,
    };
    Ok(Classification { status, known })
}
