//! Writing the feed to a CSV file.

use crate::feed::csv;
use crate::feed::EventBuffer;
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub comment_count: usize,
}

/// Export errors.
#[derive(Debug)]
pub enum ExportError {
    /// The feed has no comments; nothing was written
    Empty,
    /// Writing the file failed
    Io(std::io::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Empty => write!(f, "No comments to export yet"),
            ExportError::Io(e) => write!(f, "Could not write export: {e}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Empty => None,
            ExportError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

/// Write the feed to `<dir>/tiktok_comments_<target>_<today>.csv`.
///
/// The date is today's UTC calendar date. An existing file with the same
/// name is overwritten.
pub fn export_feed(
    dir: &Path,
    target_username: &str,
    buffer: &EventBuffer,
) -> Result<ExportReceipt, ExportError> {
    export_feed_on(dir, target_username, buffer, Utc::now().date_naive())
}

/// Same as [`export_feed`] for an explicit calendar date.
pub fn export_feed_on(
    dir: &Path,
    target_username: &str,
    buffer: &EventBuffer,
    date: NaiveDate,
) -> Result<ExportReceipt, ExportError> {
    if buffer.is_empty() {
        return Err(ExportError::Empty);
    }

    std::fs::create_dir_all(dir)?;
    let path = dir.join(csv::export_filename(target_username, date));
    std::fs::write(&path, csv::serialize(buffer.iter()))?;

    tracing::info!(path = %path.display(), count = buffer.len(), "Feed exported");
    Ok(ExportReceipt {
        path,
        comment_count: buffer.len(),
    })
}
