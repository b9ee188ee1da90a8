#![forbid(unsafe_code)]

//! Removes files in the output folder that the current run does not
//! reference.

use crate::item::VideoItem;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("could not list {}: {source}", .path.display())]
    List {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("could not remove unrelated file {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },
    #[error("could not write removal notice: {0}")]
    Notice(#[source] io::Error),
}

/// Absolute form of `path` with `.` and `..` resolved lexically, so that two
/// spellings of the same location compare equal.
fn absolute(path: &Path) -> PathBuf {
    let joined = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Absolute paths the run owns: the feed file, when one is written, and the
/// audio file of every item.
pub fn related_files(
    items: &[VideoItem],
    feed_file: Option<&Path>,
    output_folder: &Path,
) -> BTreeSet<PathBuf> {
    let folder = absolute(output_folder);
    let mut related: BTreeSet<PathBuf> = items
        .iter()
        .map(|item| folder.join(item.audio_file_name()))
        .collect();
    if let Some(feed_file) = feed_file {
        related.insert(absolute(feed_file));
    }
    related
}

pub struct DirectoryCleaner {
    folder: PathBuf,
}

impl DirectoryCleaner {
    pub fn new(folder: &Path) -> Self {
        Self {
            folder: absolute(folder),
        }
    }

    /// Deletes every direct child of the folder that is not in `related`,
    /// writing a notice for each one before touching it. Stops at the first
    /// failure; files removed until then stay removed.
    pub fn clean(
        &self,
        related: &BTreeSet<PathBuf>,
        diag: &mut dyn Write,
    ) -> Result<Vec<PathBuf>, CleanupError> {
        let mut removed = Vec::new();
        let entries = WalkDir::new(&self.folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in entries {
            let entry = entry.map_err(|source| CleanupError::List {
                path: self.folder.clone(),
                source,
            })?;
            let path = entry.path().to_path_buf();
            if related.contains(&path) {
                continue;
            }

            writeln!(diag, "Removing file: {}", path.display()).map_err(CleanupError::Notice)?;
            let result = if entry.file_type().is_dir() {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|source| CleanupError::Remove {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "removed unrelated file");
            removed.push(path);
        }

        Ok(removed)
    }
}
