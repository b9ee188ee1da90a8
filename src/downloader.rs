#![forbid(unsafe_code)]

//! Idempotent audio downloads through an external `yt-dlp` compatible tool.
//!
//! The presence of `<output_folder>/<base>.mp3` is the only record that a
//! video was fetched, so re-running a feed never downloads the same item
//! twice.

use crate::item::VideoItem;
use crate::runner::{CommandRunner, quoted_invocation};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The audio file was already present.
    Skipped,
    Succeeded,
    Failed(String),
}

/// A failed download. Stops the run.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DownloadError {
    pub video_id: String,
    pub message: String,
}

pub struct Downloader<'a> {
    runner: &'a dyn CommandRunner,
    binary: PathBuf,
    output_folder: PathBuf,
    audio_quality: Option<String>,
}

impl<'a> Downloader<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        binary: impl Into<PathBuf>,
        output_folder: impl Into<PathBuf>,
        audio_quality: Option<String>,
    ) -> Self {
        Self {
            runner,
            binary: binary.into(),
            output_folder: output_folder.into(),
            audio_quality: audio_quality.filter(|quality| !quality.trim().is_empty()),
        }
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn expected_path(&self, item: &VideoItem) -> PathBuf {
        self.output_folder.join(item.audio_file_name())
    }

    fn arguments(&self, item: &VideoItem) -> Vec<String> {
        let template = self
            .output_folder
            .join(format!("{}.%(ext)s", item.file_base_name));

        let mut args = vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
        ];
        if let Some(quality) = &self.audio_quality {
            args.push("--audio-quality".to_string());
            args.push(quality.clone());
        }
        args.push("-o".to_string());
        args.push(template.to_string_lossy().into_owned());
        args.push(item.playback_url.clone());
        args
    }

    /// Downloads one item unless its audio file already exists.
    pub fn download(&self, item: &VideoItem) -> DownloadOutcome {
        let target = self.expected_path(item);
        if target.is_file() {
            debug!(video_id = %item.id, path = %target.display(), "audio already present");
            return DownloadOutcome::Skipped;
        }

        let args = self.arguments(item);
        info!(video_id = %item.id, title = %item.title, "downloading audio");

        let (process_error, output) = match self.runner.run(&self.binary, &args) {
            Ok(result) => {
                debug!(video_id = %item.id, output = %result.output, "downloader output");
                if result.success() {
                    return DownloadOutcome::Succeeded;
                }
                (result.status_text(), result.output)
            }
            Err(err) => (err.to_string(), String::new()),
        };

        DownloadOutcome::Failed(format!(
            "could not download {}: {}\nParams: {}: {}",
            item.file_base_name,
            process_error,
            quoted_invocation(&self.binary, &args),
            output
        ))
    }

    /// Makes sure every item has its audio file, in order. The first failure
    /// aborts the remaining downloads.
    pub fn ensure(&self, items: &[VideoItem]) -> Result<Vec<DownloadOutcome>, DownloadError> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            match self.download(item) {
                DownloadOutcome::Failed(message) => {
                    return Err(DownloadError {
                        video_id: item.id.clone(),
                        message,
                    });
                }
                outcome => outcomes.push(outcome),
            }
        }
        Ok(outcomes)
    }
}
