#![forbid(unsafe_code)]

//! File size and playback duration of downloaded audio.

use crate::runner::CommandRunner;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d\d:\d\d:\d\d)\.\d+, start").expect("duration pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    /// Size in bytes, 0 when the file is missing.
    pub length: u64,
    /// `HH:MM:SS`, when the probe tool reported one.
    pub duration: Option<String>,
}

/// Best-effort metadata lookup; nothing here fails a run.
pub struct Prober<'a> {
    runner: &'a dyn CommandRunner,
    binary: PathBuf,
}

impl<'a> Prober<'a> {
    pub fn new(runner: &'a dyn CommandRunner, binary: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    pub fn probe(&self, path: &Path) -> Probe {
        let length = match fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "audio file missing, not probing");
                return Probe::default();
            }
        };

        Probe {
            length,
            duration: self.duration(path),
        }
    }

    fn duration(&self, path: &Path) -> Option<String> {
        let args = [path.to_string_lossy().into_owned()];
        let result = match self.runner.run(&self.binary, &args) {
            Ok(result) => result,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "could not run probe");
                return None;
            }
        };
        if !result.success() {
            debug!(
                path = %path.display(),
                status = %result.status_text(),
                output = %result.output,
                "probe failed"
            );
            return None;
        }

        let duration = parse_duration(&result.output);
        if duration.is_none() {
            debug!(path = %path.display(), "no duration in probe output");
        }
        duration
    }
}

/// Extracts `HH:MM:SS` from ffprobe style output.
pub fn parse_duration(output: &str) -> Option<String> {
    DURATION_PATTERN
        .captures(output)
        .map(|captures| captures[1].to_string())
}
