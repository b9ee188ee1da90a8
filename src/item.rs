#![forbid(unsafe_code)]

//! Catalog records and the validated `VideoItem` the rest of the pipeline
//! works with.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub const PLAYBACK_URL_BASE: &str = "https://youtu.be";

/// One catalog record before validation. Fields the catalog omitted stay
/// `None` so the normalizer can tell "missing" apart from "empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawVideo {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// A video that passed validation. Read-only for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoItem {
    pub id: String,
    pub title: String,
    /// Catalog description followed by the playback URL.
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
    /// `<sanitized-title>-<id>`, shared by the audio file and the feed entry.
    pub file_base_name: String,
    pub playback_url: String,
}

impl VideoItem {
    /// Name of the audio file inside the output folder.
    pub fn audio_file_name(&self) -> String {
        format!("{}.mp3", self.file_base_name)
    }

    pub fn title_matches(&self, filter: &str) -> bool {
        self.title.contains(filter)
    }
}

/// Why a record was left out of the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("video has no id")]
    MissingId,
    #[error("title not set on video {0}")]
    MissingTitle(String),
    #[error("description not set on video {0}")]
    MissingDescription(String),
    #[error("published date not set on video {0}")]
    MissingPublishDate(String),
    #[error("error parsing publish date on video {id}: {reason}")]
    InvalidPublishDate { id: String, reason: String },
}

impl Rejection {
    /// Records without an id reference nothing and are dropped without a
    /// warning.
    pub fn is_silent(&self) -> bool {
        matches!(self, Rejection::MissingId)
    }
}

pub fn playback_url(id: &str) -> String {
    format!("{PLAYBACK_URL_BASE}/{id}")
}

/// Validates a raw record and derives the on-disk base name.
///
/// Titles must be non-empty. Descriptions only have to be present: an empty
/// one still ends up non-empty once the playback URL is appended.
pub fn normalize(raw: RawVideo) -> Result<VideoItem, Rejection> {
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(Rejection::MissingId);
    }

    let title = raw
        .title
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| Rejection::MissingTitle(id.clone()))?;
    let description = raw
        .description
        .ok_or_else(|| Rejection::MissingDescription(id.clone()))?;
    let published_raw = raw
        .published_at
        .ok_or_else(|| Rejection::MissingPublishDate(id.clone()))?;
    let published_at = DateTime::parse_from_rfc3339(published_raw.trim())
        .map_err(|err| Rejection::InvalidPublishDate {
            id: id.clone(),
            reason: err.to_string(),
        })?
        .with_timezone(&Utc);

    let playback_url = playback_url(&id);
    let file_base_name = format!("{}-{}", sanitize_base_name(&title), id);

    Ok(VideoItem {
        description: format!("{description} {playback_url}"),
        title,
        published_at,
        thumbnail_url: raw.thumbnail_url.filter(|url| !url.is_empty()),
        file_base_name,
        playback_url,
        id,
    })
}

/// Turns a title into something safe to use as a single path segment.
///
/// Whitespace and the joining characters `& _ = + :` become `-`, anything
/// other than ASCII alphanumerics, `-` and `.` is dropped, dash runs collapse
/// and leading/trailing dashes are trimmed.
pub fn sanitize_base_name(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    for c in title.chars() {
        let mapped = match c {
            '&' | '_' | '=' | '+' | ':' => '-',
            c if c.is_whitespace() => '-',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => c,
            _ => continue,
        };
        if mapped == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(mapped);
    }
    sanitized.trim_matches('-').to_string()
}
