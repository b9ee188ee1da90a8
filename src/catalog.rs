#![forbid(unsafe_code)]

//! Client for the YouTube Data API v3.
//!
//! A run resolves one source (channel or playlist) into a [`SourceInfo`] and
//! a lazily paginated [`Listing`] of raw video records. Pages are fetched one
//! at a time, in order, following `nextPageToken` until the API stops
//! returning one. Any failing page ends the listing with a single error; the
//! caller never sees a partial catalog silently.
//!
//! HTTP goes through the [`Transport`] trait so tests can serve canned
//! responses without a network.

use crate::item::RawVideo;
use chrono::{NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const PAGE_SIZE: &str = "50";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// `--after` dates are written as `MM-DD-YY`.
pub const AFTER_DATE_FORMAT: &str = "%m-%d-%y";

/// Channel or playlist level metadata. Only the title may change after
/// resolution, through the explicit title override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub title: String,
    pub description: String,
    pub link: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("got HTTP response code {code} with body: {body}")]
    Status { code: u16, body: String },
    #[error("{0}")]
    Connection(String),
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not parse after date: {input:?} is not MM-DD-YY ({reason})")]
    InvalidAfterDate {
        input: String,
        reason: chrono::ParseError,
    },
    #[error("{kind} request failed: {cause}")]
    Request {
        kind: &'static str,
        cause: TransportError,
    },
    #[error("channel ID {0} not found")]
    ChannelIdNotFound(String),
    #[error("channel {0} not found")]
    ChannelNotFound(String),
    #[error("playlist {0} not found")]
    PlaylistNotFound(String),
    /// Both the id lookup and the name lookup failed.
    #[error("{by_id}: {by_name}")]
    Unresolved {
        by_id: Box<CatalogError>,
        by_name: Box<CatalogError>,
    },
    #[error("{listing} request failed: {cause}")]
    Listing {
        listing: &'static str,
        cause: TransportError,
    },
}

/// Minimal HTTP GET capability used by [`Catalog`].
pub trait Transport {
    /// Fetches `<base>/<endpoint>?<query>` and returns the body of a 2xx
    /// response.
    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<String, TransportError>;
}

/// Blocking transport backed by a shared `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Transport for UreqTransport {
    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<String, TransportError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(key, value);
        }

        match request.call() {
            Ok(response) => response
                .into_string()
                .map_err(|err| TransportError::Connection(err.to_string())),
            Err(ureq::Error::Status(code, response)) => Err(TransportError::Status {
                code,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(TransportError::Connection(err.to_string())),
        }
    }
}

/// Where the API lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: String,
}

pub struct Catalog<T: Transport> {
    transport: T,
    api_key: String,
}

impl Catalog<UreqTransport> {
    pub fn new(config: CatalogConfig) -> Self {
        Self::with_transport(UreqTransport::new(config.base_url), config.api_key)
    }
}

impl<T: Transport> Catalog<T> {
    pub fn with_transport(transport: T, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
        }
    }

    /// Resolves a channel that may be given either by id or by legacy user
    /// name. The id lookup runs first; the name lookup only runs when it
    /// fails, and the error reports both attempts.
    ///
    /// `after` is validated before any request is made.
    pub fn channel(
        &self,
        identifier: &str,
        after: Option<&str>,
    ) -> Result<(SourceInfo, Listing<'_, T>), CatalogError> {
        let published_after = after.map(published_after_filter).transpose()?;

        let channel = match self.channel_by_id(identifier) {
            Ok(channel) => channel,
            Err(by_id) => {
                debug!(identifier, error = %by_id, "channel id lookup failed, trying user name");
                self.channel_by_name(identifier)
                    .map_err(|by_name| CatalogError::Unresolved {
                        by_id: Box::new(by_id),
                        by_name: Box::new(by_name),
                    })?
            }
        };

        let info = SourceInfo {
            link: format!("https://www.youtube.com/channel/{}", channel.id),
            title: channel.snippet.title,
            description: channel.snippet.description,
            thumbnail_url: default_thumbnail(channel.snippet.thumbnails.as_ref()),
        };
        let listing = Listing::new(
            self,
            ListingSource::ChannelSearch {
                channel_id: channel.id,
                published_after,
            },
        );
        Ok((info, listing))
    }

    pub fn playlist(&self, playlist_id: &str) -> Result<(SourceInfo, Listing<'_, T>), CatalogError> {
        let playlist = self
            .fetch_resources(
                "playlists",
                "playlist",
                vec![("part", "snippet".into()), ("id", playlist_id.into())],
            )?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::PlaylistNotFound(playlist_id.to_string()))?;

        let info = SourceInfo {
            title: playlist.snippet.title,
            description: playlist.snippet.description,
            link: format!("https://www.youtube.com/playlist?list={playlist_id}"),
            thumbnail_url: default_thumbnail(playlist.snippet.thumbnails.as_ref()),
        };
        let listing = Listing::new(
            self,
            ListingSource::Playlist {
                playlist_id: playlist_id.to_string(),
            },
        );
        Ok((info, listing))
    }

    fn channel_by_id(&self, channel_id: &str) -> Result<ResourceItem, CatalogError> {
        self.fetch_resources(
            "channels",
            "channel",
            vec![("part", "snippet".into()), ("id", channel_id.into())],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::ChannelIdNotFound(channel_id.to_string()))
    }

    fn channel_by_name(&self, channel_name: &str) -> Result<ResourceItem, CatalogError> {
        self.fetch_resources(
            "channels",
            "channel",
            vec![("part", "snippet".into()), ("forUsername", channel_name.into())],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::ChannelNotFound(channel_name.to_string()))
    }

    fn fetch_resources(
        &self,
        endpoint: &str,
        kind: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<ResourceItem>, CatalogError> {
        let response: ListResponse<ResourceItem> = self
            .get_json(endpoint, query)
            .map_err(|cause| CatalogError::Request { kind, cause })?;
        Ok(response.items)
    }

    fn get_json<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut query: Vec<(&'static str, String)>,
    ) -> Result<R, TransportError> {
        query.push(("key", self.api_key.clone()));
        let body = self.transport.get(endpoint, &query)?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Converts an `MM-DD-YY` date into the RFC 3339 timestamp (UTC midnight) the
/// search endpoint expects for `publishedAfter`.
pub fn published_after_filter(input: &str) -> Result<String, CatalogError> {
    let date = NaiveDate::parse_from_str(input.trim(), AFTER_DATE_FORMAT).map_err(|reason| {
        CatalogError::InvalidAfterDate {
            input: input.to_string(),
            reason,
        }
    })?;
    let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    Ok(midnight.to_rfc3339_opts(SecondsFormat::Secs, true))
}

enum ListingSource {
    ChannelSearch {
        channel_id: String,
        published_after: Option<String>,
    },
    Playlist {
        playlist_id: String,
    },
}

impl ListingSource {
    fn endpoint(&self) -> &'static str {
        match self {
            ListingSource::ChannelSearch { .. } => "search",
            ListingSource::Playlist { .. } => "playlistItems",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ListingSource::ChannelSearch { .. } => "search",
            ListingSource::Playlist { .. } => "playlist items",
        }
    }

    fn query(&self, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("part", "snippet".to_string())];
        match self {
            ListingSource::ChannelSearch {
                channel_id,
                published_after,
            } => {
                query.push(("channelId", channel_id.clone()));
                query.push(("type", "video".to_string()));
                if let Some(after) = published_after {
                    query.push(("publishedAfter", after.clone()));
                }
            }
            ListingSource::Playlist { playlist_id } => {
                query.push(("playlistId", playlist_id.clone()));
            }
        }
        query.push(("maxResults", PAGE_SIZE.to_string()));
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        query
    }

    fn parse_page<T: Transport>(
        &self,
        catalog: &Catalog<T>,
        query: Vec<(&'static str, String)>,
    ) -> Result<(Vec<RawVideo>, Option<String>), TransportError> {
        match self {
            ListingSource::ChannelSearch { .. } => {
                let page: ListResponse<SearchResult> = catalog.get_json(self.endpoint(), query)?;
                let videos = page
                    .items
                    .into_iter()
                    .filter_map(SearchResult::into_raw_video)
                    .collect();
                Ok((videos, page.next_page_token))
            }
            ListingSource::Playlist { .. } => {
                let page: ListResponse<PlaylistItem> = catalog.get_json(self.endpoint(), query)?;
                let videos = page
                    .items
                    .into_iter()
                    .map(PlaylistItem::into_raw_video)
                    .collect();
                Ok((videos, page.next_page_token))
            }
        }
    }
}

/// Lazy, ordered sequence of raw records for one source.
///
/// Yields every record of page 1, then page 2, and so on. After the first
/// error the iterator is exhausted.
pub struct Listing<'a, T: Transport> {
    catalog: &'a Catalog<T>,
    source: ListingSource,
    next_page: Option<String>,
    buffered: VecDeque<RawVideo>,
    finished: bool,
    pages: usize,
}

impl<'a, T: Transport> Listing<'a, T> {
    fn new(catalog: &'a Catalog<T>, source: ListingSource) -> Self {
        Self {
            catalog,
            source,
            next_page: None,
            buffered: VecDeque::new(),
            finished: false,
            pages: 0,
        }
    }

    /// Drains every page. Any page failure fails the whole listing.
    pub fn collect_all(self) -> Result<Vec<RawVideo>, CatalogError> {
        self.collect()
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self) -> Result<(), CatalogError> {
        let query = self.source.query(self.next_page.take().as_deref());
        let (videos, next_page) =
            self.source
                .parse_page(self.catalog, query)
                .map_err(|cause| CatalogError::Listing {
                    listing: self.source.label(),
                    cause,
                })?;

        self.pages += 1;
        debug!(
            page = self.pages,
            records = videos.len(),
            listing = self.source.label(),
            "fetched catalog page"
        );
        self.buffered.extend(videos);
        self.next_page = next_page.filter(|token| !token.is_empty());
        self.finished = self.next_page.is_none();
        Ok(())
    }
}

impl<T: Transport> Iterator for Listing<'_, T> {
    type Item = Result<RawVideo, CatalogError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(video) = self.buffered.pop_front() {
                return Some(Ok(video));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.finished = true;
                return Some(Err(err));
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// A channel or playlist resource.
#[derive(Debug, Deserialize)]
struct ResourceItem {
    id: String,
    #[serde(default)]
    snippet: ResourceSnippet,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

fn default_thumbnail(thumbnails: Option<&Thumbnails>) -> Option<String> {
    thumbnails
        .and_then(|thumbs| thumbs.default.as_ref())
        .and_then(|thumb| thumb.url.clone())
        .filter(|url| !url.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    thumbnails: Option<Thumbnails>,
    live_broadcast_content: Option<String>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchId,
    #[serde(default)]
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    kind: Option<String>,
    video_id: Option<String>,
}

impl SearchResult {
    /// Drops non-video hits and upcoming/live broadcasts.
    fn into_raw_video(self) -> Option<RawVideo> {
        if let Some(kind) = self.id.kind.as_deref()
            && kind != "youtube#video"
        {
            debug!(kind, "skipping non-video search result");
            return None;
        }
        if let Some(live) = self.snippet.live_broadcast_content.as_deref()
            && live != "none"
        {
            debug!(
                video_id = self.id.video_id.as_deref().unwrap_or_default(),
                live, "skipping live broadcast"
            );
            return None;
        }

        Some(RawVideo {
            id: self.id.video_id.unwrap_or_default(),
            thumbnail_url: default_thumbnail(self.snippet.thumbnails.as_ref()),
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    snippet: VideoSnippet,
}

impl PlaylistItem {
    fn into_raw_video(self) -> RawVideo {
        let id = self
            .snippet
            .resource_id
            .as_ref()
            .and_then(|resource| resource.video_id.clone())
            .unwrap_or_default();
        RawVideo {
            id,
            thumbnail_url: default_thumbnail(self.snippet.thumbnails.as_ref()),
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{Transport, TransportError};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned bodies keyed by `endpoint?k=v&...` with the query pairs
    /// sorted, and records every request in the same form.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        responses: HashMap<String, Result<String, u16>>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(mut self, request: &str, body: serde_json::Value) -> Self {
            self.responses
                .insert(request.to_string(), Ok(body.to_string()));
            self
        }

        pub(crate) fn respond_raw(mut self, request: &str, body: &str) -> Self {
            self.responses
                .insert(request.to_string(), Ok(body.to_string()));
            self
        }

        pub(crate) fn fail(mut self, request: &str, status: u16) -> Self {
            self.responses.insert(request.to_string(), Err(status));
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.borrow().clone()
        }
    }

    pub(crate) fn request_key(endpoint: &str, query: &[(&str, String)]) -> String {
        let mut pairs: Vec<String> = query
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        pairs.sort();
        format!("{endpoint}?{}", pairs.join("&"))
    }

    impl Transport for FakeTransport {
        fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<String, TransportError> {
            let key = request_key(endpoint, query);
            self.requests.borrow_mut().push(key.clone());
            match self.responses.get(&key) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(code)) => Err(TransportError::Status {
                    code: *code,
                    body: String::new(),
                }),
                None => Err(TransportError::Status {
                    code: 404,
                    body: format!("no canned response for {key}"),
                }),
            }
        }
    }
}
