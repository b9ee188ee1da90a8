#![forbid(unsafe_code)]

//! RSS 2.0 podcast feed with the iTunes namespace.
//!
//! [`FeedBuilder`] projects the run's source and items into a
//! [`FeedDocument`], which serializes deterministically: the same document
//! and build date always produce the same bytes. [`read_entries`] parses a
//! feed back for inspection.

use crate::catalog::SourceInfo;
use crate::item::VideoItem;
use crate::probe::Probe;
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ITUNES_NAMESPACE: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";
const LANGUAGE: &str = "en-us";
/// RFC 2822 with a zero-padded day, e.g. `Tue, 02 Jan 2007 15:04:05 +0000`.
const RSS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("could not add item {0} to feed: title and description are required")]
    InvalidEntry(String),
    #[error("could not serialize feed: {0}")]
    Serialize(#[source] io::Error),
    #[error("could not write feed file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("could not parse feed: {0}")]
    Parse(String),
}

/// `feedtube v<version>`
pub fn generator() -> String {
    format!("feedtube v{}", env!("CARGO_PKG_VERSION"))
}

/// A downloaded item together with what the prober found out about it.
#[derive(Debug, Clone)]
pub struct ResolvedItem<'a> {
    pub item: &'a VideoItem,
    pub probe: Probe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub length: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub image: Option<String>,
    pub enclosure: Enclosure,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub source: SourceInfo,
    pub generator: String,
    pub entries: Vec<FeedEntry>,
}

pub struct FeedBuilder {
    source: SourceInfo,
    base_url: String,
    generator: String,
}

impl FeedBuilder {
    pub fn new(source: SourceInfo, base_url: &str, generator: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.trim_end_matches('/').to_string(),
            generator: generator.into(),
        }
    }

    /// Builds the document in item order. Any entry without a title or
    /// description fails the whole feed.
    pub fn build(&self, items: &[ResolvedItem<'_>]) -> Result<FeedDocument, FeedError> {
        let entries = items
            .iter()
            .map(|resolved| self.entry(resolved))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FeedDocument {
            source: self.source.clone(),
            generator: self.generator.clone(),
            entries,
        })
    }

    fn entry(&self, resolved: &ResolvedItem<'_>) -> Result<FeedEntry, FeedError> {
        let item = resolved.item;
        if item.title.trim().is_empty() || item.description.trim().is_empty() {
            return Err(FeedError::InvalidEntry(item.id.clone()));
        }

        Ok(FeedEntry {
            guid: item.id.clone(),
            title: item.title.clone(),
            link: item.playback_url.clone(),
            description: item.description.clone(),
            published_at: item.published_at,
            image: item.thumbnail_url.clone(),
            enclosure: Enclosure {
                url: format!("{}/{}", self.base_url, item.audio_file_name()),
                length: resolved.probe.length,
                mime_type: AUDIO_MIME_TYPE.to_string(),
            },
            duration: resolved.probe.duration.clone(),
        })
    }
}

impl FeedDocument {
    pub fn to_xml(&self, build_date: DateTime<Utc>) -> Result<Vec<u8>, FeedError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_rss(&mut writer, build_date)
            .map_err(FeedError::Serialize)?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn write(&self, path: &Path, build_date: DateTime<Utc>) -> Result<(), FeedError> {
        let bytes = self.to_xml(build_date)?;
        fs::write(path, bytes).map_err(|source| FeedError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_rss(&self, writer: &mut Writer<Vec<u8>>, build_date: DateTime<Utc>) -> io::Result<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("rss")
                .with_attributes([("version", "2.0"), ("xmlns:itunes", ITUNES_NAMESPACE)]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        let source = &self.source;
        text_element(writer, "title", &source.title)?;
        text_element(writer, "link", &source.link)?;
        text_element(writer, "description", &source.description)?;
        text_element(writer, "generator", &self.generator)?;
        text_element(writer, "language", LANGUAGE)?;
        text_element(
            writer,
            "lastBuildDate",
            &build_date.format(RSS_DATE_FORMAT).to_string(),
        )?;
        if let Some(image) = &source.thumbnail_url {
            writer.write_event(Event::Start(BytesStart::new("image")))?;
            text_element(writer, "url", image)?;
            text_element(writer, "title", &source.title)?;
            text_element(writer, "link", &source.link)?;
            writer.write_event(Event::End(BytesEnd::new("image")))?;
            itunes_image(writer, image)?;
        }

        for entry in &self.entries {
            write_entry(writer, entry)?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;
        Ok(())
    }
}

fn write_entry(writer: &mut Writer<Vec<u8>>, entry: &FeedEntry) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("item")))?;

    writer.write_event(Event::Start(
        BytesStart::new("guid").with_attributes([("isPermaLink", "false")]),
    ))?;
    writer.write_event(Event::Text(BytesText::new(&xml_safe(&entry.guid))))?;
    writer.write_event(Event::End(BytesEnd::new("guid")))?;

    text_element(writer, "title", &entry.title)?;
    text_element(writer, "link", &entry.link)?;
    text_element(writer, "description", &entry.description)?;
    text_element(
        writer,
        "pubDate",
        &entry.published_at.format(RSS_DATE_FORMAT).to_string(),
    )?;
    if let Some(image) = &entry.image {
        itunes_image(writer, image)?;
    }

    let length = entry.enclosure.length.to_string();
    let url = xml_safe(&entry.enclosure.url);
    writer.write_event(Event::Empty(BytesStart::new("enclosure").with_attributes([
        ("url", &*url),
        ("length", length.as_str()),
        ("type", entry.enclosure.mime_type.as_str()),
    ])))?;
    if let Some(duration) = &entry.duration {
        text_element(writer, "itunes:duration", duration)?;
    }

    writer.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(&xml_safe(value))))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn itunes_image(writer: &mut Writer<Vec<u8>>, href: &str) -> io::Result<()> {
    let href = xml_safe(href);
    writer.write_event(Event::Empty(
        BytesStart::new("itunes:image").with_attributes([("href", &*href)]),
    ))?;
    Ok(())
}

/// Replaces characters XML 1.0 does not allow (most C0 controls, U+FFFE and
/// U+FFFF) with U+FFFD. Escaping markup characters is left to quick-xml.
fn xml_safe(value: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
    }

    if value.chars().all(allowed) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .chars()
            .map(|c| if allowed(c) { c } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    )
}

/// The parts of a feed item that identify it and its audio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    pub guid: String,
    pub title: String,
    pub enclosure_url: String,
    pub enclosure_length: u64,
    pub duration: Option<String>,
}

/// Reads the `<item>` elements of a feed, in document order.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<ParsedEntry>, FeedError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ParsedEntry> = None;
    let mut field: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|err| FeedError::Parse(err.to_string()))?
        {
            Event::Start(element) => {
                let name = element.name().as_ref().to_vec();
                if name == b"item" {
                    current = Some(ParsedEntry::default());
                } else if let Some(entry) = current.as_mut() {
                    if name == b"enclosure" {
                        read_enclosure(&element, entry)?;
                    }
                    field = Some(name);
                }
            }
            Event::Empty(element) => {
                if let Some(entry) = current.as_mut()
                    && element.name().as_ref() == b"enclosure"
                {
                    read_enclosure(&element, entry)?;
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| FeedError::Parse(err.to_string()))?
                    .into_owned();
                assign_field(current.as_mut(), field.as_deref(), value);
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                assign_field(current.as_mut(), field.as_deref(), value);
            }
            Event::End(element) => {
                if element.name().as_ref() == b"item" {
                    entries.extend(current.take());
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn assign_field(entry: Option<&mut ParsedEntry>, field: Option<&[u8]>, value: String) {
    let (Some(entry), Some(field)) = (entry, field) else {
        return;
    };
    match field {
        b"guid" => entry.guid = value,
        b"title" => entry.title = value,
        b"itunes:duration" => entry.duration = Some(value),
        _ => {}
    }
}

fn read_enclosure(element: &BytesStart<'_>, entry: &mut ParsedEntry) -> Result<(), FeedError> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|err| FeedError::Parse(err.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|err| FeedError::Parse(err.to_string()))?;
        match attribute.key.as_ref() {
            b"url" => entry.enclosure_url = value.into_owned(),
            b"length" => {
                entry.enclosure_length = value.trim().parse().map_err(|_| {
                    FeedError::Parse(format!("invalid enclosure length {value:?}"))
                })?;
            }
            _ => {}
        }
    }
    Ok(())
}
