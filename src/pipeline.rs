#![forbid(unsafe_code)]

//! One feed-build run: normalize the catalog records, filter them, make sure
//! every audio file exists, probe the files, write the feed and optionally
//! clean the output folder.

use crate::catalog::{CatalogError, SourceInfo};
use crate::cleaner::{DirectoryCleaner, related_files};
use crate::config::FeedTarget;
use crate::downloader::{DownloadOutcome, Downloader};
use crate::feed::{FeedBuilder, ResolvedItem, generator};
use crate::item::{RawVideo, VideoItem, normalize};
use crate::probe::Prober;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Per-run choices that do not belong to a single component.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub feed: Option<FeedTarget>,
    /// Keep only items whose title contains this substring.
    pub title_filter: Option<String>,
    /// Replaces the source title in the feed.
    pub title_override: Option<String>,
    pub cleanup_unrelated_files: bool,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Items that made it into the run, in catalog order.
    pub items: Vec<VideoItem>,
    pub outcomes: Vec<DownloadOutcome>,
    /// Records dropped by validation.
    pub rejected: usize,
    /// Records skipped by the title filter.
    pub filtered: usize,
    pub feed_file: Option<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl RunReport {
    pub fn downloaded(&self) -> usize {
        self.count(|outcome| matches!(outcome, DownloadOutcome::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, DownloadOutcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&DownloadOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| predicate(outcome)).count()
    }
}

pub struct Pipeline<'a> {
    downloader: Downloader<'a>,
    prober: Prober<'a>,
    options: RunOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(downloader: Downloader<'a>, prober: Prober<'a>, options: RunOptions) -> Self {
        Self {
            downloader,
            prober,
            options,
        }
    }

    /// Runs the whole build for one source. `records` is drained completely
    /// before anything is downloaded; a failing page aborts the run without
    /// touching the output folder.
    pub fn run<I>(
        &self,
        mut source: SourceInfo,
        records: I,
        build_date: DateTime<Utc>,
        diag: &mut dyn Write,
    ) -> Result<RunReport>
    where
        I: IntoIterator<Item = Result<RawVideo, CatalogError>>,
    {
        let raw: Vec<RawVideo> = records
            .into_iter()
            .collect::<Result<_, _>>()
            .context("listing catalog videos")?;
        info!(records = raw.len(), "catalog listing complete");

        let mut report = RunReport::default();
        for record in raw {
            match normalize(record) {
                Ok(item) => {
                    if let Some(filter) = &self.options.title_filter
                        && !item.title_matches(filter)
                    {
                        debug!(video_id = %item.id, title = %item.title, "filtered out by title");
                        report.filtered += 1;
                        continue;
                    }
                    report.items.push(item);
                }
                Err(rejection) if rejection.is_silent() => {
                    debug!("dropping record without id");
                    report.rejected += 1;
                }
                Err(rejection) => {
                    warn!("skipping video: {rejection}");
                    report.rejected += 1;
                }
            }
        }

        let output_folder = self.downloader.output_folder().to_path_buf();
        fs::create_dir_all(&output_folder).with_context(|| {
            format!("creating output folder {}", output_folder.display())
        })?;

        report.outcomes = self.downloader.ensure(&report.items)?;

        if let Some(target) = &self.options.feed {
            if let Some(title) = &self.options.title_override {
                source.title = title.clone();
            }
            let resolved: Vec<ResolvedItem<'_>> = report
                .items
                .iter()
                .map(|item| ResolvedItem {
                    item,
                    probe: self.prober.probe(&self.downloader.expected_path(item)),
                })
                .collect();

            let document = FeedBuilder::new(source, &target.base_url, generator()).build(&resolved)?;
            document.write(&target.xml_file, build_date)?;
            info!(
                path = %target.xml_file.display(),
                entries = document.entries.len(),
                "feed written"
            );
            report.feed_file = Some(target.xml_file.clone());
        }

        if self.options.cleanup_unrelated_files {
            let related = related_files(
                &report.items,
                self.options.feed.as_ref().map(|target| target.xml_file.as_path()),
                &output_folder,
            );
            report.removed = DirectoryCleaner::new(&output_folder).clean(&related, diag)?;
        }

        Ok(report)
    }
}
