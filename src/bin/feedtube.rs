#![forbid(unsafe_code)]

//! Command-line entry point: turns a YouTube channel or playlist into a
//! locally hosted podcast feed.
//!
//! Settings are resolved and validated before the first request so a missing
//! api key or output folder never costs API quota.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use feedtube::catalog::{Catalog, CatalogConfig};
use feedtube::config::{RunConfig, SettingsOverrides, resolve_settings};
use feedtube::downloader::Downloader;
use feedtube::pipeline::{Pipeline, RunOptions};
use feedtube::probe::Prober;
use feedtube::runner::SystemRunner;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(
    name = "feedtube",
    version,
    about = "Build a podcast feed from a YouTube channel or playlist"
)]
struct Cli {
    #[command(subcommand)]
    source: SourceCommand,
}

#[derive(Subcommand, Debug)]
enum SourceCommand {
    /// Build a feed from a channel, given by channel id or user name
    #[command(visible_alias = "c")]
    Channel {
        /// Channel id or legacy user name
        identifier: String,

        /// Only include videos published after this date
        #[arg(short = 'a', long, value_name = "MM-DD-YY")]
        after: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Build a feed from a playlist
    #[command(visible_alias = "p")]
    Playlist {
        playlist_id: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct CommonArgs {
    /// YouTube Data API key (YOUTUBE_APIKEY)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Folder the audio files are written to (FEEDTUBE_OUTPUT_FOLDER)
    #[arg(short = 'o', long)]
    output_folder: Option<PathBuf>,

    /// Feed file to write (FEEDTUBE_XML_FILE)
    #[arg(short = 'x', long)]
    xml_file: Option<PathBuf>,

    /// Public URL the output folder is served from (FEEDTUBE_BASE_URL)
    #[arg(short = 'b', long)]
    base_url: Option<String>,

    /// Only keep videos whose title contains this text
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Title to use for the feed instead of the channel or playlist title
    #[arg(short = 't', long)]
    override_title: Option<String>,

    /// Audio quality passed to the downloader (FEEDTUBE_AUDIO_QUALITY)
    #[arg(long)]
    audio_quality: Option<String>,

    /// Delete files in the output folder that are not part of the feed
    #[arg(long)]
    cleanup_unrelated_files: bool,

    /// Alternate .env file
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

impl CommonArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            api_key: self.api_key.clone(),
            output_folder: self.output_folder.clone(),
            xml_file: self.xml_file.clone(),
            base_url: self.base_url.clone(),
            audio_quality: self.audio_quality.clone(),
            env_path: self.env_file.clone(),
        }
    }

    fn run_options(&self, config: &RunConfig) -> RunOptions {
        RunOptions {
            feed: config.feed.clone(),
            title_filter: self.filter.clone().filter(|filter| !filter.is_empty()),
            title_override: self
                .override_title
                .clone()
                .filter(|title| !title.trim().is_empty()),
            cleanup_unrelated_files: self.cleanup_unrelated_files,
        }
    }
}

impl SourceCommand {
    fn common(&self) -> &CommonArgs {
        match self {
            SourceCommand::Channel { common, .. } | SourceCommand::Playlist { common, .. } => {
                common
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceCommand::Channel { identifier, .. } => format!("Channel: {identifier}"),
            SourceCommand::Playlist { playlist_id, .. } => format!("Playlist: {playlist_id}"),
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedtube=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let common = cli.source.common();
    let config = resolve_settings(common.overrides())
        .context("loading settings")?
        .validate()?;

    println!("===================================");
    println!("feedtube");
    println!("===================================");
    println!("{}", cli.source.describe());
    println!("Output folder: {}", config.output_folder.display());
    if let Some(feed) = &config.feed {
        println!("Feed file: {}", feed.xml_file.display());
    }
    println!();

    let catalog = Catalog::new(CatalogConfig {
        base_url: config.api_url.clone(),
        api_key: config.api_key.clone(),
    });
    let (source, listing) = match &cli.source {
        SourceCommand::Channel {
            identifier, after, ..
        } => catalog.channel(identifier, after.as_deref())?,
        SourceCommand::Playlist { playlist_id, .. } => catalog.playlist(playlist_id)?,
    };
    println!("Source: {} ({})", source.title, source.link);

    let runner = SystemRunner;
    let pipeline = Pipeline::new(
        Downloader::new(
            &runner,
            config.downloader.clone(),
            config.output_folder.clone(),
            Some(config.audio_quality.clone()),
        ),
        Prober::new(&runner, config.probe.clone()),
        common.run_options(&config),
    );
    let report = pipeline.run(source, listing, Utc::now(), &mut io::stderr())?;

    println!();
    println!(
        "Done: {} downloaded, {} already present, {} skipped as invalid, {} filtered out",
        report.downloaded(),
        report.skipped(),
        report.rejected,
        report.filtered
    );
    if let Some(feed_file) = &report.feed_file {
        println!("Feed written to {}", feed_file.display());
    }
    if !report.removed.is_empty() {
        println!("Removed {} unrelated file(s)", report.removed.len());
    }

    Ok(())
}
