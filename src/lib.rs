#![forbid(unsafe_code)]

//! Build podcast feeds from YouTube channels and playlists.
//!
//! The library holds every stage of a feed build; `src/bin/feedtube.rs` wires
//! them to the command line.

pub mod catalog;
pub mod cleaner;
pub mod config;
pub mod downloader;
pub mod feed;
pub mod item;
pub mod pipeline;
pub mod probe;
pub mod runner;
