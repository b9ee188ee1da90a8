#![forbid(unsafe_code)]

//! Settings resolution for feedtube.
//!
//! Every value can come from three places, checked in order: an explicit CLI
//! override, the process environment, then a `.env` file. Blank values are
//! treated as unset so an empty `export FEEDTUBE_BASE_URL=` does not mask a
//! value from the next layer.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_DOWNLOADER: &str = "yt-dlp";
pub const DEFAULT_PROBE: &str = "ffprobe";
pub const DEFAULT_AUDIO_QUALITY: &str = "0";

const API_KEY_VAR: &str = "YOUTUBE_APIKEY";
const OUTPUT_FOLDER_VAR: &str = "FEEDTUBE_OUTPUT_FOLDER";
const XML_FILE_VAR: &str = "FEEDTUBE_XML_FILE";
const BASE_URL_VAR: &str = "FEEDTUBE_BASE_URL";
const AUDIO_QUALITY_VAR: &str = "FEEDTUBE_AUDIO_QUALITY";
const DOWNLOADER_VAR: &str = "FEEDTUBE_DOWNLOADER";
const PROBE_VAR: &str = "FEEDTUBE_PROBE";
const API_URL_VAR: &str = "FEEDTUBE_API_URL";

/// Everything a run may be configured with, before validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub output_folder: Option<PathBuf>,
    pub xml_file: Option<PathBuf>,
    pub base_url: Option<String>,
    pub audio_quality: String,
    pub downloader: PathBuf,
    pub probe: PathBuf,
    pub api_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub api_key: Option<String>,
    pub output_folder: Option<PathBuf>,
    pub xml_file: Option<PathBuf>,
    pub base_url: Option<String>,
    pub audio_quality: Option<String>,
    pub env_path: Option<PathBuf>,
}

/// Configuration problems are reported before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("you must specify an output folder (--output-folder or FEEDTUBE_OUTPUT_FOLDER)")]
    MissingOutputFolder,
    #[error("you must specify an api key (--api-key or YOUTUBE_APIKEY)")]
    MissingApiKey,
    #[error("you must specify a base URL (--base-url or FEEDTUBE_BASE_URL) to write a feed file")]
    MissingBaseUrl,
}

/// Where and how the feed file is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTarget {
    pub xml_file: PathBuf,
    pub base_url: String,
}

/// Validated settings; the required values are no longer optional.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub api_key: String,
    pub output_folder: PathBuf,
    pub feed: Option<FeedTarget>,
    pub audio_quality: String,
    pub downloader: PathBuf,
    pub probe: PathBuf,
    pub api_url: String,
}

impl Settings {
    /// Checks the required values in the order users usually fix them:
    /// output folder, api key, then the base URL when a feed file is wanted.
    pub fn validate(self) -> Result<RunConfig, ConfigError> {
        let output_folder = self.output_folder.ok_or(ConfigError::MissingOutputFolder)?;
        let api_key = self.api_key.ok_or(ConfigError::MissingApiKey)?;
        let feed = match self.xml_file {
            Some(xml_file) => {
                let base_url = self.base_url.ok_or(ConfigError::MissingBaseUrl)?;
                Some(FeedTarget { xml_file, base_url })
            }
            None => None,
        };

        Ok(RunConfig {
            api_key,
            output_folder,
            feed,
            audio_quality: self.audio_quality,
            downloader: self.downloader,
            probe: self.probe,
            api_url: self.api_url,
        })
    }
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let api_key = non_blank(overrides.api_key).or_else(|| lookup(API_KEY_VAR));
    let output_folder = overrides
        .output_folder
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup(OUTPUT_FOLDER_VAR).map(PathBuf::from));
    let xml_file = overrides
        .xml_file
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup(XML_FILE_VAR).map(PathBuf::from));
    let base_url = non_blank(overrides.base_url).or_else(|| lookup(BASE_URL_VAR));
    let audio_quality = non_blank(overrides.audio_quality)
        .or_else(|| lookup(AUDIO_QUALITY_VAR))
        .unwrap_or_else(|| DEFAULT_AUDIO_QUALITY.to_string());
    let downloader = lookup(DOWNLOADER_VAR).unwrap_or_else(|| DEFAULT_DOWNLOADER.to_string());
    let probe = lookup(PROBE_VAR).unwrap_or_else(|| DEFAULT_PROBE.to_string());
    let api_url = lookup(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string());

    Settings {
        api_key,
        output_folder,
        xml_file,
        base_url,
        audio_quality,
        downloader: PathBuf::from(downloader),
        probe: PathBuf::from(probe),
        api_url,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Parses a dotenv-style file. A missing file is not an error.
///
/// Kept in the same dialect as the other media tools deployed next to
/// feedtube (`export` prefixes, single or double quotes, `#` comments) so one
/// `.env` can serve all of them.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None)
    }

    #[test]
    fn build_settings_applies_defaults() {
        let settings = settings_from("YOUTUBE_APIKEY=\"key\"\n");
        assert_eq!(settings.api_key.as_deref(), Some("key"));
        assert_eq!(settings.audio_quality, DEFAULT_AUDIO_QUALITY);
        assert_eq!(settings.downloader, PathBuf::from(DEFAULT_DOWNLOADER));
        assert_eq!(settings.probe, PathBuf::from(DEFAULT_PROBE));
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert!(settings.output_folder.is_none());
        assert!(settings.xml_file.is_none());
        assert!(settings.base_url.is_none());
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export YOUTUBE_APIKEY="abc"
            FEEDTUBE_OUTPUT_FOLDER='/srv/podcasts'
            FEEDTUBE_BASE_URL =  "http://foo.com"
            FEEDTUBE_AUDIO_QUALITY=5
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("YOUTUBE_APIKEY").unwrap(), "abc");
        assert_eq!(vars.get("FEEDTUBE_OUTPUT_FOLDER").unwrap(), "/srv/podcasts");
        assert_eq!(vars.get("FEEDTUBE_BASE_URL").unwrap(), "http://foo.com");
        assert_eq!(vars.get("FEEDTUBE_AUDIO_QUALITY").unwrap(), "5");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn build_settings_prefers_env_over_file() {
        let vars = read_env_file(
            make_config("YOUTUBE_APIKEY=\"file\"\nFEEDTUBE_PROBE=\"/opt/ffprobe\"\n").path(),
        )
        .unwrap();
        let settings = build_settings(&vars, |key| {
            if key == "YOUTUBE_APIKEY" {
                Some("env".to_string())
            } else {
                None
            }
        });
        assert_eq!(settings.api_key.as_deref(), Some("env"));
        assert_eq!(settings.probe, PathBuf::from("/opt/ffprobe"));
    }

    #[test]
    fn build_settings_override_precedence() {
        let mut vars = HashMap::new();
        vars.insert("YOUTUBE_APIKEY".to_string(), "file-key".to_string());
        vars.insert("FEEDTUBE_OUTPUT_FOLDER".to_string(), "/file".to_string());
        vars.insert("FEEDTUBE_BASE_URL".to_string(), "http://file".to_string());

        let overrides = SettingsOverrides {
            api_key: Some("cli-key".into()),
            output_folder: None,
            xml_file: Some(PathBuf::from("/cli/feed.xml")),
            base_url: None,
            audio_quality: Some("3".into()),
            env_path: None,
        };

        let settings = build_settings_with_overrides(
            &vars,
            |key| {
                if key == "FEEDTUBE_OUTPUT_FOLDER" {
                    Some("/env".to_string())
                } else {
                    None
                }
            },
            overrides,
        );

        assert_eq!(settings.api_key.as_deref(), Some("cli-key"));
        assert_eq!(settings.output_folder, Some(PathBuf::from("/env")));
        assert_eq!(settings.xml_file, Some(PathBuf::from("/cli/feed.xml")));
        assert_eq!(settings.base_url.as_deref(), Some("http://file"));
        assert_eq!(settings.audio_quality, "3");
    }

    #[test]
    fn build_settings_ignores_blank_values() {
        let settings = build_settings_with_overrides(
            &HashMap::from([("FEEDTUBE_BASE_URL".to_string(), "   ".to_string())]),
            |_| None,
            SettingsOverrides {
                api_key: Some("  ".into()),
                ..SettingsOverrides::default()
            },
        );
        assert!(settings.api_key.is_none());
        assert!(settings.base_url.is_none());
    }

    fn complete_settings() -> Settings {
        settings_from(
            "YOUTUBE_APIKEY=\"key\"\nFEEDTUBE_OUTPUT_FOLDER=\"/out\"\nFEEDTUBE_XML_FILE=\"/out/feed.xml\"\nFEEDTUBE_BASE_URL=\"http://foo.com\"\n",
        )
    }

    #[test]
    fn validate_requires_output_folder_first() {
        let mut settings = complete_settings();
        settings.output_folder = None;
        settings.api_key = None;
        assert_eq!(
            settings.validate().unwrap_err(),
            ConfigError::MissingOutputFolder
        );
    }

    #[test]
    fn validate_requires_api_key() {
        let mut settings = complete_settings();
        settings.api_key = None;
        assert_eq!(settings.validate().unwrap_err(), ConfigError::MissingApiKey);
    }

    #[test]
    fn validate_requires_base_url_only_with_feed_file() {
        let mut settings = complete_settings();
        settings.base_url = None;
        assert_eq!(
            settings.clone().validate().unwrap_err(),
            ConfigError::MissingBaseUrl
        );

        settings.xml_file = None;
        let config = settings.validate().unwrap();
        assert!(config.feed.is_none());
    }

    #[test]
    fn validate_builds_feed_target() {
        let config = complete_settings().validate().unwrap();
        assert_eq!(config.api_key, "key");
        assert_eq!(config.output_folder, PathBuf::from("/out"));
        assert_eq!(
            config.feed,
            Some(FeedTarget {
                xml_file: PathBuf::from("/out/feed.xml"),
                base_url: "http://foo.com".into(),
            })
        );
    }
}
