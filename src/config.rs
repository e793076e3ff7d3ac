//! Configuration loader, defaulting and validation for the playlist updater.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Invalid channel identifier {0:?}: must be non-empty without '-' or whitespace")]
    InvalidChannel(String),
}

const RELOAD_INTERVAL_RANGE: RangeInclusive<u64> = 5..=1_000_000;
const CYCLE_INTERVAL_RANGE: RangeInclusive<u64> = 300..=1_000_000;
const WORKERS_RANGE: RangeInclusive<usize> = 1..=100;
const TIMEOUT_RANGE: RangeInclusive<u64> = 1..=600;

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub playlist: Playlist,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Scheduling and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Persisted playlist location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    #[serde(default = "default_playlist_path")]
    pub path: String,
}

/// Listing site settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_reload_interval() -> u64 {
    600
}

fn default_cycle_interval() -> u64 {
    3600
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(*WORKERS_RANGE.start(), *WORKERS_RANGE.end())
}

fn default_playlist_path() -> String {
    "playlist.m3u".into()
}

fn default_base_url() -> String {
    "http://www.cn.ru".into()
}

fn default_user_agent() -> String {
    concat!("archive-playlist/", env!("CARGO_PKG_VERSION")).into()
}

fn default_timeout() -> u64 {
    20
}

impl Default for App {
    fn default() -> Self {
        Self {
            reload_interval_secs: default_reload_interval(),
            cycle_interval_secs: default_cycle_interval(),
            workers: default_workers(),
        }
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            path: default_playlist_path(),
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
        }
    }
}

impl App {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

impl Source {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load configuration from a YAML file, normalize and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    parse(&content)
}

/// Like [`load`], but writes a default configuration to `path` when the file
/// does not exist yet and returns it.
pub fn load_or_init(path: &Path) -> Result<Config, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse(&content),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let cfg = Config::default();
            fs::write(path, serde_yaml::to_string(&cfg)?)?;
            info!(path = %path.display(), "wrote default configuration");
            Ok(cfg)
        }
        Err(err) => Err(err.into()),
    }
}

/// Parse YAML text into a normalized, validated configuration.
pub fn parse(content: &str) -> Result<Config, ConfigError> {
    let mut cfg: Config = serde_yaml::from_str(content)?;
    normalize(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

fn in_range_or_default<T>(name: &str, value: T, range: RangeInclusive<T>, default: T) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if range.contains(&value) {
        value
    } else {
        warn!(
            key = name,
            %value,
            %default,
            "value out of range {}..={}; using default",
            range.start(),
            range.end()
        );
        default
    }
}

/// Replace out-of-range numbers with defaults and drop duplicate channels.
fn normalize(cfg: &mut Config) {
    cfg.app.reload_interval_secs = in_range_or_default(
        "app.reload_interval_secs",
        cfg.app.reload_interval_secs,
        RELOAD_INTERVAL_RANGE,
        default_reload_interval(),
    );
    cfg.app.cycle_interval_secs = in_range_or_default(
        "app.cycle_interval_secs",
        cfg.app.cycle_interval_secs,
        CYCLE_INTERVAL_RANGE,
        default_cycle_interval(),
    );
    cfg.app.workers = in_range_or_default(
        "app.workers",
        cfg.app.workers,
        WORKERS_RANGE,
        default_workers(),
    );
    cfg.source.timeout_secs = in_range_or_default(
        "source.timeout_secs",
        cfg.source.timeout_secs,
        TIMEOUT_RANGE,
        default_timeout(),
    );

    for channel in cfg.channels.iter_mut() {
        *channel = channel.trim().to_string();
    }
    let mut seen = std::collections::HashSet::new();
    cfg.channels.retain(|c| seen.insert(c.clone()));
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.playlist.path.trim().is_empty() {
        return Err(ConfigError::Invalid("playlist.path must be non-empty"));
    }
    if cfg.source.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("source.base_url must be non-empty"));
    }
    if Url::parse(&cfg.source.base_url).is_err() {
        return Err(ConfigError::Invalid("source.base_url must be an absolute URL"));
    }
    for channel in &cfg.channels {
        if channel.is_empty() || channel.contains('-') || channel.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidChannel(channel.clone()));
        }
    }
    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  reload_interval_secs: 600
  cycle_interval_secs: 3600
  workers: 4

playlist:
  path: "playlist.m3u"

source:
  base_url: "http://www.cn.ru"
  user_agent: "archive-playlist/0.1"
  timeout_secs: 20

channels:
  - rossija
  - ntv
"#
}
