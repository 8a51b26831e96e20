//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::DocType;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and run behavior settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Document store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Configured sources, each triggered independently
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.user_agent.trim().is_empty() {
            return Err(AppError::validation("ingest.user_agent is empty"));
        }
        if self.ingest.timeout_secs == 0 {
            return Err(AppError::validation("ingest.timeout_secs must be > 0"));
        }
        if self.ingest.source_timeout_secs == 0 {
            return Err(AppError::validation(
                "ingest.source_timeout_secs must be > 0",
            ));
        }
        if self.ingest.max_concurrent == 0 {
            return Err(AppError::validation("ingest.max_concurrent must be > 0"));
        }
        if self.ingest.batch_size == 0 {
            return Err(AppError::validation("ingest.batch_size must be > 0"));
        }
        if self.ingest.item_cap == 0 {
            return Err(AppError::validation("ingest.item_cap must be > 0"));
        }
        if self.ingest.window_days == 0 {
            return Err(AppError::validation("ingest.window_days must be > 0"));
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(AppError::validation("source id is empty"));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
            source
                .kind
                .validate()
                .map_err(|e| AppError::validation(format!("source '{}': {e}", source.id)))?;
        }
        Ok(())
    }

    /// Enabled sources in declaration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            storage: StorageConfig::default(),
            sources: Vec::new(),
        }
    }
}

/// HTTP client and run behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Wall-clock budget for one source invocation
    #[serde(default = "defaults::source_timeout")]
    pub source_timeout_secs: u64,

    /// Sources processed at the same time
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Documents handed to the store per write
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Upper bound of items enumerated from one paginated listing
    #[serde(default = "defaults::item_cap")]
    pub item_cap: usize,

    /// Calendar days admitted by the recency window (today counts as one)
    #[serde(default = "defaults::window_days")]
    pub window_days: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            source_timeout_secs: defaults::source_timeout(),
            max_concurrent: defaults::max_concurrent(),
            batch_size: defaults::batch_size(),
            item_cap: defaults::item_cap(),
            window_days: defaults::window_days(),
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON collection per document type
    #[serde(default = "defaults::storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: defaults::storage_root(),
        }
    }
}

/// One configured source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique id used by the trigger entry point
    pub id: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Source-kind specific settings, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Reddit(RedditSourceConfig),
    YoutubeChannel(YoutubeChannelConfig),
    YoutubePlaylist(YoutubePlaylistConfig),
    Rss(RssSourceConfig),
    Scrape(ScrapeSourceConfig),
    Weather(WeatherSourceConfig),
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Reddit(_) => "reddit",
            SourceKind::YoutubeChannel(_) => "youtube_channel",
            SourceKind::YoutubePlaylist(_) => "youtube_playlist",
            SourceKind::Rss(_) => "rss",
            SourceKind::Scrape(_) => "scrape",
            SourceKind::Weather(_) => "weather",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            SourceKind::Reddit(c) => {
                if c.subreddits.iter().all(|s| s.trim().is_empty()) {
                    return Err(AppError::validation("no subreddits configured"));
                }
                if c.post_limit == 0 {
                    return Err(AppError::validation("post_limit must be > 0"));
                }
            }
            SourceKind::YoutubeChannel(c) => {
                if c.channel_ids.is_empty() {
                    return Err(AppError::validation("no channel_ids configured"));
                }
            }
            SourceKind::YoutubePlaylist(c) => {
                if c.playlist_ids.is_empty() && c.named.is_none() {
                    return Err(AppError::validation(
                        "either playlist_ids or named must be configured",
                    ));
                }
                if let Some(named) = &c.named {
                    if named.base_name.trim().is_empty() || named.channel_ids.is_empty() {
                        return Err(AppError::validation(
                            "named playlist needs base_name and channel_ids",
                        ));
                    }
                }
            }
            SourceKind::Rss(c) => {
                if c.feeds.is_empty() {
                    return Err(AppError::validation("no feeds configured"));
                }
            }
            SourceKind::Scrape(c) => {
                url::Url::parse(&c.url)
                    .map_err(|e| AppError::validation(format!("invalid url: {e}")))?;
                if c.limit == 0 {
                    return Err(AppError::validation("limit must be > 0"));
                }
            }
            SourceKind::Weather(c) => {
                if !(-90.0..=90.0).contains(&c.lat) || !(-180.0..=180.0).contains(&c.lon) {
                    return Err(AppError::validation("lat/lon out of range"));
                }
            }
        }
        Ok(())
    }
}

/// Hot posts of one or more subreddits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSourceConfig {
    pub subreddits: Vec<String>,

    /// Posts taken per subreddit
    #[serde(default = "defaults::post_limit")]
    pub post_limit: usize,

    /// Public listing host, used without credentials
    #[serde(default = "defaults::reddit_base")]
    pub base_url: String,

    /// Listing host for OAuth requests
    #[serde(default = "defaults::reddit_oauth_base")]
    pub oauth_base_url: String,

    /// Token endpoint for the client-credentials grant
    #[serde(default = "defaults::reddit_token_url")]
    pub token_url: String,
}

/// Uploads of whole channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeChannelConfig {
    pub channel_ids: Vec<String>,

    #[serde(default = "defaults::music_video")]
    pub doc_type: DocType,

    /// Title keywords; empty admits every title
    #[serde(default = "defaults::video_keywords")]
    pub keywords: Vec<String>,

    /// Only keep videos published inside the recency window
    #[serde(default = "defaults::enabled")]
    pub recent_only: bool,

    /// Overrides `ingest.item_cap`
    #[serde(default)]
    pub item_cap: Option<usize>,

    #[serde(default = "defaults::youtube_api")]
    pub api_base: String,
}

/// Explicit playlists and/or a monthly playlist looked up by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubePlaylistConfig {
    #[serde(default)]
    pub playlist_ids: Vec<String>,

    #[serde(default)]
    pub named: Option<NamedPlaylist>,

    #[serde(default = "defaults::trailer")]
    pub doc_type: DocType,

    /// Title keywords; empty admits every title
    #[serde(default = "defaults::video_keywords")]
    pub keywords: Vec<String>,

    /// Only keep videos published inside the recency window
    #[serde(default = "defaults::enabled")]
    pub recent_only: bool,

    /// Overrides `ingest.item_cap`
    #[serde(default)]
    pub item_cap: Option<usize>,

    #[serde(default = "defaults::youtube_api")]
    pub api_base: String,
}

/// Playlist titled `"{base_name} - {Month} {Year}"`, searched per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedPlaylist {
    pub base_name: String,
    pub channel_ids: Vec<String>,
}

/// One or more RSS feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssSourceConfig {
    pub feeds: Vec<String>,

    #[serde(default = "defaults::news")]
    pub doc_type: DocType,

    /// Only keep entries published inside the recency window
    #[serde(default)]
    pub recent_only: bool,
}

/// Album chart scraped from an HTML page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSourceConfig {
    pub url: String,

    /// Maximum albums taken from the page
    #[serde(default = "defaults::album_limit")]
    pub limit: usize,

    #[serde(default)]
    pub selectors: AlbumSelectors,
}

/// CSS selectors for the album chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumSelectors {
    #[serde(default = "defaults::album_row")]
    pub row: String,
    #[serde(default = "defaults::album_title")]
    pub title: String,
    #[serde(default = "defaults::album_artist")]
    pub artist: String,
    #[serde(default = "defaults::album_date")]
    pub release_date: String,
    #[serde(default = "defaults::album_summary")]
    pub summary: String,
    #[serde(default = "defaults::album_image")]
    pub image: String,
}

impl Default for AlbumSelectors {
    fn default() -> Self {
        Self {
            row: defaults::album_row(),
            title: defaults::album_title(),
            artist: defaults::album_artist(),
            release_date: defaults::album_date(),
            summary: defaults::album_summary(),
            image: defaults::album_image(),
        }
    }
}

/// Current conditions plus forecast for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSourceConfig {
    pub lat: f64,
    pub lon: f64,

    /// `standard`, `metric` or `imperial`
    #[serde(default = "defaults::units")]
    pub units: String,

    #[serde(default = "defaults::weather_api")]
    pub api_base: String,
}

mod defaults {
    use std::path::PathBuf;

    use crate::models::DocType;

    // Ingest defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; ingestor/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn source_timeout() -> u64 {
        120
    }
    pub fn max_concurrent() -> usize {
        2
    }
    pub fn batch_size() -> usize {
        25
    }
    pub fn item_cap() -> usize {
        100
    }
    pub fn window_days() -> u32 {
        2
    }
    pub fn enabled() -> bool {
        true
    }

    // Storage defaults
    pub fn storage_root() -> PathBuf {
        PathBuf::from("storage")
    }

    // Source defaults
    pub fn post_limit() -> usize {
        5
    }
    pub fn reddit_base() -> String {
        "https://www.reddit.com".into()
    }
    pub fn reddit_oauth_base() -> String {
        "https://oauth.reddit.com".into()
    }
    pub fn reddit_token_url() -> String {
        "https://www.reddit.com/api/v1/access_token".into()
    }
    pub fn youtube_api() -> String {
        "https://www.googleapis.com/youtube/v3".into()
    }
    pub fn weather_api() -> String {
        "https://api.openweathermap.org/data/2.5".into()
    }
    pub fn units() -> String {
        "imperial".into()
    }
    pub fn video_keywords() -> Vec<String> {
        crate::pipeline::classify::default_keywords()
    }
    pub fn music_video() -> DocType {
        DocType::MusicVideo
    }
    pub fn trailer() -> DocType {
        DocType::Trailer
    }
    pub fn news() -> DocType {
        DocType::News
    }

    // Album chart defaults
    pub fn album_limit() -> usize {
        40
    }
    pub fn album_row() -> String {
        "table.clamp-list tr".into()
    }
    pub fn album_title() -> String {
        "a.title".into()
    }
    pub fn album_artist() -> String {
        "div.artist".into()
    }
    pub fn album_date() -> String {
        "span".into()
    }
    pub fn album_summary() -> String {
        "div.summary".into()
    }
    pub fn album_image() -> String {
        "td.clamp-image-wrap img".into()
    }
}
