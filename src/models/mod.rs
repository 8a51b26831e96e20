// src/models/mod.rs

//! Domain models for the ingestion engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod document;
mod raw;
mod summary;

// Re-export all public types
pub use config::{
    AlbumSelectors, Config, IngestConfig, NamedPlaylist, RedditSourceConfig, RssSourceConfig,
    ScrapeSourceConfig, SourceConfig, SourceKind, StorageConfig, WeatherSourceConfig,
    YoutubeChannelConfig, YoutubePlaylistConfig,
};
pub use document::{CanonicalDocument, DocType, Scalar, document_id};
pub use raw::{AlbumRow, DailyWeather, FeedEntry, RawItem, RedditPost, VideoItem, YOUTUBE_WATCH_URL};
pub use summary::{FailureKind, RunPhase, SourceFailure, Summary};
