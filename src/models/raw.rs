//! Raw items as produced by source adapters, before normalization.

use chrono::{DateTime, NaiveDate, Utc};

use super::DocType;

/// Base URL for the canonical watch page of a video.
pub const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// One item pulled from a source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Post(RedditPost),
    Video(VideoItem),
    Entry(FeedEntry),
    Album(AlbumRow),
    Weather(DailyWeather),
}

impl RawItem {
    pub fn doc_type(&self) -> DocType {
        match self {
            RawItem::Post(_) => DocType::Reddit,
            RawItem::Video(v) => v.doc_type,
            RawItem::Entry(e) => e.doc_type,
            RawItem::Album(_) => DocType::Album,
            RawItem::Weather(_) => DocType::Weather,
        }
    }

    /// Dedup key, or `None` when the item cannot produce one.
    pub fn natural_key(&self) -> Option<String> {
        let key = match self {
            RawItem::Post(p) => p.url.clone(),
            RawItem::Video(v) => v.watch_url(),
            RawItem::Entry(e) => e.link.clone(),
            RawItem::Album(a) => a.url.clone(),
            RawItem::Weather(w) => Some(w.key()),
        }?;
        let key = key.trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    /// Short label for log lines.
    pub fn label(&self) -> &str {
        match self {
            RawItem::Post(p) => &p.title,
            RawItem::Video(v) => &v.title,
            RawItem::Entry(e) => e.title.as_deref().unwrap_or("(untitled)"),
            RawItem::Album(a) => a.title.as_deref().unwrap_or("(untitled)"),
            RawItem::Weather(_) => "forecast",
        }
    }
}

/// A post from a subreddit listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RedditPost {
    pub title: String,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub score: i64,
    pub subreddit: String,
    pub author: Option<String>,
    pub selftext: String,
    pub created_utc: Option<DateTime<Utc>>,
}

/// A video entry from a playlist page.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoItem {
    pub doc_type: DocType,
    pub video_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub channel_id: Option<String>,
    pub playlist_id: String,
}

impl VideoItem {
    pub fn watch_url(&self) -> Option<String> {
        self.video_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| format!("{YOUTUBE_WATCH_URL}{id}"))
    }
}

/// An entry of an RSS feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub doc_type: DocType,
    pub feed_url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A row of a scraped album chart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlbumRow {
    pub title: Option<String>,
    pub url: Option<String>,
    pub artist: Option<String>,
    pub release_date: Option<String>,
    pub summary: Option<String>,
    pub image: Option<String>,
}

/// Forecast collapsed to one calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub lat: f64,
    pub lon: f64,
    pub status: String,
    pub high_temp: f64,
    pub low_temp: f64,
    pub current_temp: Option<f64>,
}

impl DailyWeather {
    /// `(date, lat, lon)` rendered as a single key.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.date.format("%Y-%m-%d"), self.lat, self.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: Option<&str>) -> VideoItem {
        VideoItem {
            doc_type: DocType::Trailer,
            video_id: id.map(str::to_string),
            title: "Official Trailer".into(),
            description: None,
            thumbnail_url: None,
            published_at: None,
            channel_id: None,
            playlist_id: "PL1".into(),
        }
    }

    #[test]
    fn test_video_key_is_watch_url() {
        let item = RawItem::Video(video(Some("abc123")));
        assert_eq!(
            item.natural_key().as_deref(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
        assert_eq!(item.doc_type(), DocType::Trailer);
    }

    #[test]
    fn test_missing_or_blank_key() {
        assert!(RawItem::Video(video(None)).natural_key().is_none());
        assert!(RawItem::Video(video(Some("  "))).natural_key().is_none());
        assert!(RawItem::Album(AlbumRow::default()).natural_key().is_none());
    }

    #[test]
    fn test_weather_key() {
        let day = DailyWeather {
            date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
            lat: 40.71,
            lon: -74.01,
            status: "clear sky".into(),
            high_temp: 70.0,
            low_temp: 55.0,
            current_temp: None,
        };
        assert_eq!(day.key(), "2026-10-17|40.71|-74.01");
    }
}
