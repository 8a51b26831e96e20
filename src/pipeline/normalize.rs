// src/pipeline/normalize.rs

//! Raw item to canonical document, one rule per item variant.
//!
//! Missing optional fields never fail an item; they get the documented
//! defaults. Only a missing natural key does.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{
    AlbumRow, CanonicalDocument, DailyWeather, DocType, FeedEntry, RawItem, RedditPost, VideoItem,
};

pub const DELETED_AUTHOR: &str = "[deleted]";
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

const REDDIT_HOST: &str = "https://www.reddit.com";
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".img"];

/// Normalize one item. `now` stands in for missing publish dates.
pub fn normalize(item: RawItem, now: DateTime<Utc>) -> Result<CanonicalDocument> {
    let key = item
        .natural_key()
        .ok_or_else(|| AppError::malformed(format!("'{}' has no natural key", item.label())))?;

    match item {
        RawItem::Post(post) => reddit(post, key, now),
        RawItem::Video(video) => video_doc(video, key, now),
        RawItem::Entry(entry) => feed_entry(entry, key, now),
        RawItem::Album(album) => album_doc(album, key, now),
        RawItem::Weather(day) => weather(day, key),
    }
}

fn reddit(post: RedditPost, key: String, now: DateTime<Utc>) -> Result<CanonicalDocument> {
    let image_url = is_image_url(&key).then(|| key.clone());
    let permalink = post.permalink.map(|p| {
        if p.starts_with('/') {
            format!("{REDDIT_HOST}{p}")
        } else {
            p
        }
    });
    let author = post
        .author
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DELETED_AUTHOR.to_string());

    Ok(
        CanonicalDocument::new(DocType::Reddit, key, post.created_utc.unwrap_or(now))?
            .with_title(post.title)
            .with_attr("score", post.score)
            .with_attr("subreddit", post.subreddit)
            .with_attr("author", author)
            .with_attr("selftext", post.selftext)
            .with_opt_attr("image_url", image_url)
            .with_opt_attr("permalink", permalink),
    )
}

fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn video_doc(video: VideoItem, key: String, now: DateTime<Utc>) -> Result<CanonicalDocument> {
    Ok(
        CanonicalDocument::new(video.doc_type, key, video.published_at.unwrap_or(now))?
            .with_title(video.title)
            .with_description(video.description)
            .with_thumbnail(video.thumbnail_url)
            .with_opt_attr("video_id", video.video_id)
            .with_opt_attr("channel_id", video.channel_id)
            .with_attr("playlist_id", video.playlist_id),
    )
}

fn feed_entry(entry: FeedEntry, key: String, now: DateTime<Utc>) -> Result<CanonicalDocument> {
    let category = entry
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let doc = CanonicalDocument::new(entry.doc_type, key, entry.published_at.unwrap_or(now))?;
    let doc = match entry.title {
        Some(title) => doc.with_title(title),
        None => doc,
    };
    Ok(doc
        .with_description(entry.description)
        .with_thumbnail(entry.thumbnail_url)
        .with_attr("category", category)
        .with_attr("feed_url", entry.feed_url))
}

fn album_doc(album: AlbumRow, key: String, now: DateTime<Utc>) -> Result<CanonicalDocument> {
    let published_at = album
        .release_date
        .as_deref()
        .and_then(parse_release_date)
        .unwrap_or(now);

    let doc = CanonicalDocument::new(DocType::Album, key, published_at)?;
    let doc = match album.title {
        Some(title) => doc.with_title(title),
        None => doc,
    };
    Ok(doc
        .with_description(album.summary.clone())
        .with_thumbnail(album.image)
        .with_opt_attr("artist", album.artist)
        .with_opt_attr("release_date", album.release_date)
        .with_opt_attr("summary", album.summary))
}

/// Chart dates look like `October 17, 2026`.
fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    ["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

fn weather(day: DailyWeather, key: String) -> Result<CanonicalDocument> {
    let published_at = day.date.and_time(NaiveTime::MIN).and_utc();
    Ok(
        CanonicalDocument::new(DocType::Weather, key, published_at)?
            .with_title(format!("{} {}", day.date.format("%Y-%m-%d"), day.status))
            .with_attr("date", day.date.format("%Y-%m-%d").to_string())
            .with_attr("lat", day.lat)
            .with_attr("lon", day.lon)
            .with_attr("status", day.status)
            .with_attr("high_temp", day.high_temp)
            .with_attr("low_temp", day.low_temp)
            .with_opt_attr("current_temp", day.current_temp),
    )
}
