//! RSS feed source implementation.
//!
//! Feeds of one source are read one after another. A feed that cannot be
//! fetched or parsed is reported on its own and the next feed is tried; only
//! when every feed fails does the source as a whole count as unavailable.

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{DocType, FeedEntry, RawItem, RssSourceConfig};
use crate::sources::{FetchParams, SourceAdapter, isolate_units};
use crate::utils::http::send_bytes;

/// Parse an already-fetched [`rss::Channel`] into entries.
///
/// Pure, so fixtures can be tested without the network.
pub fn parse_channel(channel: &rss::Channel, doc_type: DocType, feed_url: &str) -> Vec<FeedEntry> {
    channel
        .items()
        .iter()
        .map(|item| FeedEntry {
            doc_type,
            feed_url: feed_url.to_string(),
            title: item.title().map(|t| t.trim().to_string()),
            link: item.link().map(|l| l.trim().to_string()),
            description: item.description().map(String::from),
            category: item.categories().first().map(|c| c.name().to_string()),
            thumbnail_url: thumbnail(item),
            published_at: published(item),
        })
        .collect()
}

/// media:thumbnail → media:content → image enclosure
fn thumbnail(item: &rss::Item) -> Option<String> {
    let media = item.extensions().get("media");
    let media_url = |name: &str| {
        media
            .and_then(|m| m.get(name))
            .and_then(|exts| exts.iter().find_map(|e| e.attrs().get("url").cloned()))
    };

    media_url("thumbnail")
        .or_else(|| media_url("content"))
        .or_else(|| {
            item.enclosure()
                .filter(|e| e.mime_type().starts_with("image/"))
                .map(|e| e.url().to_string())
        })
}

/// RFC 2822 `pubDate`, falling back to RFC 3339 and then `dc:date`.
fn published(item: &rss::Item) -> Option<DateTime<Utc>> {
    let parse = |raw: &str| {
        let raw = raw.trim();
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    };
    item.pub_date().and_then(parse).or_else(|| {
        item.dublin_core_ext()
            .and_then(|dc| dc.dates().first())
            .and_then(|d| parse(d.as_str()))
    })
}

/// One or more RSS feeds producing documents of one type.
pub struct RssSource {
    id: String,
    client: reqwest::Client,
    config: RssSourceConfig,
}

impl RssSource {
    pub fn new(id: impl Into<String>, client: reqwest::Client, config: RssSourceConfig) -> Self {
        Self {
            id: id.into(),
            client,
            config,
        }
    }

    async fn fetch_feed(&self, feed_url: &str, params: &FetchParams) -> Result<Vec<RawItem>> {
        log::info!("[{}] Processing feed: {}", self.id, feed_url);

        let body = send_bytes(&self.id, self.client.get(feed_url))
            .await
            .map_err(|e| AppError::feed_unavailable(feed_url, e))?;
        let channel = rss::Channel::read_from(&body[..])
            .map_err(|e| AppError::feed_unavailable(feed_url, format!("unparseable feed: {e}")))?;

        let entries = parse_channel(&channel, self.config.doc_type, feed_url);
        let total = entries.len();
        let items: Vec<RawItem> = entries
            .into_iter()
            .filter(|e| {
                !self.config.recent_only
                    || e.published_at.is_none_or(|at| params.window.contains(&at))
            })
            .map(RawItem::Entry)
            .collect();

        log::debug!("[{}] {} of {} entries kept from {}", self.id, items.len(), total, feed_url);
        Ok(items)
    }
}

impl SourceAdapter for RssSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "rss"
    }

    fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        let units = self
            .config
            .feeds
            .iter()
            .map(move |feed| {
                let items = stream::once(self.fetch_feed(feed, params))
                    .map(|result| match result {
                        Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
                        Err(e) => stream::iter([Err(e)]).boxed(),
                    })
                    .flatten()
                    .boxed();
                (feed.clone(), items)
            })
            .collect();
        isolate_units(&self.id, units)
    }
}
