//! YouTube Data API adapters.
//!
//! Both adapters end up walking playlists: a channel's uploads are a playlist
//! too. Every walked video goes through the same admission rules (sentinel
//! titles, keywords, optional recency window) before the runner sees it.

use chrono::{DateTime, Datelike, Utc};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DocType, RawItem, VideoItem, YoutubeChannelConfig, YoutubePlaylistConfig};
use crate::pipeline::{Classifier, Page, paginate};
use crate::sources::{FetchParams, SourceAdapter, isolate_units};
use crate::utils::http::send_json;

/// Largest page `playlistItems` serves.
const PAGE_SIZE: &str = "50";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemsResponse {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    video_owner_channel_id: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
    #[serde(default)]
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    #[serde(default)]
    high: Option<Thumbnail>,
    #[serde(default)]
    medium: Option<Thumbnail>,
    #[serde(default, rename = "default")]
    fallback: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl Thumbnails {
    /// high → medium → default → none
    fn best(self) -> Option<String> {
        self.high
            .or(self.medium)
            .or(self.fallback)
            .map(|t| t.url)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    #[serde(default)]
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    #[serde(default)]
    playlist_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    #[serde(default)]
    channel_id: String,
}

fn parse_video(value: Value, playlist_id: &str, doc_type: DocType) -> Result<VideoItem> {
    let item: PlaylistItem = serde_json::from_value(value)
        .map_err(|e| AppError::malformed(format!("playlist item in {playlist_id}: {e}")))?;
    let s = item.snippet;
    let video_id = s.resource_id.and_then(|r| r.video_id);
    let thumbnail_url = s.thumbnails.best();
    if thumbnail_url.is_none() {
        log::debug!("No thumbnail for video {:?}", video_id);
    }
    Ok(VideoItem {
        doc_type,
        video_id,
        title: s.title,
        description: s.description,
        thumbnail_url,
        published_at: s.published_at,
        channel_id: s.video_owner_channel_id.or(s.channel_id),
        playlist_id: playlist_id.to_string(),
    })
}

/// Turn one `playlistItems` response into a page of videos, decoding each
/// entry on its own.
pub fn parse_playlist_page(
    response: PlaylistItemsResponse,
    playlist_id: &str,
    doc_type: DocType,
) -> Page<Result<VideoItem>> {
    let videos = response
        .items
        .into_iter()
        .map(|value| parse_video(value, playlist_id, doc_type))
        .collect();
    Page::new(videos, response.next_page_token)
}

/// First search hit, if it belongs to the channel that was searched.
pub fn owned_playlist(response: SearchResponse, channel_id: &str) -> Option<String> {
    let hit = response.items.into_iter().next()?;
    if hit.snippet.channel_id != channel_id {
        log::warn!(
            "Playlist search in {} returned one from {}; ignored",
            channel_id,
            hit.snippet.channel_id
        );
        return None;
    }
    hit.id.playlist_id
}

/// Monthly playlist title, e.g. `Best New Trailers - October 2026`.
pub fn monthly_title(base_name: &str, now: DateTime<Utc>) -> String {
    format!("{} - {} {}", base_name, now.format("%B"), now.year())
}

/// Thin client over the endpoints the adapters need.
#[derive(Clone)]
pub struct YouTubeClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(client: reqwest::Client, api_base: &str, api_key: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn get(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/{}", self.api_base, endpoint))
            .query(&[("key", self.api_key.as_str())])
    }

    pub async fn playlist_page(
        &self,
        source_id: &str,
        playlist_id: &str,
        doc_type: DocType,
        page_token: Option<&str>,
    ) -> Result<Page<Result<VideoItem>>> {
        let mut request = self.get("playlistItems").query(&[
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", PAGE_SIZE),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let response: PlaylistItemsResponse = send_json(source_id, request).await?;
        Ok(parse_playlist_page(response, playlist_id, doc_type))
    }

    /// Id of the channel's uploads playlist.
    pub async fn uploads_playlist(
        &self,
        source_id: &str,
        channel_id: &str,
    ) -> Result<Option<String>> {
        let request = self
            .get("channels")
            .query(&[("part", "contentDetails"), ("id", channel_id)]);
        let response: ChannelsResponse = send_json(source_id, request).await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|c| c.content_details.related_playlists.uploads))
    }

    /// Search the channel for a playlist with the given title.
    pub async fn find_playlist(
        &self,
        source_id: &str,
        channel_id: &str,
        title: &str,
    ) -> Result<Option<String>> {
        let request = self.get("search").query(&[
            ("part", "snippet"),
            ("q", title),
            ("channelId", channel_id),
            ("type", "playlist"),
            ("maxResults", "1"),
        ]);
        let response: SearchResponse = send_json(source_id, request).await?;
        Ok(owned_playlist(response, channel_id))
    }
}

/// Admission rules shared by both adapters.
struct VideoFilter {
    classifier: Classifier,
    recent_only: bool,
}

impl VideoFilter {
    fn admits(&self, video: &VideoItem, params: &FetchParams) -> bool {
        if !self.classifier.admits(&video.title) {
            log::debug!("Skipping video {:?} '{}'", video.video_id, video.title);
            return false;
        }
        if self.recent_only {
            if let Some(at) = &video.published_at {
                return params.window.contains(at);
            }
        }
        true
    }
}

/// Walk one playlist and keep admitted videos.
fn playlist_videos<'a>(
    api: &'a YouTubeClient,
    source_id: &'a str,
    playlist_id: String,
    doc_type: DocType,
    cap: usize,
    filter: &'a VideoFilter,
    params: &'a FetchParams,
) -> BoxStream<'a, Result<RawItem>> {
    paginate(source_id, params, cap, move |token| {
        if token.is_none() {
            log::info!("[{}] playlist {}", source_id, playlist_id);
        }
        let playlist_id = playlist_id.clone();
        async move {
            api.playlist_page(source_id, &playlist_id, doc_type, token.as_deref())
                .await
        }
    })
    .and_then(future::ready)
    .try_filter(move |video| future::ready(filter.admits(video, params)))
    .map_ok(RawItem::Video)
    .boxed()
}

/// Resolve a playlist id, then walk it. A channel without a match contributes nothing.
fn resolved_videos<'a, F, W>(lookup: F, walk: W, missing: String) -> BoxStream<'a, Result<RawItem>>
where
    F: std::future::Future<Output = Result<Option<String>>> + Send + 'a,
    W: FnOnce(String) -> BoxStream<'a, Result<RawItem>> + Send + 'a,
{
    stream::once(async move {
        match lookup.await {
            Ok(Some(playlist_id)) => walk(playlist_id),
            Ok(None) => {
                log::info!("{missing}");
                stream::empty().boxed()
            }
            Err(e) => stream::once(future::ready(Err::<RawItem, AppError>(e))).boxed(),
        }
    })
    .flatten()
    .boxed()
}

/// Recent uploads of whole channels.
pub struct ChannelUploadsSource {
    id: String,
    api: YouTubeClient,
    config: YoutubeChannelConfig,
    filter: VideoFilter,
    cap: usize,
}

impl ChannelUploadsSource {
    pub fn new(
        id: impl Into<String>,
        api: YouTubeClient,
        config: YoutubeChannelConfig,
        cap: usize,
    ) -> Self {
        let filter = VideoFilter {
            classifier: Classifier::new(&config.keywords),
            recent_only: config.recent_only,
        };
        Self {
            id: id.into(),
            api,
            config,
            filter,
            cap,
        }
    }
}

impl SourceAdapter for ChannelUploadsSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "youtube_channel"
    }

    /// Channels are walked one after another; a channel that cannot be read
    /// is reported on its own and the next one still runs.
    fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        let units = self
            .config
            .channel_ids
            .iter()
            .map(move |channel| {
                let videos = resolved_videos(
                    self.api.uploads_playlist(&self.id, channel),
                    move |playlist_id| {
                        playlist_videos(
                            &self.api,
                            &self.id,
                            playlist_id,
                            self.config.doc_type,
                            self.cap,
                            &self.filter,
                            params,
                        )
                    },
                    format!("[{}] channel {} has no uploads playlist", self.id, channel),
                );
                (format!("channel {channel}"), videos)
            })
            .collect();
        isolate_units(&self.id, units)
    }
}

/// Explicit playlists plus an optional monthly playlist found by title.
pub struct PlaylistSource {
    id: String,
    api: YouTubeClient,
    config: YoutubePlaylistConfig,
    filter: VideoFilter,
    cap: usize,
}

impl PlaylistSource {
    pub fn new(
        id: impl Into<String>,
        api: YouTubeClient,
        config: YoutubePlaylistConfig,
        cap: usize,
    ) -> Self {
        let filter = VideoFilter {
            classifier: Classifier::new(&config.keywords),
            recent_only: config.recent_only,
        };
        Self {
            id: id.into(),
            api,
            config,
            filter,
            cap,
        }
    }

    fn walk<'a>(
        &'a self,
        playlist_id: String,
        params: &'a FetchParams,
    ) -> BoxStream<'a, Result<RawItem>> {
        playlist_videos(
            &self.api,
            &self.id,
            playlist_id,
            self.config.doc_type,
            self.cap,
            &self.filter,
            params,
        )
    }
}

impl SourceAdapter for PlaylistSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "youtube_playlist"
    }

    /// Explicit playlists first, then this month's named playlist in each
    /// channel. Each playlist fails on its own.
    fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        let explicit = self.config.playlist_ids.iter().map(move |playlist_id| {
            (
                format!("playlist {playlist_id}"),
                self.walk(playlist_id.clone(), params),
            )
        });

        let named = self.config.named.iter().flat_map(move |named| {
            let title = monthly_title(&named.base_name, params.now);
            named.channel_ids.iter().map(move |channel| {
                let missing =
                    format!("[{}] no playlist '{}' in channel {}", self.id, title, channel);
                let label = format!("playlist '{title}' in {channel}");
                let title = title.clone();
                let videos = resolved_videos(
                    async move { self.api.find_playlist(&self.id, channel, &title).await },
                    move |playlist_id| self.walk(playlist_id, params),
                    missing,
                );
                (label, videos)
            })
        });

        isolate_units(&self.id, explicit.chain(named).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::IngestionRunner;
    use crate::sources::test_server::{TestServer, route};
    use crate::storage::{DocumentSink, MemorySink};
    use chrono::TimeZone;

    const PAGE: &str = r#"{
        "nextPageToken": "CDIQAA",
        "items": [
            {"snippet": {
                "publishedAt": "2026-10-17T03:00:00Z",
                "channelId": "UCplaylistOwner",
                "videoOwnerChannelId": "UCstudio",
                "title": "Movie X – Official Trailer",
                "description": "In theaters soon",
                "thumbnails": {
                    "default": {"url": "https://i.ytimg.com/vi/aaa/default.jpg"},
                    "medium": {"url": "https://i.ytimg.com/vi/aaa/mqdefault.jpg"}
                },
                "resourceId": {"kind": "youtube#video", "videoId": "aaa"}
            }},
            {"snippet": {
                "publishedAt": "2026-10-16T10:00:00Z",
                "title": "Private video",
                "thumbnails": {},
                "resourceId": {"kind": "youtube#video", "videoId": "bbb"}
            }}
        ]
    }"#;

    fn page() -> Page<VideoItem> {
        let response: PlaylistItemsResponse = serde_json::from_str(PAGE).unwrap();
        let page = parse_playlist_page(response, "PLtrailers", DocType::Trailer);
        Page::new(
            page.items.into_iter().map(Result::unwrap).collect(),
            page.next_token,
        )
    }

    #[test]
    fn test_parse_playlist_page() {
        let page = page();
        assert_eq!(page.next_token.as_deref(), Some("CDIQAA"));
        assert_eq!(page.items.len(), 2);

        let first = &page.items[0];
        assert_eq!(
            first.watch_url().as_deref(),
            Some("https://www.youtube.com/watch?v=aaa")
        );
        // No "high": falls back to medium
        assert_eq!(
            first.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/aaa/mqdefault.jpg")
        );
        assert_eq!(first.channel_id.as_deref(), Some("UCstudio"));
        assert_eq!(first.playlist_id, "PLtrailers");
        assert!(page.items[1].thumbnail_url.is_none());
    }

    #[test]
    fn test_filter_drops_private_and_old() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let params = FetchParams::new(now);
        let filter = VideoFilter {
            classifier: Classifier::new(crate::pipeline::classify::default_keywords()),
            recent_only: true,
        };
        let mut videos = page().items;
        assert!(filter.admits(&videos[0], &params));
        assert!(!filter.admits(&videos[1], &params));

        videos[0].published_at = Some(Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap());
        assert!(!filter.admits(&videos[0], &params));

        let everything = VideoFilter {
            classifier: Classifier::default(),
            recent_only: false,
        };
        assert!(everything.admits(&videos[0], &params));
    }

    #[test]
    fn test_owned_playlist() {
        let json = r#"{"items": [{"id": {"kind": "youtube#playlist", "playlistId": "PLx"},
                                  "snippet": {"channelId": "UCmine"}}]}"#;
        let mine: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(owned_playlist(mine, "UCmine").as_deref(), Some("PLx"));

        let theirs: SearchResponse = serde_json::from_str(json).unwrap();
        assert!(owned_playlist(theirs, "UCother").is_none());

        let empty: SearchResponse = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(owned_playlist(empty, "UCmine").is_none());
    }

    #[test]
    fn test_malformed_entry_keeps_the_page() {
        let response: PlaylistItemsResponse = serde_json::from_str(
            r#"{"items": [
                {"snippet": {"title": "Clip One", "resourceId": {"videoId": "one"}}},
                {"kind": "youtube#playlistItem"},
                {"snippet": {"title": "Clip Two", "publishedAt": "yesterday"}},
                {"snippet": {"title": "Clip Three", "resourceId": {"videoId": "three"}}}
            ]}"#,
        )
        .unwrap();
        let page = parse_playlist_page(response, "PLx", DocType::MusicVideo);

        assert_eq!(page.items.len(), 4);
        assert!(page.next_token.is_none());
        assert_eq!(page.items[0].as_ref().unwrap().video_id.as_deref(), Some("one"));
        assert!(matches!(page.items[1], Err(AppError::ItemMalformed(_))));
        assert!(matches!(page.items[2], Err(AppError::ItemMalformed(_))));
        assert_eq!(page.items[3].as_ref().unwrap().title, "Clip Three");
    }

    fn clips(ids: &[&str], next: Option<&str>) -> String {
        let items: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(r#"{{"snippet": {{"title": "Clip {id}", "resourceId": {{"videoId": "{id}"}}}}}}"#)
            })
            .collect();
        match next {
            Some(token) => format!(r#"{{"nextPageToken": "{token}", "items": [{}]}}"#, items.join(",")),
            None => format!(r#"{{"items": [{}]}}"#, items.join(",")),
        }
    }

    #[tokio::test]
    async fn test_channel_uploads_walked_to_cap() {
        let server = TestServer::start(vec![
            route("/channels?id=UCgone", 403, r#"{"error": {"code": 403}}"#),
            route(
                "/channels?id=UCgood",
                200,
                r#"{"items": [{"contentDetails": {"relatedPlaylists": {"uploads": "UUgood"}}}]}"#,
            ),
            route("/playlistItems?pageToken=P2", 200, clips(&["c", "d"], Some("P3"))),
            route("/playlistItems?pageToken=P3", 200, clips(&["e"], None)),
            route("/playlistItems?playlistId=UUgood", 200, clips(&["a", "b"], Some("P2"))),
        ])
        .await;
        let config: YoutubeChannelConfig = toml::from_str(&format!(
            "channel_ids = [\"UCgone\", \"UCgood\"]\nkeywords = []\nrecent_only = false\napi_base = \"{}\"",
            server.base()
        ))
        .unwrap();
        let api = YouTubeClient::new(reqwest::Client::new(), server.base(), "k".into());
        let source = ChannelUploadsSource::new("yt", api, config, 3);
        let sink = MemorySink::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();

        let summary = IngestionRunner::new(&sink, 25)
            .run(&source, &FetchParams::new(now))
            .await;
        assert!(summary.is_success());
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.feed_errors.len(), 1);
        assert!(summary.feed_errors[0].contains("UCgone"));
        assert_eq!(server.hits("/playlistItems"), 2);
        assert!(
            sink.contains(DocType::MusicVideo, "https://www.youtube.com/watch?v=c")
                .await
                .unwrap()
        );
        assert!(
            !sink.contains(DocType::MusicVideo, "https://www.youtube.com/watch?v=d")
                .await
                .unwrap()
        );
    }

    #[test]
    fn test_monthly_title() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(
            monthly_title("Best New Trailers", now),
            "Best New Trailers - October 2026"
        );
    }
}
