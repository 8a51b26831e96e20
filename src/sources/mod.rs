//! Source adapters.
//!
//! One adapter per source kind. An adapter turns one `fetch` call into a
//! lazy, finite stream of raw items; it owns no state between calls and
//! never touches the store.

pub mod params;
pub mod reddit;
pub mod rss;
pub mod scrape;
pub mod weather;
pub mod youtube;

#[cfg(test)]
pub(crate) mod test_server;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{IngestConfig, RawItem, SourceConfig, SourceKind};

pub use params::FetchParams;
pub use reddit::RedditSource;
pub use rss::RssSource;
pub use scrape::AlbumChartSource;
pub use weather::WeatherSource;
pub use youtube::{ChannelUploadsSource, PlaylistSource, YouTubeClient};

/// A pull-based source of raw items.
pub trait SourceAdapter: Send + Sync {
    /// Configured id, unique per ingestor.
    fn id(&self) -> &str;

    /// Kind name, for logs.
    fn kind(&self) -> &'static str;

    /// Enumerate items for one invocation.
    ///
    /// Failures come through the stream: item-level errors are followed by
    /// more items, a source-level error is the last thing yielded.
    fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>>;
}

/// Stand-in for a source whose adapter could not be built.
///
/// Every fetch fails with the configuration error, so the problem shows up in
/// that source's summary on each run instead of blocking the whole registry.
pub struct Misconfigured {
    id: String,
    kind: &'static str,
    message: String,
}

impl Misconfigured {
    pub fn new(source: &SourceConfig, error: AppError) -> Self {
        let message = match error {
            AppError::Config(message) => message,
            other => other.to_string(),
        };
        Self {
            id: source.id.clone(),
            kind: source.kind.name(),
            message,
        }
    }
}

impl SourceAdapter for Misconfigured {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        self.kind
    }

    fn fetch<'a>(&'a self, _params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        stream::iter([Err(AppError::config(self.message.clone()))]).boxed()
    }
}

/// Errors that take down a single feed, subreddit, channel or playlist.
fn is_unit_failure(err: &AppError) -> bool {
    matches!(
        err,
        AppError::SourceUnavailable { .. } | AppError::FeedUnavailable { .. } | AppError::Http(_)
    )
}

struct Units<'a> {
    source_id: &'a str,
    pending: VecDeque<(String, BoxStream<'a, Result<RawItem>>)>,
    current: Option<(String, BoxStream<'a, Result<RawItem>>)>,
    total: usize,
    failed: usize,
    last_error: Option<String>,
    done: bool,
}

/// Drain labelled unit streams one after another, isolating their failures.
///
/// A unit that fails is reported as `FeedUnavailable` for its label and the
/// next unit starts. Only when every unit failed does the source itself fail.
/// Timeouts, cancellation and item-level errors pass through untouched.
pub(crate) fn isolate_units<'a>(
    source_id: &'a str,
    units: Vec<(String, BoxStream<'a, Result<RawItem>>)>,
) -> BoxStream<'a, Result<RawItem>> {
    let state = Units {
        source_id,
        total: units.len(),
        pending: units.into(),
        current: None,
        failed: 0,
        last_error: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            let Some((label, items)) = state.current.as_mut() else {
                match state.pending.pop_front() {
                    Some(unit) => {
                        state.current = Some(unit);
                        continue;
                    }
                    None if state.total > 0 && state.failed == state.total => {
                        state.done = true;
                        let err = AppError::source_unavailable(
                            state.source_id,
                            format!(
                                "all {} units failed, last: {}",
                                state.total,
                                state.last_error.take().unwrap_or_default()
                            ),
                        );
                        return Some((Err(err), state));
                    }
                    None => return None,
                }
            };

            match items.next().await {
                Some(Err(err)) if is_unit_failure(&err) => {
                    let err = match err {
                        AppError::FeedUnavailable { .. } => err,
                        other => AppError::feed_unavailable(label.as_str(), other.to_string()),
                    };
                    state.current = None;
                    state.failed += 1;
                    state.last_error = Some(err.to_string());
                    return Some((Err(err), state));
                }
                Some(Err(err)) if err.aborts_source() => {
                    state.done = true;
                    return Some((Err(err), state));
                }
                Some(next) => return Some((next, state)),
                None => state.current = None,
            }
        }
    })
    .boxed()
}

/// Reddit app credentials for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Secrets injected at startup, never read from the environment by adapters.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub youtube_api_key: Option<String>,
    pub weather_api_key: Option<String>,
    pub reddit: Option<RedditCredentials>,
}

impl Credentials {
    /// Collect credentials through a lookup such as `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let reddit = match (get("REDDIT_CLIENT_ID"), get("REDDIT_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(RedditCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        Self {
            youtube_api_key: get("YOUTUBE_API_KEY"),
            weather_api_key: get("WEATHER_API_KEY"),
            reddit,
        }
    }
}

fn require(key: &Option<String>, name: &str, source_id: &str) -> Result<String> {
    key.clone().ok_or_else(|| {
        AppError::config(format!("source '{source_id}' needs {name} to be set"))
    })
}

/// Construct the adapter for one configured source.
pub fn build_adapter(
    source: &SourceConfig,
    client: &reqwest::Client,
    creds: &Credentials,
    ingest: &IngestConfig,
) -> Result<Arc<dyn SourceAdapter>> {
    let id = source.id.clone();
    let adapter: Arc<dyn SourceAdapter> = match &source.kind {
        SourceKind::Reddit(cfg) => Arc::new(RedditSource::new(
            id,
            client.clone(),
            cfg.clone(),
            creds.reddit.clone(),
        )),
        SourceKind::YoutubeChannel(cfg) => {
            let key = require(&creds.youtube_api_key, "YOUTUBE_API_KEY", &id)?;
            let api = YouTubeClient::new(client.clone(), &cfg.api_base, key);
            Arc::new(ChannelUploadsSource::new(
                id,
                api,
                cfg.clone(),
                cfg.item_cap.unwrap_or(ingest.item_cap),
            ))
        }
        SourceKind::YoutubePlaylist(cfg) => {
            let key = require(&creds.youtube_api_key, "YOUTUBE_API_KEY", &id)?;
            let api = YouTubeClient::new(client.clone(), &cfg.api_base, key);
            Arc::new(PlaylistSource::new(
                id,
                api,
                cfg.clone(),
                cfg.item_cap.unwrap_or(ingest.item_cap),
            ))
        }
        SourceKind::Rss(cfg) => Arc::new(RssSource::new(id, client.clone(), cfg.clone())),
        SourceKind::Scrape(cfg) => {
            Arc::new(AlbumChartSource::new(id, client.clone(), cfg.clone())?)
        }
        SourceKind::Weather(cfg) => {
            let key = require(&creds.weather_api_key, "WEATHER_API_KEY", &id)?;
            Arc::new(WeatherSource::new(id, client.clone(), cfg.clone(), key))
        }
    };
    log::debug!("Built {} adapter '{}'", adapter.kind(), adapter.id());
    Ok(adapter)
}
