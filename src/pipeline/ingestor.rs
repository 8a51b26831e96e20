// src/pipeline/ingestor.rs

//! Trigger entry point: source registry plus bounded concurrent execution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, IngestConfig, Summary};
use crate::pipeline::runner::IngestionRunner;
use crate::pipeline::window::TimeWindow;
use crate::sources::{Credentials, FetchParams, Misconfigured, SourceAdapter, build_adapter};
use crate::storage::DocumentSink;

/// Registered sources sharing one sink and one set of run settings.
pub struct Ingestor {
    sources: Vec<Arc<dyn SourceAdapter>>,
    sink: Arc<dyn DocumentSink>,
    settings: IngestConfig,
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(sink: Arc<dyn DocumentSink>, settings: IngestConfig) -> Self {
        Self {
            sources: Vec::new(),
            sink,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Build every enabled source of the config.
    ///
    /// A source that cannot be built (missing key, bad selector) is still
    /// registered and reports a configuration failure when run, so the other
    /// sources are unaffected.
    pub fn from_config(
        config: &Config,
        client: &reqwest::Client,
        creds: &Credentials,
        sink: Arc<dyn DocumentSink>,
    ) -> Result<Self> {
        let mut ingestor = Self::new(sink, config.ingest.clone());
        for source in config.enabled_sources() {
            let adapter = match build_adapter(source, client, creds, &config.ingest) {
                Ok(adapter) => adapter,
                Err(err) => {
                    log::warn!("[{}] not runnable: {}", source.id, err);
                    Arc::new(Misconfigured::new(source, err))
                }
            };
            ingestor.register(adapter)?;
        }
        log::info!("Registered {} sources", ingestor.sources.len());
        Ok(ingestor)
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<()> {
        if self.sources.iter().any(|s| s.id() == adapter.id()) {
            return Err(AppError::config(format!(
                "source '{}' registered twice",
                adapter.id()
            )));
        }
        self.sources.push(adapter);
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    /// Handle for stopping in-flight runs between items.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fresh params for one invocation: window, cap, deadline and cancel flag.
    pub fn params(&self, now: DateTime<Utc>) -> FetchParams {
        FetchParams::new(now)
            .with_window(TimeWindow::trailing_days(now, self.settings.window_days))
            .with_item_cap(self.settings.item_cap)
            .with_cancel(self.cancel.clone())
            .with_timeout(Duration::from_secs(self.settings.source_timeout_secs))
    }

    /// Run one source. Unknown ids produce a failure summary, not an error.
    pub async fn run_source(&self, source_id: &str, params: &FetchParams) -> Summary {
        let Some(adapter) = self.sources.iter().find(|s| s.id() == source_id) else {
            let err = AppError::config(format!("unknown source '{source_id}'"));
            log::error!("{err}");
            return Summary::rejected(source_id, &err);
        };
        IngestionRunner::new(self.sink.as_ref(), self.settings.batch_size)
            .run(adapter.as_ref(), params)
            .await
    }

    /// Run every registered source, at most `max_concurrent` at a time.
    pub async fn run_all(&self, now: DateTime<Utc>) -> Vec<Summary> {
        let ids: Vec<String> = self.sources.iter().map(|s| s.id().to_string()).collect();
        self.run_selected(&ids, now).await
    }

    /// Run the given sources concurrently. Summaries come back in input order.
    ///
    /// Each source gets its own deadline, started when the source starts, so
    /// waiting for a free slot does not eat into the budget.
    pub async fn run_selected(&self, source_ids: &[String], now: DateTime<Utc>) -> Vec<Summary> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = source_ids.iter().filter(|id| seen.insert(*id)).collect();

        let mut results: Vec<(usize, Summary)> = stream::iter(unique.into_iter().enumerate())
            .map(|(idx, id)| async move {
                let params = self.params(now);
                (idx, self.run_source(id, &params).await)
            })
            .buffer_unordered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, summary)| summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocType, FailureKind, FeedEntry, RawItem};
    use crate::storage::MemorySink;
    use chrono::TimeZone;
    use futures::stream::BoxStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 5, 0, 0).unwrap()
    }

    struct Fixed {
        id: String,
        fail: bool,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(id: &str, fail: bool) -> Self {
            Self {
                id: id.into(),
                fail,
                running: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl SourceAdapter for Fixed {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> &'static str {
            "fixed"
        }

        fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
            let id = self.id.clone();
            let fail = self.fail;
            let running = self.running.clone();
            let peak = self.peak.clone();
            stream::once(async move {
                let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now_running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                if fail {
                    return Err(AppError::source_unavailable(&id, "HTTP 503"));
                }
                Ok(RawItem::Entry(FeedEntry {
                    doc_type: DocType::News,
                    feed_url: format!("https://{id}.example.com/rss"),
                    title: Some(id.clone()),
                    link: Some(format!("https://{id}.example.com/1")),
                    description: None,
                    category: None,
                    thumbnail_url: None,
                    published_at: Some(params.now),
                }))
            })
            .boxed()
        }
    }

    fn ingestor(settings: IngestConfig) -> Ingestor {
        Ingestor::new(Arc::new(MemorySink::new()), settings)
    }

    #[tokio::test]
    async fn test_failing_source_isolated() {
        let mut ingestor = ingestor(IngestConfig::default());
        ingestor.register(Arc::new(Fixed::new("one", false))).unwrap();
        ingestor.register(Arc::new(Fixed::new("two", true))).unwrap();
        ingestor.register(Arc::new(Fixed::new("three", false))).unwrap();

        let summaries = ingestor.run_all(now()).await;
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].source_id, "one");
        assert!(summaries[0].is_success());
        assert_eq!(summaries[0].inserted, 1);
        assert_eq!(
            summaries[1].error.as_ref().map(|e| e.kind),
            Some(FailureKind::SourceUnavailable)
        );
        assert!(summaries[2].is_success());
        assert_eq!(summaries[2].inserted, 1);
    }

    #[tokio::test]
    async fn test_concurrency_bounded() {
        let settings = IngestConfig {
            max_concurrent: 2,
            ..IngestConfig::default()
        };
        let mut ingestor = ingestor(settings);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for id in ["a", "b", "c", "d", "e"] {
            let mut source = Fixed::new(id, false);
            source.running = running.clone();
            source.peak = peak.clone();
            ingestor.register(Arc::new(source)).unwrap();
        }

        let summaries = ingestor.run_all(now()).await;
        assert!(summaries.iter().all(Summary::is_success));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unknown_source_rejected() {
        let ingestor = ingestor(IngestConfig::default());
        let summary = ingestor
            .run_source("missing", &ingestor.params(now()))
            .await;
        assert_eq!(summary.error.as_ref().unwrap().kind, FailureKind::Config);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let mut ingestor = ingestor(IngestConfig::default());
        ingestor.register(Arc::new(Fixed::new("one", false))).unwrap();
        assert!(ingestor.register(Arc::new(Fixed::new("one", false))).is_err());
        assert_eq!(ingestor.source_ids(), vec!["one"]);
    }

    #[tokio::test]
    async fn test_misconfigured_source_fails_alone() {
        let config: Config = toml::from_str(
            r#"
[[sources]]
id = "weather"
kind = "weather"
lat = 40.71
lon = -74.01

[[sources]]
id = "news"
kind = "rss"
feeds = []
"#,
        )
        .unwrap();
        let ingestor = Ingestor::from_config(
            &config,
            &reqwest::Client::new(),
            &Credentials::default(),
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        assert_eq!(ingestor.source_ids(), vec!["weather", "news"]);

        let summaries = ingestor.run_all(now()).await;
        let failure = summaries[0].error.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Config);
        assert!(failure.message.contains("WEATHER_API_KEY"));
        assert!(summaries[1].is_success());
    }

    #[tokio::test]
    async fn test_cancel_token_stops_runs() {
        let mut ingestor = ingestor(IngestConfig::default());
        ingestor.register(Arc::new(Fixed::new("one", false))).unwrap();
        ingestor.cancel_token().cancel();

        let summaries = ingestor.run_all(now()).await;
        assert_eq!(
            summaries[0].error.as_ref().map(|e| e.kind),
            Some(FailureKind::Cancelled)
        );
    }
}
