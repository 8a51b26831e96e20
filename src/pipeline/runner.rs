// src/pipeline/runner.rs

//! One source invocation: fetch, filter, normalize, persist, report.
//!
//! ```text
//! Fetching → Filtering → Normalizing → Persisting → Reporting
//! ```
//!
//! Item-level problems are counted and skipped. Anything that reaches the
//! whole source (unreachable API, store down, deadline, cancellation) ends the
//! invocation with a failure summary carrying the counts so far. Nothing is
//! retried here; the next trigger is the retry.

use chrono::Utc;
use futures::StreamExt;

use crate::error::{AppError, FailureScope};
use crate::models::{CanonicalDocument, RunPhase, Summary};
use crate::pipeline::dedup::{DedupFilter, Verdict};
use crate::pipeline::normalize::normalize;
use crate::sources::{FetchParams, SourceAdapter};
use crate::storage::{DocumentSink, UpsertOutcome};

pub struct IngestionRunner<'a> {
    sink: &'a dyn DocumentSink,
    batch_size: usize,
}

impl<'a> IngestionRunner<'a> {
    pub fn new(sink: &'a dyn DocumentSink, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one adapter to completion. Never returns an error; failures are
    /// reported in the summary.
    pub async fn run(&self, adapter: &dyn SourceAdapter, params: &FetchParams) -> Summary {
        let source_id = adapter.id();
        let mut summary = Summary::started(source_id, Utc::now());
        log::info!("[{}] Fetching ({})", source_id, adapter.kind());

        if let Err((err, phase)) = self.drive(adapter, params, &mut summary).await {
            log::warn!("[{}] aborted while {:?}: {}", source_id, phase, err);
            summary.fail(&err, phase);
        }

        summary.finish(Utc::now());
        log::info!(
            "[{}] Reporting: {} inserted, {} duplicate, {} skipped, {} failed in {}ms",
            source_id,
            summary.inserted,
            summary.duplicate,
            summary.skipped,
            summary.failed,
            summary.elapsed_ms()
        );
        summary
    }

    async fn drive(
        &self,
        adapter: &dyn SourceAdapter,
        params: &FetchParams,
        summary: &mut Summary,
    ) -> Result<(), (AppError, RunPhase)> {
        let source_id = adapter.id();
        let mut dedup = DedupFilter::new(self.sink);
        let mut batch: Vec<CanonicalDocument> = Vec::with_capacity(self.batch_size);
        let mut stream = adapter.fetch(params);

        loop {
            let next = params
                .guard(source_id, stream.next())
                .await
                .map_err(|e| (e, RunPhase::Fetching))?;
            let Some(next) = next else {
                break;
            };

            let item = match next {
                Ok(item) => item,
                Err(err) => match err.scope() {
                    FailureScope::Item => {
                        log::warn!("[{}] skipping item: {}", source_id, err);
                        summary.failed += 1;
                        continue;
                    }
                    FailureScope::Feed => {
                        log::warn!("[{}] {}", source_id, err);
                        summary.failed += 1;
                        summary.feed_errors.push(err.to_string());
                        continue;
                    }
                    FailureScope::Source | FailureScope::Store => {
                        return Err((err, RunPhase::Fetching));
                    }
                },
            };

            let Some(key) = item.natural_key() else {
                log::debug!("[{}] no natural key: {}", source_id, item.label());
                summary.skipped += 1;
                continue;
            };

            match dedup.check(item.doc_type(), &key).await {
                Ok(Verdict::Fresh) => {}
                Ok(_) => {
                    summary.duplicate += 1;
                    continue;
                }
                Err(err) => return Err((err, RunPhase::Filtering)),
            }

            match normalize(item, params.now) {
                Ok(doc) => batch.push(doc),
                Err(err) if !err.aborts_source() => {
                    log::warn!("[{}] normalize failed: {}", source_id, err);
                    summary.failed += 1;
                    continue;
                }
                Err(err) => return Err((err, RunPhase::Normalizing)),
            }

            if batch.len() >= self.batch_size {
                self.flush(&mut batch, summary)
                    .await
                    .map_err(|e| (e, RunPhase::Persisting))?;
            }
        }

        log::debug!("[{}] {} distinct keys checked", source_id, dedup.seen_count());
        self.flush(&mut batch, summary)
            .await
            .map_err(|e| (e, RunPhase::Persisting))
    }

    async fn flush(
        &self,
        batch: &mut Vec<CanonicalDocument>,
        summary: &mut Summary,
    ) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }
        let stamped = Utc::now();
        let docs: Vec<_> = batch
            .drain(..)
            .map(|doc| doc.with_ingested_at(stamped))
            .collect();

        for result in self.sink.batch_upsert_if_absent(docs).await {
            match result {
                Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
                Ok(UpsertOutcome::AlreadyExists) => summary.duplicate += 1,
                Err(err) if err.aborts_source() => return Err(err),
                Err(err) => {
                    log::warn!("[{}] write rejected: {}", summary.source_id, err);
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::{DocType, FailureKind, FeedEntry, RawItem};
    use crate::storage::MemorySink;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use futures::stream::{self, BoxStream};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 5, 0, 0).unwrap()
    }

    fn entry(link: Option<&str>) -> RawItem {
        RawItem::Entry(FeedEntry {
            doc_type: DocType::News,
            feed_url: "https://example.com/rss".into(),
            title: Some("Headline".into()),
            link: link.map(str::to_string),
            description: None,
            category: None,
            thumbnail_url: None,
            published_at: Some(now()),
        })
    }

    /// Replays a fixed script of items and errors on every fetch.
    struct Scripted {
        id: &'static str,
        script: fn() -> Vec<Result<RawItem>>,
    }

    impl SourceAdapter for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn kind(&self) -> &'static str {
            "scripted"
        }

        fn fetch<'a>(&'a self, _params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
            stream::iter((self.script)()).boxed()
        }
    }

    fn three_links() -> Vec<Result<RawItem>> {
        (1..=3)
            .map(|i| Ok(entry(Some(format!("https://example.com/{i}").as_str()))))
            .collect()
    }

    #[tokio::test]
    async fn test_second_run_is_all_duplicates() {
        let sink = MemorySink::new();
        let runner = IngestionRunner::new(&sink, 2);
        let adapter = Scripted {
            id: "news",
            script: three_links,
        };
        let params = FetchParams::new(now());

        let first = runner.run(&adapter, &params).await;
        assert!(first.is_success());
        assert_eq!(first.inserted, 3);

        let second = runner.run(&adapter, &params).await;
        assert!(second.is_success());
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicate, 3);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn test_item_errors_counted_and_skipped() {
        let sink = MemorySink::new();
        let runner = IngestionRunner::new(&sink, 25);
        let adapter = Scripted {
            id: "news",
            script: || {
                vec![
                    Ok(entry(Some("https://example.com/a"))),
                    Err(AppError::malformed("bad json")),
                    Ok(entry(None)),
                    Ok(entry(Some("https://example.com/a"))),
                    Err(AppError::feed_unavailable("https://example.com/b", "HTTP 500")),
                    Ok(entry(Some("https://example.com/c"))),
                ]
            },
        };

        let summary = runner.run(&adapter, &FetchParams::new(now())).await;
        assert!(summary.is_success());
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.duplicate, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.feed_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_keeps_counts() {
        let sink = MemorySink::new();
        let runner = IngestionRunner::new(&sink, 1);
        let adapter = Scripted {
            id: "reddit",
            script: || {
                vec![
                    Ok(entry(Some("https://example.com/a"))),
                    Err(AppError::source_unavailable("reddit", "HTTP 429")),
                    Ok(entry(Some("https://example.com/never"))),
                ]
            },
        };

        let summary = runner.run(&adapter, &FetchParams::new(now())).await;
        let failure = summary.error.clone().unwrap();
        assert_eq!(failure.kind, FailureKind::SourceUnavailable);
        assert_eq!(failure.phase, RunPhase::Fetching);
        assert_eq!(summary.inserted, 1);
        assert!(!sink.contains(DocType::News, "https://example.com/never").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_item() {
        let sink = MemorySink::new();
        let runner = IngestionRunner::new(&sink, 25);
        let adapter = Scripted {
            id: "news",
            script: three_links,
        };
        let params = FetchParams::new(now());
        params.cancel.cancel();

        let summary = runner.run(&adapter, &params).await;
        assert_eq!(summary.error.as_ref().unwrap().kind, FailureKind::Cancelled);
        assert_eq!(summary.seen(), 0);
        assert!(sink.is_empty());
    }

    /// Store that is always unreachable.
    struct DownSink;

    #[async_trait]
    impl DocumentSink for DownSink {
        async fn upsert_if_absent(&self, _doc: CanonicalDocument) -> Result<UpsertOutcome> {
            Err(AppError::store("connection refused"))
        }

        async fn find(&self, _: DocType, _: &str) -> Result<Option<CanonicalDocument>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_store_failure_reported_in_persisting() {
        let sink = DownSink;
        let runner = IngestionRunner::new(&sink, 25);
        let adapter = Scripted {
            id: "news",
            script: three_links,
        };

        let summary = runner.run(&adapter, &FetchParams::new(now())).await;
        let failure = summary.error.unwrap();
        assert_eq!(failure.kind, FailureKind::StoreUnavailable);
        assert_eq!(failure.phase, RunPhase::Persisting);
        assert_eq!(summary.inserted, 0);
    }
}
