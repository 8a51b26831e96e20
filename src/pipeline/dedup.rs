// src/pipeline/dedup.rs

//! Cheap pre-filter in front of the store's conditional insert.
//!
//! Rejecting known keys here saves normalization work and store round trips.
//! It is not what guarantees uniqueness; the sink's upsert-if-absent does.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::DocType;
use crate::storage::DocumentSink;

/// Decision for one natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    SeenThisRun,
    AlreadyStored,
}

pub struct DedupFilter<'a> {
    sink: &'a dyn DocumentSink,
    seen: HashSet<(DocType, String)>,
}

impl<'a> DedupFilter<'a> {
    pub fn new(sink: &'a dyn DocumentSink) -> Self {
        Self {
            sink,
            seen: HashSet::new(),
        }
    }

    /// Check a key and remember it for the rest of the run.
    pub async fn check(&mut self, doc_type: DocType, natural_key: &str) -> Result<Verdict> {
        if !self.seen.insert((doc_type, natural_key.to_string())) {
            return Ok(Verdict::SeenThisRun);
        }
        if self.sink.contains(doc_type, natural_key).await? {
            return Ok(Verdict::AlreadyStored);
        }
        Ok(Verdict::Fresh)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalDocument;
    use crate::storage::MemorySink;
    use chrono::Utc;

    #[tokio::test]
    async fn test_verdicts() {
        let sink = MemorySink::new();
        sink.upsert_if_absent(
            CanonicalDocument::new(DocType::News, "https://example.com/old", Utc::now()).unwrap(),
        )
        .await
        .unwrap();

        let mut filter = DedupFilter::new(&sink);
        assert_eq!(
            filter.check(DocType::News, "https://example.com/new").await.unwrap(),
            Verdict::Fresh
        );
        assert_eq!(
            filter.check(DocType::News, "https://example.com/new").await.unwrap(),
            Verdict::SeenThisRun
        );
        assert_eq!(
            filter.check(DocType::News, "https://example.com/old").await.unwrap(),
            Verdict::AlreadyStored
        );
        // Same key, different type
        assert_eq!(
            filter
                .check(DocType::MusicFeed, "https://example.com/old")
                .await
                .unwrap(),
            Verdict::Fresh
        );
        assert_eq!(filter.seen_count(), 3);
    }
}
