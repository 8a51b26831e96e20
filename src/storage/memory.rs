//! In-process document store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{CanonicalDocument, DocType};
use crate::storage::{DocumentSink, UpsertOutcome};

type Collection = HashMap<(DocType, String), CanonicalDocument>;

/// Mutex-guarded map keyed by `(type, natural_key)`.
#[derive(Debug, Default)]
pub struct MemorySink {
    docs: Mutex<Collection>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collection>> {
        self.docs
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored documents of one type, ordered by key.
    pub fn documents(&self, doc_type: DocType) -> Vec<CanonicalDocument> {
        let mut docs: Vec<_> = self
            .lock()
            .map(|docs| {
                docs.values()
                    .filter(|d| d.doc_type == doc_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));
        docs
    }
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn upsert_if_absent(&self, doc: CanonicalDocument) -> Result<UpsertOutcome> {
        let mut docs = self.lock()?;
        let key = (doc.doc_type, doc.natural_key.clone());
        if docs.contains_key(&key) {
            return Ok(UpsertOutcome::AlreadyExists);
        }
        docs.insert(key, doc);
        Ok(UpsertOutcome::Inserted)
    }

    async fn find(
        &self,
        doc_type: DocType,
        natural_key: &str,
    ) -> Result<Option<CanonicalDocument>> {
        let docs = self.lock()?;
        Ok(docs.get(&(doc_type, natural_key.to_string())).cloned())
    }
}
