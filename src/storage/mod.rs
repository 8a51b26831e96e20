//! Storage abstractions for document persistence.
//!
//! The store owns the uniqueness contract: at most one document per
//! `(type, natural_key)`, enforced by an atomic upsert-if-absent. Everything
//! upstream of it is only an optimization.
//!
//! ## Directory Structure (LocalStorage)
//!
//! ```text
//! storage/
//! ├── reddit.json
//! ├── news.json
//! ├── trailer.json
//! └── ...               # one collection per document type
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FailureScope, Result};
use crate::models::{CanonicalDocument, DocType};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemorySink;

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Trait for document store backends.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Insert the document unless `(doc_type, natural_key)` is already stored.
    ///
    /// Atomic: two concurrent calls with the same key yield exactly one
    /// `Inserted`.
    async fn upsert_if_absent(&self, doc: CanonicalDocument) -> Result<UpsertOutcome>;

    /// Same semantics as one `upsert_if_absent` per document, in order.
    ///
    /// The returned list stops after the first store-level failure.
    async fn batch_upsert_if_absent(
        &self,
        docs: Vec<CanonicalDocument>,
    ) -> Vec<Result<UpsertOutcome>> {
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            let result = self.upsert_if_absent(doc).await;
            let stop = matches!(&result, Err(e) if e.scope() == FailureScope::Store);
            results.push(result);
            if stop {
                break;
            }
        }
        results
    }

    /// Read a document by key.
    async fn find(&self, doc_type: DocType, natural_key: &str)
    -> Result<Option<CanonicalDocument>>;

    async fn contains(&self, doc_type: DocType, natural_key: &str) -> Result<bool> {
        Ok(self.find(doc_type, natural_key).await?.is_some())
    }
}
