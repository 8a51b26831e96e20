//! Local filesystem storage implementation.
//!
//! Each document type is one JSON collection under the root directory.
//! Conditional inserts take an exclusive OS lock on the type's `.lock` file,
//! re-read the collection from disk, and write it back atomically (write to
//! temp, then rename) before releasing the lock. Any number of handles, in
//! this process or others, can share one root without losing or duplicating
//! documents.
//!
//! Reads take no lock: the rename means a reader sees either the old or the
//! new file. A read cache is kept per handle and dropped whenever the file on
//! disk changes.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── reddit.json       # { updated_at, count, documents: [...] }
//! ├── reddit.lock       # held while reddit.json is rewritten
//! ├── trailer.json
//! └── weather.json
//! ```

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CanonicalDocument, DocType, document_id};
use crate::storage::{DocumentSink, UpsertOutcome};

/// On-disk shape of one collection file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFile {
    /// ISO 8601 timestamp of last update
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub documents: Vec<CanonicalDocument>,
}

impl CollectionFile {
    pub fn new(documents: Vec<CanonicalDocument>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: documents.len(),
            documents,
        }
    }
}

/// Documents of one type keyed by [`CanonicalDocument::id`].
type Collection = HashMap<String, CanonicalDocument>;

/// Identity of a collection file as last read: modification time and size.
type Stamp = Option<(SystemTime, u64)>;

struct Snapshot {
    stamp: Stamp,
    docs: Collection,
}

/// Local filesystem storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    cache: Mutex<HashMap<DocType, Snapshot>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// All documents of one type, newest first.
    pub async fn load_collection(&self, doc_type: DocType) -> Result<Vec<CanonicalDocument>> {
        let path = collection_path(&self.root_dir, doc_type);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(decode_file(&bytes, &path)?.documents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No {} found", path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(store_io(e)),
        }
    }

    async fn stamp(path: &Path) -> Result<Stamp> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some((meta.modified().map_err(store_io)?, meta.len()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_io(e)),
        }
    }

    /// Insert one group of same-typed documents under the type's file lock.
    async fn insert_group(
        &self,
        doc_type: DocType,
        docs: Vec<CanonicalDocument>,
    ) -> Result<Vec<UpsertOutcome>> {
        let root = self.root_dir.clone();
        tokio::task::spawn_blocking(move || insert_locked(&root, doc_type, docs))
            .await
            .map_err(|e| AppError::store(format!("write of {doc_type} collection aborted: {e}")))?
    }
}

fn collection_path(root: &Path, doc_type: DocType) -> PathBuf {
    root.join(format!("{}.json", doc_type.as_str()))
}

fn lock_path(root: &Path, doc_type: DocType) -> PathBuf {
    root.join(format!("{}.lock", doc_type.as_str()))
}

fn store_io(e: std::io::Error) -> AppError {
    AppError::store(e)
}

fn decode_file(bytes: &[u8], path: &Path) -> Result<CollectionFile> {
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::store(format!("corrupt collection {}: {e}", path.display())))
}

fn into_collection(file: CollectionFile) -> Collection {
    file.documents.into_iter().map(|d| (d.id(), d)).collect()
}

/// Read bytes, returning None if file doesn't exist.
fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(store_io(e)),
    }
}

/// Write bytes atomically (write to temp, then rename).
fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(store_io)?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp).map_err(store_io)?;
    file.write_all(bytes).map_err(store_io)?;
    file.sync_all().map_err(store_io)?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(store_io)?;
    Ok(())
}

/// Persist one collection, newest first.
fn write_collection(path: &Path, docs: &Collection) -> Result<usize> {
    let mut documents: Vec<CanonicalDocument> = docs.values().cloned().collect();
    documents.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.natural_key.cmp(&b.natural_key))
    });
    let file = CollectionFile::new(documents);
    let bytes = serde_json::to_vec_pretty(&file).map_err(AppError::store)?;
    write_bytes(path, &bytes)?;
    Ok(file.count)
}

/// Load-modify-write of one collection while holding its exclusive lock.
///
/// Blocks until the lock is free. The collection is read after the lock is
/// taken, so inserts made by other handles in the meantime are seen.
fn insert_locked(
    root: &Path,
    doc_type: DocType,
    docs: Vec<CanonicalDocument>,
) -> Result<Vec<UpsertOutcome>> {
    std::fs::create_dir_all(root).map_err(store_io)?;
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(root, doc_type))
        .map_err(store_io)?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock.write().map_err(store_io)?;

    let path = collection_path(root, doc_type);
    let mut collection = match read_bytes(&path)? {
        Some(bytes) => into_collection(decode_file(&bytes, &path)?),
        None => Collection::new(),
    };

    let mut added = 0;
    let outcomes = docs
        .into_iter()
        .map(|doc| {
            let id = doc.id();
            if collection.contains_key(&id) {
                return UpsertOutcome::AlreadyExists;
            }
            collection.insert(id, doc);
            added += 1;
            UpsertOutcome::Inserted
        })
        .collect();

    if added > 0 {
        let count = write_collection(&path, &collection)?;
        log::info!("Stored {} new {} documents ({} total)", added, doc_type, count);
    }
    Ok(outcomes)
}

#[async_trait]
impl DocumentSink for LocalStorage {
    async fn upsert_if_absent(&self, doc: CanonicalDocument) -> Result<UpsertOutcome> {
        let mut results = self.batch_upsert_if_absent(vec![doc]).await;
        results
            .pop()
            .unwrap_or_else(|| Err(AppError::store("empty write result")))
    }

    /// One locked load-modify-write per touched collection for the whole batch.
    ///
    /// Outcomes come back in input order. When a collection cannot be written
    /// the list ends with that error; later groups are not attempted.
    async fn batch_upsert_if_absent(
        &self,
        docs: Vec<CanonicalDocument>,
    ) -> Vec<Result<UpsertOutcome>> {
        let total = docs.len();
        let mut groups: Vec<(DocType, Vec<usize>, Vec<CanonicalDocument>)> = Vec::new();
        for (idx, doc) in docs.into_iter().enumerate() {
            match groups.iter_mut().find(|(t, _, _)| *t == doc.doc_type) {
                Some((_, indices, group)) => {
                    indices.push(idx);
                    group.push(doc);
                }
                None => groups.push((doc.doc_type, vec![idx], vec![doc])),
            }
        }

        let mut slots: Vec<Option<Result<UpsertOutcome>>> = (0..total).map(|_| None).collect();
        for (doc_type, indices, group) in groups {
            match self.insert_group(doc_type, group).await {
                Ok(outcomes) => {
                    for (idx, outcome) in indices.into_iter().zip(outcomes) {
                        slots[idx] = Some(Ok(outcome));
                    }
                }
                Err(e) => {
                    log::error!("Write of {doc_type} collection failed: {e}");
                    slots[indices[0]] = Some(Err(e));
                    break;
                }
            }
        }

        let mut results = Vec::with_capacity(total);
        for slot in slots {
            match slot {
                Some(Err(e)) => {
                    results.push(Err(e));
                    break;
                }
                Some(ok) => results.push(ok),
                None => break,
            }
        }
        results
    }

    async fn find(
        &self,
        doc_type: DocType,
        natural_key: &str,
    ) -> Result<Option<CanonicalDocument>> {
        let path = collection_path(&self.root_dir, doc_type);
        let stamp = Self::stamp(&path).await?;
        let id = document_id(doc_type, natural_key);

        let mut cache = self.cache.lock().await;
        if let Some(snapshot) = cache.get(&doc_type) {
            if snapshot.stamp == stamp {
                return Ok(snapshot.docs.get(&id).cloned());
            }
        }

        let docs = match stamp {
            Some(_) => match tokio::fs::read(&path).await {
                Ok(bytes) => into_collection(decode_file(&bytes, &path)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collection::new(),
                Err(e) => return Err(store_io(e)),
            },
            None => Collection::new(),
        };
        log::debug!("Loaded {} {} documents", docs.len(), doc_type);
        let found = docs.get(&id).cloned();
        cache.insert(doc_type, Snapshot { stamp, docs });
        Ok(found)
    }
}
