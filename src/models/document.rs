//! Canonical document persisted by every source.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Schema variant of a document. Dedup keys are scoped per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Reddit,
    News,
    Weather,
    Trailer,
    MusicVideo,
    MusicFeed,
    Album,
}

impl DocType {
    pub const ALL: [DocType; 7] = [
        DocType::Reddit,
        DocType::News,
        DocType::Weather,
        DocType::Trailer,
        DocType::MusicVideo,
        DocType::MusicFeed,
        DocType::Album,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Reddit => "reddit",
            DocType::News => "news",
            DocType::Weather => "weather",
            DocType::Trailer => "trailer",
            DocType::MusicVideo => "music_video",
            DocType::MusicFeed => "music_feed",
            DocType::Album => "album",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        DocType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::validation(format!("unknown document type '{s}'")))
    }
}

/// Source-specific attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

/// Top-level keys owned by the document itself; attributes may not shadow them.
const RESERVED_KEYS: [&str; 7] = [
    "type",
    "natural_key",
    "title",
    "description",
    "thumbnail_url",
    "published_at",
    "ingested_at",
];

/// A normalized item, stored as a flat JSON object.
///
/// `(doc_type, natural_key)` is the uniqueness contract of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    #[serde(rename = "type")]
    pub doc_type: DocType,

    pub natural_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    pub published_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, Scalar>,
}

impl CanonicalDocument {
    /// Start a document. Fails when the natural key is blank.
    pub fn new(
        doc_type: DocType,
        natural_key: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Result<Self> {
        let natural_key = natural_key.into().trim().to_string();
        if natural_key.is_empty() {
            return Err(AppError::malformed(format!("{doc_type} item has no natural key")));
        }
        Ok(Self {
            doc_type,
            natural_key,
            title: None,
            description: None,
            thumbnail_url: None,
            published_at,
            ingested_at: None,
            attributes: BTreeMap::new(),
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = non_blank(title.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.and_then(non_blank);
        self
    }

    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url.and_then(non_blank);
        self
    }

    /// Attach a source-specific attribute. Reserved keys are ignored.
    pub fn with_attr(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        if !RESERVED_KEYS.contains(&key) {
            self.attributes.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn with_opt_attr<V: Into<Scalar>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_attr(key, v),
            None => self,
        }
    }

    /// Stamp the first-persistence time. An existing stamp is kept.
    pub fn with_ingested_at(mut self, at: DateTime<Utc>) -> Self {
        if self.ingested_at.is_none() {
            self.ingested_at = Some(at);
        }
        self
    }

    /// Stable record id derived from `(type, natural_key)`.
    pub fn id(&self) -> String {
        document_id(self.doc_type, &self.natural_key)
    }

    pub fn attr(&self, key: &str) -> Option<&Scalar> {
        self.attributes.get(key)
    }
}

/// Hex SHA-256 of the type and natural key.
pub fn document_id(doc_type: DocType, natural_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(natural_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
