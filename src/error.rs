// src/error.rs

//! Unified error handling for the ingestion engine.
//!
//! Every failure carries a [`FailureScope`] so the runner can tell a dropped
//! item apart from a source that has to be retried on the next trigger.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// External source unreachable, unauthorized, rate limited or returned garbage
    #[error("Source '{source_id}' unavailable: {message}")]
    SourceUnavailable { source_id: String, message: String },

    /// One feed of a multi-feed source failed; the remaining feeds continue
    #[error("Feed {feed} unavailable: {message}")]
    FeedUnavailable { feed: String, message: String },

    /// A single item could not be turned into a document
    #[error("Malformed item: {0}")]
    ItemMalformed(String),

    /// The document store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Per-source wall-clock budget exhausted
    #[error("Source '{source_id}' timed out after {elapsed_secs}s")]
    Timeout { source_id: String, elapsed_secs: u64 },

    /// Cooperative cancellation observed
    #[error("Source '{0}' cancelled")]
    Cancelled(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    /// Skip the item, keep going
    Item,
    /// Skip one feed of the source, keep going
    Feed,
    /// Abort this source invocation
    Source,
    /// Abort this source invocation; the store is down
    Store,
}

impl AppError {
    /// Create a source-unavailable error.
    pub fn source_unavailable(source_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// Create a per-feed failure.
    pub fn feed_unavailable(feed: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::FeedUnavailable {
            feed: feed.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-item error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::ItemMalformed(message.into())
    }

    /// Create a store-unavailable error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::StoreUnavailable(message.to_string())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify the failure for the runner.
    pub fn scope(&self) -> FailureScope {
        match self {
            Self::ItemMalformed(_) | Self::Json(_) | Self::Url(_) => FailureScope::Item,
            Self::FeedUnavailable { .. } => FailureScope::Feed,
            Self::StoreUnavailable(_) | Self::Io(_) => FailureScope::Store,
            Self::SourceUnavailable { .. }
            | Self::Timeout { .. }
            | Self::Cancelled(_)
            | Self::Http(_)
            | Self::Toml(_)
            | Self::Selector { .. }
            | Self::Config(_)
            | Self::Validation(_) => FailureScope::Source,
        }
    }

    /// Whether this failure ends the current source invocation.
    pub fn aborts_source(&self) -> bool {
        matches!(self.scope(), FailureScope::Source | FailureScope::Store)
    }
}
