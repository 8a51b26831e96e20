//! Ingestion pipeline shared by every source.
//!
//! - `cursor` / `window` / `classify`: pure building blocks used by adapters
//! - `dedup` / `normalize`: per-item stages of a run
//! - `runner`: one source invocation, end to end
//! - `ingestor`: trigger entry point over all registered sources

pub mod classify;
pub mod cursor;
pub mod dedup;
pub mod ingestor;
pub mod normalize;
pub mod runner;
pub mod window;

pub use classify::Classifier;
pub use cursor::{Page, PageCursor, paginate};
pub use dedup::{DedupFilter, Verdict};
pub use ingestor::Ingestor;
pub use normalize::normalize;
pub use runner::IngestionRunner;
pub use window::TimeWindow;
