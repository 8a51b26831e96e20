// src/lib.rs

//! Incremental multi-source ingestion library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod storage;
pub mod utils;
