// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod price;
pub mod service;
pub mod storage;
pub mod web;

// ---- Re-exports for stable public API ----
pub use crate::error::{ArchiveError, StorageError};
pub use crate::storage::{Entity, NewsRecord, RetentionPolicy, Storage};
