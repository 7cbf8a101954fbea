//! Filesystem observation and indexing for lorebase.
//!
//! - [`FileWatcher`] / [`watcher::coalesce`]: debounced, coalesced change
//!   events with rename correlation over the managed root.
//! - [`Indexer`]: folder-scan workers running the
//!   extract → chunk → embed → store pipeline with per-folder
//!   single-flight and hash-based change detection.

pub mod indexer;
pub mod watcher;

pub use indexer::{Indexer, IndexerConfig, ScanSummary};
pub use watcher::{FileSig, FileWatcher, MetaMap, RawEvent, RawKind, DEBOUNCE_WINDOW};
