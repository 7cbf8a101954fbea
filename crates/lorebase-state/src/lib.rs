//! Relational state store for lorebase.
//!
//! SQLite through `sqlx` with WAL journaling: concurrent readers, one
//! writer, no blocking between search queries and indexing writes. The
//! store holds everything except file bytes and vectors — folders, files,
//! chunks, sync sources and cursors, per-user visibility.

pub mod schema;
pub mod store;

pub use store::{FolderStats, StateStore};
