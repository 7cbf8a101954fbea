//! # lorebase-core
//!
//! Core types and traits for lorebase, a self-hosted knowledge base that
//! mirrors a managed directory tree (local edits and remote sync sources)
//! into a chunked, embedded, searchable index.
//!
//! The pipeline runs:
//!
//! ```text
//! managed root ─▶ observer ─▶ indexer ─▶ extract ─▶ chunk ─▶ embed
//!        ▲                       │                              │
//!        └── sync engine         └─▶ state store ──▶ vector store
//! ```
//!
//! This crate defines the shared vocabulary: entity records keyed by
//! [`LogicalPath`], the status machines, the error kinds, and the
//! capability traits ([`Embedder`], [`VectorStore`], ...) that isolate the
//! external collaborators.

pub mod error;
pub mod path;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, ExtractError, Result, StoreError};
pub use path::LogicalPath;
pub use traits::*;
pub use types::*;
