//! Search and retrieval for lorebase.
//!
//! Hybrid dense + sparse retrieval over the vector store, constrained by
//! per-user folder visibility computed from the state store; plus the
//! retrieval helpers behind the MCP tool surface (`get_file`,
//! `get_chunk_range`, `list_indexed_folders`, `get_file_uri`).

pub mod assemble;
pub mod engine;
pub mod uri;

pub use assemble::merge_overlapping;
pub use engine::{
    ChunkRange, FileContent, IndexedFolderInfo, SearchEngine, SearchHit, SearchRequest,
    DEFAULT_ALPHA, MAX_LIMIT, MAX_RANGE_CHUNKS,
};
pub use uri::UriIssuer;
