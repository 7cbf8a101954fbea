//! Token-window chunking.
//!
//! Splits extracted text into overlapping windows sized in tokens, counted
//! by the embedder's own [`TokenCounter`] so a chunk never exceeds what the
//! model will actually accept. Chunking is deterministic: the same input
//! yields byte-identical boundaries and ordinals.

pub mod window;

pub use window::TokenChunker;
