//! # lorebase-extract
//!
//! Content extraction for the indexing pipeline: bytes in, normalized
//! UTF-8 text out. Extraction is pure — the indexer reads the file (it
//! needs the bytes for hashing anyway) and hands them here.
//!
//! | Extractor | Formats |
//! |-----------|---------|
//! | [`TextExtractor`] | plain text, markdown, source code |
//! | [`MarkupExtractor`] | html, xml (tags stripped) |
//! | [`StructuredExtractor`] | json, yaml, csv |
//! | [`OfficeExtractor`] | docx, pptx, xlsx, odt, odp, ods |
//! | [`PdfExtractor`] | pdf (text layer) |
//!
//! Unknown types are not an error: the registry returns `None` and the
//! indexer records the file as indexed with zero chunks.

pub mod markup;
pub mod office;
pub mod pdf;
pub mod registry;
pub mod structured;
pub mod text;

pub use markup::MarkupExtractor;
pub use office::OfficeExtractor;
pub use pdf::PdfExtractor;
pub use registry::{Extractor, ExtractorRegistry};
pub use structured::StructuredExtractor;
pub use text::TextExtractor;
