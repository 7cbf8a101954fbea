//! PDF text layer. Images are ignored.

use lorebase_core::{ExtractError, ExtractedText, LogicalPath};

use crate::registry::{normalize_newlines, Extractor};

/// Extractor for PDF documents (text layer only).
pub struct PdfExtractor;

impl PdfExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PdfExtractor {
    fn supported_mimes(&self) -> &[&str] {
        &["application/pdf"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn extract(
        &self,
        bytes: &[u8],
        _mime: &str,
        _path: &LogicalPath,
    ) -> Result<ExtractedText, ExtractError> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Parse(format!("pdf: {e}")))?;
        Ok(ExtractedText {
            text: normalize_newlines(&text),
            language: None,
        })
    }
}
