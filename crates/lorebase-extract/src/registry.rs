//! Extractor registry: MIME → extractor dispatch with extension fallback.

use std::collections::HashMap;
use std::sync::Arc;

use lorebase_core::{ExtractError, ExtractedText, LogicalPath};

use crate::{MarkupExtractor, OfficeExtractor, PdfExtractor, StructuredExtractor, TextExtractor};

/// One content extractor. Extraction is a pure function of the bytes — the
/// indexer owns all file I/O.
pub trait Extractor: Send + Sync {
    /// MIME types this extractor claims.
    fn supported_mimes(&self) -> &[&str];

    /// Lower-case file extensions this extractor claims when the MIME type
    /// is missing or generic.
    fn supported_extensions(&self) -> &[&str];

    /// Extract normalized UTF-8 text. Blank lines are soft-break markers.
    fn extract(
        &self,
        bytes: &[u8],
        mime: &str,
        path: &LogicalPath,
    ) -> Result<ExtractedText, ExtractError>;
}

/// Routes files to extractors.
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
    mime_map: HashMap<String, Arc<dyn Extractor>>,
    ext_map: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            mime_map: HashMap::new(),
            ext_map: HashMap::new(),
        }
    }

    /// Registry with every built-in extractor.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TextExtractor::new());
        registry.register(MarkupExtractor::new());
        registry.register(StructuredExtractor::new());
        registry.register(OfficeExtractor::new());
        registry.register(PdfExtractor::new());
        registry
    }

    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn Extractor> = Arc::new(extractor);
        for mime in extractor.supported_mimes() {
            self.mime_map.insert((*mime).to_string(), Arc::clone(&extractor));
        }
        for ext in extractor.supported_extensions() {
            self.ext_map.insert((*ext).to_string(), Arc::clone(&extractor));
        }
        self.extractors.push(extractor);
    }

    fn lookup(&self, mime: &str, path: &LogicalPath) -> Option<Arc<dyn Extractor>> {
        if let Some(e) = self.mime_map.get(mime) {
            return Some(Arc::clone(e));
        }
        path.extension()
            .and_then(|ext| self.ext_map.get(&ext))
            .cloned()
    }

    /// Extract content for a file.
    ///
    /// `Ok(None)` means the type is unrecognized — the caller records the
    /// file as indexed with zero chunks. A recognized type that fails to
    /// parse surfaces the error.
    pub fn extract(
        &self,
        bytes: &[u8],
        mime: &str,
        path: &LogicalPath,
    ) -> Result<Option<ExtractedText>, ExtractError> {
        match self.lookup(mime, path) {
            Some(extractor) => extractor.extract(bytes, mime, path).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Normalize line endings to `\n`.
pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
