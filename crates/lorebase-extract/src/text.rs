//! Plain text and source code.

use lorebase_core::{ExtractError, ExtractedText, LogicalPath};

use crate::registry::{normalize_newlines, Extractor};

/// Extensions treated as source code; the extension doubles as the
/// language hint carried with chunks.
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "java", "go", "c", "cpp", "cc", "h", "hpp", "rb",
    "php", "swift", "kt", "kts", "scala", "clj", "ex", "exs", "erl", "hs", "ml", "mli", "lua",
    "sh", "bash", "zsh", "fish", "sql", "toml", "css", "scss", "vim", "nix", "tf", "hcl",
    "dockerfile", "makefile", "cmake", "gradle", "proto",
];

/// Plain-text extractor: passthrough with newline normalization.
pub struct TextExtractor;

impl TextExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for TextExtractor {
    fn supported_mimes(&self) -> &[&str] {
        &[
            "text/plain",
            "text/markdown",
            "text/x-markdown",
            "text/x-rst",
            "text/x-rust",
            "text/x-python",
            "text/x-java",
            "text/javascript",
            "application/javascript",
            "text/typescript",
            "text/x-go",
            "text/x-c",
            "text/x-c++",
            "application/x-sh",
            "application/toml",
            "text/css",
            "application/sql",
        ]
    }

    fn supported_extensions(&self) -> &[&str] {
        // One flat table; the split above only matters for the language hint.
        &[
            "txt", "md", "markdown", "rst", "text", "log", "vtt", "srt", "rs", "py", "js", "ts",
            "tsx", "jsx", "java", "go", "c", "cpp", "cc", "h", "hpp", "rb", "php", "swift", "kt",
            "kts", "scala", "clj", "ex", "exs", "erl", "hs", "ml", "mli", "lua", "sh", "bash",
            "zsh", "fish", "sql", "toml", "css", "scss", "vim", "nix", "tf", "hcl", "dockerfile",
            "makefile", "cmake", "gradle", "proto",
        ]
    }

    fn extract(
        &self,
        bytes: &[u8],
        _mime: &str,
        path: &LogicalPath,
    ) -> Result<ExtractedText, ExtractError> {
        let text = normalize_newlines(&String::from_utf8_lossy(bytes));
        let language = path
            .extension()
            .filter(|ext| CODE_EXTENSIONS.contains(&ext.as_str()));
        Ok(ExtractedText { text, language })
    }
}
