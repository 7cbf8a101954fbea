//! Structured data: JSON, YAML, CSV serialized back to stable text.

use lorebase_core::{ExtractError, ExtractedText, LogicalPath};

use crate::registry::{normalize_newlines, Extractor};

/// Structured-data extractor.
///
/// Content is parsed and re-serialized so equivalent inputs produce
/// identical text (JSON keys come back sorted; CSV quoting is normalized).
pub struct StructuredExtractor;

impl StructuredExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn extract_json(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| ExtractError::Parse(format!("json: {e}")))?;
        serde_json::to_string_pretty(&value)
            .map_err(|e| ExtractError::Failed(format!("json reserialize: {e}")))
    }

    fn extract_yaml(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let value: serde_yaml::Value = serde_yaml::from_slice(bytes)
            .map_err(|e| ExtractError::Parse(format!("yaml: {e}")))?;
        serde_yaml::to_string(&value)
            .map_err(|e| ExtractError::Failed(format!("yaml reserialize: {e}")))
    }

    fn extract_csv(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut lines = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ExtractError::Parse(format!("csv: {e}")))?;
            lines.push(record.iter().collect::<Vec<_>>().join(", "));
        }
        Ok(lines.join("\n"))
    }
}

impl Default for StructuredExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for StructuredExtractor {
    fn supported_mimes(&self) -> &[&str] {
        &[
            "application/json",
            "application/yaml",
            "text/x-yaml",
            "text/yaml",
            "text/csv",
            "application/csv",
        ]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["json", "yaml", "yml", "csv", "tsv"]
    }

    fn extract(
        &self,
        bytes: &[u8],
        mime: &str,
        path: &LogicalPath,
    ) -> Result<ExtractedText, ExtractError> {
        let ext = path.extension().unwrap_or_default();
        let text = if mime.contains("json") || ext == "json" {
            self.extract_json(bytes)?
        } else if mime.contains("yaml") || ext == "yaml" || ext == "yml" {
            self.extract_yaml(bytes)?
        } else {
            self.extract_csv(bytes)?
        };
        Ok(ExtractedText {
            text: normalize_newlines(&text),
            language: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> LogicalPath {
        LogicalPath::parse(s).unwrap()
    }

    #[test]
    fn json_keys_come_back_sorted() {
        let input = br#"{"zebra": 1, "alpha": {"y": true, "b": null}}"#;
        let out = StructuredExtractor::new()
            .extract(input, "application/json", &path("a.json"))
            .unwrap();
        let alpha = out.text.find("\"alpha\"").unwrap();
        let zebra = out.text.find("\"zebra\"").unwrap();
        assert!(alpha < zebra);

        // Stable: shuffled input serializes identically.
        let shuffled = br#"{"alpha": {"b": null, "y": true}, "zebra": 1}"#;
        let out2 = StructuredExtractor::new()
            .extract(shuffled, "application/json", &path("a.json"))
            .unwrap();
        assert_eq!(out.text, out2.text);
    }

    #[test]
    fn bad_json_is_parse_error() {
        let err = StructuredExtractor::new()
            .extract(b"{broken", "application/json", &path("a.json"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn yaml_round_trips() {
        let input = b"name: test\nitems:\n  - one\n  - two\n";
        let out = StructuredExtractor::new()
            .extract(input, "application/yaml", &path("a.yaml"))
            .unwrap();
        assert!(out.text.contains("name: test"));
        assert!(out.text.contains("- one"));
    }

    #[test]
    fn csv_rows_flattened() {
        let input = b"name,age\nalice,30\nbob,41\n";
        let out = StructuredExtractor::new()
            .extract(input, "text/csv", &path("a.csv"))
            .unwrap();
        assert_eq!(out.text, "name, age\nalice, 30\nbob, 41");
    }

    #[test]
    fn dispatch_by_extension_when_mime_generic() {
        let out = StructuredExtractor::new()
            .extract(b"[1, 2]", "application/octet-stream", &path("a.json"))
            .unwrap();
        assert!(out.text.starts_with('['));
    }
}
