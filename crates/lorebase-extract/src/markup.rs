//! HTML and XML: tags stripped, entities decoded.

use lorebase_core::{ExtractError, ExtractedText, LogicalPath};

use crate::registry::{normalize_newlines, Extractor};

/// Elements whose entire content is dropped.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "noscript"];

/// Elements that terminate a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
    "blockquote", "pre", "table",
];

/// Markup extractor: produces the visible text of an HTML/XML document.
pub struct MarkupExtractor;

impl MarkupExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for MarkupExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for MarkupExtractor {
    fn supported_mimes(&self) -> &[&str] {
        &["text/html", "application/xhtml+xml", "text/xml", "application/xml"]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["html", "htm", "xhtml", "xml", "svg"]
    }

    fn extract(
        &self,
        bytes: &[u8],
        _mime: &str,
        _path: &LogicalPath,
    ) -> Result<ExtractedText, ExtractError> {
        let raw = String::from_utf8_lossy(bytes);
        Ok(ExtractedText {
            text: strip_tags(&normalize_newlines(&raw)),
            language: None,
        })
    }
}

/// Strip tags with a small state machine.
///
/// `<script>`/`<style>` bodies are dropped, block-level closers become
/// newlines, runs of blank lines collapse to one (the soft break).
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len() / 2);
    let mut rest = input;
    let mut skip_until: Option<String> = None;

    while let Some(lt) = rest.find('<') {
        let (text, tail) = rest.split_at(lt);
        if skip_until.is_none() {
            out.push_str(text);
        }
        let tail = &tail[1..];
        let Some(gt) = tail.find('>') else {
            // Truncated tag; drop the tail
            rest = "";
            break;
        };
        let tag_body = &tail[..gt];
        rest = &tail[gt + 1..];

        // Comments and doctypes
        if tag_body.starts_with('!') {
            continue;
        }

        let closing = tag_body.starts_with('/');
        let name: String = tag_body
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if let Some(waiting) = &skip_until {
            if closing && &name == waiting {
                skip_until = None;
            }
            continue;
        }

        if !closing && SKIPPED_ELEMENTS.contains(&name.as_str()) && !tag_body.ends_with('/') {
            skip_until = Some(name);
            continue;
        }

        if BLOCK_ELEMENTS.contains(&name.as_str()) {
            out.push('\n');
        }
    }

    if skip_until.is_none() {
        out.push_str(rest);
    }

    collapse_blank_lines(&decode_entities(&out))
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_blank_lines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut blank_run = 0usize;
    for line in input.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> LogicalPath {
        LogicalPath::parse("page.html").unwrap()
    }

    #[test]
    fn strips_tags_keeps_text() {
        let html = b"<html><body><p>Hello <b>world</b></p></body></html>";
        let out = MarkupExtractor::new().extract(html, "text/html", &path()).unwrap();
        assert_eq!(out.text, "Hello world");
    }

    #[test]
    fn script_and_style_dropped() {
        let html = b"<p>visible</p><script>var x = 'hidden';</script><style>p{}</style><p>also</p>";
        let out = MarkupExtractor::new().extract(html, "text/html", &path()).unwrap();
        assert!(out.text.contains("visible"));
        assert!(out.text.contains("also"));
        assert!(!out.text.contains("hidden"));
        assert!(!out.text.contains("p{}"));
    }

    #[test]
    fn block_elements_break_lines() {
        let html = b"<h1>Title</h1><p>First</p><p>Second</p>";
        let out = MarkupExtractor::new().extract(html, "text/html", &path()).unwrap();
        let lines: Vec<&str> = out.text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Title", "First", "Second"]);
    }

    #[test]
    fn entities_decoded() {
        let html = b"<p>a &amp; b &lt;c&gt; &quot;d&quot;</p>";
        let out = MarkupExtractor::new().extract(html, "text/html", &path()).unwrap();
        assert_eq!(out.text, "a & b <c> \"d\"");
    }

    #[test]
    fn comments_ignored() {
        let html = b"<!-- note --><p>kept</p><!DOCTYPE html>";
        let out = MarkupExtractor::new().extract(html, "text/html", &path()).unwrap();
        assert_eq!(out.text, "kept");
    }

    #[test]
    fn strip_is_deterministic() {
        let html = "<div><p>one</p><p>two</p></div>";
        assert_eq!(strip_tags(html), strip_tags(html));
    }
}
