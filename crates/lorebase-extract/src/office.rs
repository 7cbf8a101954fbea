//! Office documents: zipped XML flattened to text.
//!
//! docx paragraphs, pptx slides, xlsx rows, and ODF content all reduce to
//! lines of text with blank-line soft breaks between the units a reader
//! would consider separate (paragraphs, slides, sheets).

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use std::io::{Cursor, Read};

use lorebase_core::{ExtractError, ExtractedText, LogicalPath};

use crate::registry::Extractor;

/// Extractor for docx, pptx, xlsx and their OpenDocument equivalents.
pub struct OfficeExtractor;

impl OfficeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for OfficeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Parse(format!("not a valid office container: {e}")))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<String, ExtractError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Parse(format!("missing {name}: {e}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Parse(format!("reading {name}: {e}")))?;
    Ok(xml)
}

impl Extractor for OfficeExtractor {
    fn supported_mimes(&self) -> &[&str] {
        &[
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.oasis.opendocument.text",
            "application/vnd.oasis.opendocument.presentation",
            "application/vnd.oasis.opendocument.spreadsheet",
        ]
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx", "pptx", "xlsx", "odt", "odp", "ods"]
    }

    fn extract(
        &self,
        bytes: &[u8],
        _mime: &str,
        path: &LogicalPath,
    ) -> Result<ExtractedText, ExtractError> {
        let text = match path.extension().unwrap_or_default().as_str() {
            "docx" => extract_docx(bytes)?,
            "pptx" => extract_pptx(bytes)?,
            "xlsx" => extract_xlsx(bytes)?,
            "odt" | "odp" | "ods" => extract_odf(bytes)?,
            other => return Err(ExtractError::UnsupportedType(other.to_string())),
        };
        Ok(ExtractedText {
            text,
            language: None,
        })
    }
}

fn xml_err<E: std::fmt::Display>(e: E) -> ExtractError {
    ExtractError::Parse(format!("xml: {e}"))
}

/// Paragraph text from `word/document.xml` (`w:t` runs, `w:p` breaks).
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            XmlEvent::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            XmlEvent::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            XmlEvent::End(e) if e.name().as_ref() == b"w:p" => {
                if !current.trim().is_empty() {
                    paragraphs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            XmlEvent::Empty(e) if e.name().as_ref() == b"w:br" => current.push('\n'),
            XmlEvent::Empty(e) if e.name().as_ref() == b"w:tab" => current.push(' '),
            XmlEvent::Text(t) if in_text => {
                current.push_str(&t.unescape().map_err(xml_err)?);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n\n"))
}

/// Slide text from `ppt/slides/slideN.xml`, slides separated by soft breaks.
fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    slide_names.sort_by_key(|n| slide_number(n));

    let mut slides = Vec::new();
    for name in slide_names {
        let xml = read_entry(&mut archive, &name)?;
        let mut reader = Reader::from_str(&xml);
        let mut slide = String::new();
        let mut in_text = false;
        loop {
            match reader.read_event().map_err(xml_err)? {
                XmlEvent::Start(e) if e.name().as_ref() == b"a:t" => in_text = true,
                XmlEvent::End(e) if e.name().as_ref() == b"a:t" => in_text = false,
                XmlEvent::End(e) if e.name().as_ref() == b"a:p" => slide.push('\n'),
                XmlEvent::Text(t) if in_text => {
                    slide.push_str(&t.unescape().map_err(xml_err)?);
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        let slide = slide.trim().to_string();
        if !slide.is_empty() {
            slides.push(slide);
        }
    }
    Ok(slides.join("\n\n"))
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

/// Row text from worksheet XML, resolving shared strings.
fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => parse_shared_strings(&xml)?,
        Err(_) => Vec::new(), // workbooks without string cells have no table
    };

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    sheet_names.sort();

    let mut sheets = Vec::new();
    for name in sheet_names {
        let xml = read_entry(&mut archive, &name)?;
        let sheet = parse_sheet(&xml, &shared)?;
        if !sheet.is_empty() {
            sheets.push(sheet);
        }
    }
    Ok(sheets.join("\n\n"))
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    loop {
        match reader.read_event().map_err(xml_err)? {
            XmlEvent::Start(e) if e.name().as_ref() == b"si" => {
                in_si = true;
                current.clear();
            }
            XmlEvent::End(e) if e.name().as_ref() == b"si" => {
                in_si = false;
                strings.push(std::mem::take(&mut current));
            }
            XmlEvent::Start(e) if e.name().as_ref() == b"t" => in_t = true,
            XmlEvent::End(e) if e.name().as_ref() == b"t" => in_t = false,
            XmlEvent::Text(t) if in_si && in_t => {
                current.push_str(&t.unescape().map_err(xml_err)?);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<String> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_is_shared = false;
    let mut in_value = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            XmlEvent::Start(e) if e.name().as_ref() == b"c" => {
                cell_is_shared = e
                    .try_get_attribute("t")
                    .map_err(xml_err)?
                    .map(|a| a.value.as_ref() == b"s")
                    .unwrap_or(false);
            }
            XmlEvent::Start(e) if e.name().as_ref() == b"v" || e.name().as_ref() == b"t" => {
                in_value = true;
            }
            XmlEvent::End(e) if e.name().as_ref() == b"v" || e.name().as_ref() == b"t" => {
                in_value = false;
            }
            XmlEvent::Text(t) if in_value => {
                let raw = t.unescape().map_err(xml_err)?.to_string();
                let value = if cell_is_shared {
                    raw.parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or(raw)
                } else {
                    raw
                };
                cells.push(value);
            }
            XmlEvent::End(e) if e.name().as_ref() == b"row" => {
                if !cells.is_empty() {
                    rows.push(cells.join(", "));
                    cells.clear();
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    Ok(rows.join("\n"))
}

/// OpenDocument `content.xml`: paragraph and heading text.
fn extract_odf(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "content.xml")?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event().map_err(xml_err)? {
            XmlEvent::Start(e)
                if e.name().as_ref() == b"text:p" || e.name().as_ref() == b"text:h" =>
            {
                depth += 1;
            }
            XmlEvent::End(e)
                if e.name().as_ref() == b"text:p" || e.name().as_ref() == b"text:h" =>
            {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
            }
            XmlEvent::Text(t) if depth > 0 => {
                current.push_str(&t.unescape().map_err(xml_err)?);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn path(s: &str) -> LogicalPath {
        LogicalPath::parse(s).unwrap()
    }

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (name, content) in entries {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn docx_paragraphs_flattened() {
        let doc = build_zip(&[(
            "word/document.xml",
            r#"<?xml version="1.0"?>
            <w:document xmlns:w="ns">
              <w:body>
                <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
              </w:body>
            </w:document>"#,
        )]);
        let out = OfficeExtractor::new()
            .extract(&doc, "application/octet-stream", &path("doc.docx"))
            .unwrap();
        assert_eq!(out.text, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn pptx_slides_in_order() {
        let doc = build_zip(&[
            (
                "ppt/slides/slide2.xml",
                r#"<p:sld xmlns:a="ns"><a:p><a:r><a:t>Slide two</a:t></a:r></a:p></p:sld>"#,
            ),
            (
                "ppt/slides/slide1.xml",
                r#"<p:sld xmlns:a="ns"><a:p><a:r><a:t>Slide one</a:t></a:r></a:p></p:sld>"#,
            ),
        ]);
        let out = OfficeExtractor::new()
            .extract(&doc, "application/octet-stream", &path("deck.pptx"))
            .unwrap();
        assert_eq!(out.text, "Slide one\n\nSlide two");
    }

    #[test]
    fn xlsx_shared_strings_resolved() {
        let doc = build_zip(&[
            (
                "xl/sharedStrings.xml",
                r#"<sst><si><t>name</t></si><si><t>alice</t></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData>
                    <row><c t="s"><v>0</v></c><c><v>30</v></c></row>
                    <row><c t="s"><v>1</v></c><c><v>41</v></c></row>
                </sheetData></worksheet>"#,
            ),
        ]);
        let out = OfficeExtractor::new()
            .extract(&doc, "application/octet-stream", &path("book.xlsx"))
            .unwrap();
        assert_eq!(out.text, "name, 30\nalice, 41");
    }

    #[test]
    fn odt_content_paragraphs() {
        let doc = build_zip(&[(
            "content.xml",
            r#"<office:document-content xmlns:text="ns">
                <office:body><office:text>
                    <text:h>Heading</text:h>
                    <text:p>Body text.</text:p>
                </office:text></office:body>
            </office:document-content>"#,
        )]);
        let out = OfficeExtractor::new()
            .extract(&doc, "application/octet-stream", &path("doc.odt"))
            .unwrap();
        assert_eq!(out.text, "Heading\n\nBody text.");
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = OfficeExtractor::new()
            .extract(b"not a zip at all", "application/octet-stream", &path("doc.docx"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }
}
