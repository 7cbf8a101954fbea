//! Confluence spaces: pages materialize as markdown files.
//!
//! Each page becomes `{id}-{slug}.md` under the synced folder: a metadata
//! table (space, authors, version) followed by the page body converted
//! from Confluence storage-format XHTML into markdown. The page version
//! number is the version marker.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::provider::{Authorization, Provider, RemoteEntry};

const PAGE_SIZE: u32 = 50;

pub struct ConfluenceProvider;

impl ConfluenceProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConfluenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ContentPage {
    #[serde(default)]
    results: Vec<Content>,
    #[serde(default)]
    size: u32,
}

#[derive(Deserialize)]
struct Content {
    id: String,
    title: String,
    #[serde(default)]
    version: Option<ContentVersion>,
    #[serde(default)]
    space: Option<SpaceInfo>,
    #[serde(default)]
    history: Option<History>,
    #[serde(default)]
    body: Option<ContentBody>,
}

#[derive(Deserialize)]
struct ContentVersion {
    number: u64,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    by: Option<Person>,
}

#[derive(Deserialize)]
struct SpaceInfo {
    #[serde(default)]
    key: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct History {
    #[serde(default, rename = "createdBy")]
    created_by: Option<Person>,
    #[serde(default, rename = "createdDate")]
    created_date: Option<String>,
}

#[derive(Deserialize)]
struct Person {
    #[serde(default, rename = "displayName")]
    display_name: String,
}

#[derive(Deserialize)]
struct ContentBody {
    #[serde(default)]
    storage: Option<StorageBody>,
}

#[derive(Deserialize)]
struct StorageBody {
    #[serde(default)]
    value: String,
}

fn source_parts(source: &SyncSource) -> Result<(&str, &str, &str, &str)> {
    match source {
        SyncSource::Confluence {
            base_url,
            space_key,
            email,
            api_token,
        } => Ok((base_url, space_key, email, api_token)),
        _ => Err(Error::ProviderFatal("not a confluence source".into())),
    }
}

/// Page title reduced to a filesystem-safe slug.
fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn sub(text: String, pattern: &str, replacement: &str) -> String {
    Regex::new(pattern)
        .expect("static pattern")
        .replace_all(&text, replacement)
        .into_owned()
}

/// Convert Confluence storage-format XHTML to markdown.
pub fn storage_to_markdown(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let mut text = html.to_string();

    // Headers
    for i in (1..=6).rev() {
        text = sub(
            text,
            &format!(r"(?s)<h{i}[^>]*>(.*?)</h{i}>"),
            &format!("{} $1\n", "#".repeat(i)),
        );
    }

    // Line breaks and paragraphs
    text = sub(text, r"<br\s*/?>", "\n");
    text = sub(text, r"</?p[^>]*>", "\n");

    // Bold and italic
    text = sub(text, r"(?s)<strong[^>]*>(.*?)</strong>", "**$1**");
    text = sub(text, r"(?s)<b[^>]*>(.*?)</b>", "**$1**");
    text = sub(text, r"(?s)<em[^>]*>(.*?)</em>", "*$1*");
    text = sub(text, r"(?s)<i[^>]*>(.*?)</i>", "*$1*");

    // Links
    text = sub(text, r#"(?s)<a[^>]+href="([^"]*)"[^>]*>(.*?)</a>"#, "[$2]($1)");

    // Lists
    text = sub(text, r"(?s)<li[^>]*>(.*?)</li>", "- $1\n");
    text = sub(text, r"</?[ou]l[^>]*>", "\n");

    // Code blocks (Confluence wraps code in a structured macro)
    text = sub(
        text,
        r#"(?s)<ac:structured-macro[^>]*ac:name="code"[^>]*>.*?<ac:plain-text-body><!\[CDATA\[(.*?)\]\]></ac:plain-text-body>.*?</ac:structured-macro>"#,
        "```\n$1\n```\n",
    );

    // Inline code
    text = sub(text, r"(?s)<code[^>]*>(.*?)</code>", "`$1`");

    // Tables, simplified
    text = sub(text, r"<table[^>]*>", "\n");
    text = sub(text, r"</table>", "\n");
    text = sub(text, r"<tr[^>]*>", "");
    text = sub(text, r"</tr>", " |\n");
    text = sub(text, r"(?s)<t[hd][^>]*>(.*?)</t[hd]>", "| $1 ");

    // Divs and spans
    text = sub(text, r"</?div[^>]*>", "\n");
    text = sub(text, r"</?span[^>]*>", "");

    // Remaining Confluence macros: drop
    text = sub(text, r"(?s)<ac:structured-macro[^>]*>.*?</ac:structured-macro>", "");
    text = sub(text, r"<ac:[^>]+/>", "");
    text = sub(text, r"(?s)<ac:[^>]+>.*?</ac:[^>]+>", "");
    text = sub(text, r"<ri:[^>]+/>", "");

    // Strip whatever tags are left
    text = sub(text, r"<[^>]+>", "");

    // Whitespace cleanup
    text = sub(text, r"\n{3,}", "\n\n");
    text = sub(text, r"[ \t]+", " ");

    // Entities
    text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");

    text.trim().to_string()
}

/// Render a page as a structured markdown document: title, metadata
/// table, converted body.
fn render_page_md(content: &Content) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# {}\n", content.title));

    lines.push("| Field | Value |".to_string());
    lines.push("|---|---|".to_string());
    if let Some(space) = &content.space {
        lines.push(format!("| Space | {} ({}) |", space.name, space.key));
    }
    if let Some(history) = &content.history {
        if let Some(by) = &history.created_by {
            lines.push(format!("| Created By | {} |", by.display_name));
        }
        if let Some(date) = &history.created_date {
            lines.push(format!("| Created | {} |", date.chars().take(10).collect::<String>()));
        }
    }
    if let Some(version) = &content.version {
        if let Some(by) = &version.by {
            lines.push(format!("| Updated By | {} |", by.display_name));
        }
        if let Some(when) = &version.when {
            lines.push(format!("| Updated | {} |", when.chars().take(10).collect::<String>()));
        }
        lines.push(format!("| Version | {} |", version.number));
    }
    lines.push(String::new());

    let body = content
        .body
        .as_ref()
        .and_then(|b| b.storage.as_ref())
        .map(|s| s.value.as_str())
        .unwrap_or("");
    if !body.is_empty() {
        lines.push("## Content\n".to_string());
        lines.push(storage_to_markdown(body));
        lines.push(String::new());
    }

    lines.join("\n")
}

#[async_trait]
impl Provider for ConfluenceProvider {
    fn name(&self) -> &'static str {
        "confluence"
    }

    async fn authorize(&self, source: &SyncSource) -> Result<Authorization> {
        let (_, _, _, api_token) = source_parts(source)?;
        Ok(Authorization {
            token: Some(api_token.to_string()),
            refreshed: None,
        })
    }

    async fn list_remote(
        &self,
        source: &SyncSource,
        _auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        let (base_url, space_key, email, api_token) = source_parts(source)?;
        let mut entries = Vec::new();
        let mut start = 0u32;

        loop {
            let url = format!("{}/rest/api/content", base_url.trim_end_matches('/'));
            let page: ContentPage = http::send_json(
                http::client()
                    .get(&url)
                    .basic_auth(email, Some(api_token))
                    .query(&[
                        ("spaceKey", space_key.to_string()),
                        ("type", "page".to_string()),
                        ("expand", "version".to_string()),
                        ("limit", PAGE_SIZE.to_string()),
                        ("start", start.to_string()),
                    ]),
            )
            .await
            .map_err(|e| http::with_provider(e, "confluence"))?;

            let fetched = page.size.max(page.results.len() as u32);
            for content in page.results {
                let version = content.version.as_ref().map(|v| v.number).unwrap_or(0);
                entries.push(RemoteEntry {
                    path: format!("{}-{}.md", content.id, slug(&content.title)),
                    size: None,
                    modified_at: None,
                    version: version.to_string(),
                    fetch_ref: content.id,
                });
            }

            if fetched < PAGE_SIZE {
                break;
            }
            start += fetched;
        }
        Ok(entries)
    }

    async fn fetch(
        &self,
        source: &SyncSource,
        _auth: &Authorization,
        entry: &RemoteEntry,
    ) -> Result<Vec<u8>> {
        let (base_url, _, email, api_token) = source_parts(source)?;
        let url = format!(
            "{}/rest/api/content/{}",
            base_url.trim_end_matches('/'),
            entry.fetch_ref
        );
        let content: Content = http::send_json(
            http::client()
                .get(&url)
                .basic_auth(email, Some(api_token))
                .query(&[("expand", "body.storage,version,space,history")]),
        )
        .await
        .map_err(|e| http::with_provider(e, "confluence"))?;

        Ok(render_page_md(&content).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_safe_and_stable() {
        assert_eq!(slug("Release Notes (Q3/2025)!"), "release-notes-q3-2025");
        assert_eq!(slug("  weird   spacing "), "weird-spacing");
        assert_eq!(slug("日本語 page"), "日本語-page");
    }

    #[test]
    fn content_page_parses() {
        let json = r#"{"results":[
            {"id":"123","title":"Home","version":{"number":7}}
        ],"size":1}"#;
        let parsed: ContentPage = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results[0].version.as_ref().unwrap().number, 7);
    }

    #[test]
    fn markdown_headers_and_emphasis() {
        let md = storage_to_markdown("<h1>Title</h1><p><strong>bold</strong> and <em>soft</em></p>");
        assert!(md.starts_with("# Title"));
        assert!(md.contains("**bold**"));
        assert!(md.contains("*soft*"));
    }

    #[test]
    fn markdown_links_and_lists() {
        let md = storage_to_markdown(
            r#"<ul><li>first</li><li><a href="https://x.test/doc">a doc</a></li></ul>"#,
        );
        assert!(md.contains("- first"));
        assert!(md.contains("- [a doc](https://x.test/doc)"));
    }

    #[test]
    fn markdown_code_macro_becomes_fence() {
        let md = storage_to_markdown(
            r#"<ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[let x = 1;]]></ac:plain-text-body></ac:structured-macro>"#,
        );
        assert!(md.contains("```\nlet x = 1;\n```"));
    }

    #[test]
    fn markdown_drops_other_macros_and_tags() {
        let md = storage_to_markdown(
            r#"<p>kept</p><ac:structured-macro ac:name="toc"><ac:parameter>x</ac:parameter></ac:structured-macro><ri:page ri:content-title="x"/>"#,
        );
        assert_eq!(md, "kept");
    }

    #[test]
    fn markdown_decodes_entities() {
        let md = storage_to_markdown("<p>a &amp; b &lt;c&gt; &quot;d&quot;&nbsp;e</p>");
        assert_eq!(md, "a & b <c> \"d\" e");
    }

    #[test]
    fn page_renders_with_metadata_table() {
        let json = r#"{
            "id":"123","title":"Runbook",
            "version":{"number":7,"when":"2025-04-01T09:30:00.000Z","by":{"displayName":"Dana"}},
            "space":{"key":"OPS","name":"Operations"},
            "history":{"createdBy":{"displayName":"Sam"},"createdDate":"2024-11-20T08:00:00.000Z"},
            "body":{"storage":{"value":"<h2>Steps</h2><p>Do the thing.</p>"}}
        }"#;
        let content: Content = serde_json::from_str(json).unwrap();
        let md = render_page_md(&content);

        assert!(md.starts_with("# Runbook\n"));
        assert!(md.contains("| Space | Operations (OPS) |"));
        assert!(md.contains("| Created By | Sam |"));
        assert!(md.contains("| Created | 2024-11-20 |"));
        assert!(md.contains("| Updated By | Dana |"));
        assert!(md.contains("| Updated | 2025-04-01 |"));
        assert!(md.contains("| Version | 7 |"));
        assert!(md.contains("## Content"));
        assert!(md.contains("## Steps"));
        assert!(md.contains("Do the thing."));
    }

    #[test]
    fn listing_paths_are_markdown() {
        // The materialized path shape the engine writes to disk.
        assert_eq!(format!("{}-{}.md", "123", slug("Team Home")), "123-team-home.md");
    }
}
