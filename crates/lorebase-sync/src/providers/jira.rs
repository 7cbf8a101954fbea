//! Jira projects: issues materialize as markdown files.
//!
//! Each issue becomes `{KEY}.md` under the synced folder; the issue's
//! `updated` timestamp is the version marker, so only edited issues are
//! re-fetched.

use async_trait::async_trait;
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::provider::{Authorization, Provider, RemoteEntry};

const PAGE_SIZE: u32 = 100;

pub struct JiraProvider;

impl JiraProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for JiraProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    total: u32,
    #[serde(default, rename = "startAt")]
    start_at: u32,
}

#[derive(Deserialize)]
struct Issue {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

fn source_parts(source: &SyncSource) -> Result<(&str, &str, &str, &str)> {
    match source {
        SyncSource::Jira {
            base_url,
            project_key,
            email,
            api_token,
        } => Ok((base_url, project_key, email, api_token)),
        _ => Err(Error::ProviderFatal("not a jira source".into())),
    }
}

/// Render an issue to the markdown stored on disk.
fn issue_markdown(key: &str, fields: &IssueFields) -> String {
    let summary = fields.summary.as_deref().unwrap_or("(no summary)");
    let description = fields.description.as_deref().unwrap_or("");
    format!("# {key}: {summary}\n\n{description}\n")
}

#[async_trait]
impl Provider for JiraProvider {
    fn name(&self) -> &'static str {
        "jira"
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
        let (base_url, project_key, email, api_token) = source_parts(source)?;
        let mut entries = Vec::new();
        let mut start_at = 0u32;

        loop {
            let url = format!("{}/rest/api/2/search", base_url.trim_end_matches('/'));
            let response: SearchResponse = http::send_json(
                http::client()
                    .get(&url)
                    .basic_auth(email, Some(api_token))
                    .query(&[
                        ("jql", format!("project = {project_key} ORDER BY key ASC")),
                        ("fields", "summary,updated".to_string()),
                        ("maxResults", PAGE_SIZE.to_string()),
                        ("startAt", start_at.to_string()),
                    ]),
            )
            .await
            .map_err(|e| http::with_provider(e, "jira"))?;

            let fetched = response.issues.len() as u32;
            for issue in response.issues {
                entries.push(RemoteEntry {
                    path: format!("{}.md", issue.key),
                    size: None,
                    modified_at: None,
                    version: issue.fields.updated.clone().unwrap_or_default(),
                    fetch_ref: issue.key,
                });
            }

            start_at = response.start_at + fetched;
            if start_at >= response.total || fetched == 0 {
                break;
            }
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
            "{}/rest/api/2/issue/{}",
            base_url.trim_end_matches('/'),
            entry.fetch_ref
        );
        let issue: Issue = http::send_json(
            http::client()
                .get(&url)
                .basic_auth(email, Some(api_token))
                .query(&[("fields", "summary,description,updated")]),
        )
        .await
        .map_err(|e| http::with_provider(e, "jira"))?;

        Ok(issue_markdown(&issue.key, &issue.fields).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_parses() {
        let json = r#"{"startAt":0,"maxResults":100,"total":1,"issues":[
            {"key":"KB-1","fields":{"summary":"Fix the widget","updated":"2025-03-01T10:00:00.000+0000"}}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.issues[0].key, "KB-1");
        assert_eq!(parsed.total, 1);
    }

    #[test]
    fn issue_renders_to_markdown() {
        let fields = IssueFields {
            summary: Some("Fix the widget".into()),
            description: Some("Steps to reproduce:\n1. open app".into()),
            updated: None,
        };
        let md = issue_markdown("KB-1", &fields);
        assert!(md.starts_with("# KB-1: Fix the widget\n"));
        assert!(md.contains("Steps to reproduce"));
    }
}
