//! Azure DevOps Git repositories.
//!
//! The items API lists the full tree in one call; object ids are the
//! version markers. Auth is a PAT over basic auth with an empty user.

use async_trait::async_trait;
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::provider::{Authorization, Provider, RemoteEntry};

pub struct AzureDevopsProvider;

impl AzureDevopsProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for AzureDevopsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ItemsResponse {
    value: Vec<Item>,
}

#[derive(Deserialize)]
struct Item {
    path: String,
    #[serde(rename = "gitObjectType")]
    object_type: String,
    #[serde(rename = "objectId")]
    object_id: String,
    #[serde(default)]
    size: Option<u64>,
}

fn source_parts(source: &SyncSource) -> Result<(&str, &str, &str, &str, &str)> {
    match source {
        SyncSource::AzureDevops {
            organization,
            project,
            repo,
            branch,
            pat,
        } => Ok((organization, project, repo, branch, pat)),
        _ => Err(Error::ProviderFatal("not an azure_devops source".into())),
    }
}

#[async_trait]
impl Provider for AzureDevopsProvider {
    fn name(&self) -> &'static str {
        "azure_devops"
    }

    async fn authorize(&self, source: &SyncSource) -> Result<Authorization> {
        let (.., pat) = source_parts(source)?;
        Ok(Authorization {
            token: Some(pat.to_string()),
            refreshed: None,
        })
    }

    async fn list_remote(
        &self,
        source: &SyncSource,
        auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        let (org, project, repo, branch, _) = source_parts(source)?;
        let url = format!(
            "https://dev.azure.com/{org}/{project}/_apis/git/repositories/{repo}/items?recursionLevel=Full&versionDescriptor.version={branch}&api-version=7.1"
        );
        let pat = auth.token.clone().unwrap_or_default();
        let response: ItemsResponse =
            http::send_json(http::client().get(&url).basic_auth("", Some(&pat)))
                .await
                .map_err(|e| http::with_provider(e, "azure_devops"))?;

        let entries = response
            .value
            .into_iter()
            .filter(|i| i.object_type == "blob")
            .map(|i| {
                let relative = i.path.trim_start_matches('/').to_string();
                RemoteEntry {
                    fetch_ref: format!(
                        "https://dev.azure.com/{org}/{project}/_apis/git/repositories/{repo}/items?path={}&versionDescriptor.version={branch}&download=true&api-version=7.1",
                        i.path
                    ),
                    path: relative,
                    size: i.size,
                    modified_at: None,
                    version: i.object_id,
                }
            })
            .collect();
        Ok(entries)
    }

    async fn fetch(
        &self,
        _source: &SyncSource,
        auth: &Authorization,
        entry: &RemoteEntry,
    ) -> Result<Vec<u8>> {
        let pat = auth.token.clone().unwrap_or_default();
        http::send_bytes(http::client().get(&entry.fetch_ref).basic_auth("", Some(&pat)))
            .await
            .map_err(|e| http::with_provider(e, "azure_devops"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_response_parses_and_filters() {
        let json = r#"{"count":2,"value":[
            {"objectId":"o1","gitObjectType":"blob","path":"/docs/a.md","size":5},
            {"objectId":"o2","gitObjectType":"tree","path":"/docs"}
        ]}"#;
        let parsed: ItemsResponse = serde_json::from_str(json).unwrap();
        let blobs: Vec<&Item> = parsed.value.iter().filter(|i| i.object_type == "blob").collect();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].path, "/docs/a.md");
    }
}
