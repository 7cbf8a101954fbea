//! SharePoint document libraries over Microsoft Graph.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::oauth;
use crate::provider::{Authorization, Provider, RemoteEntry};

const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const GRAPH: &str = "https://graph.microsoft.com/v1.0";

pub struct SharepointProvider;

impl SharepointProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SharepointProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct DriveChildren {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(default, rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default, rename = "eTag")]
    etag: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, rename = "lastModifiedDateTime")]
    last_modified: Option<String>,
    #[serde(default)]
    folder: Option<serde_json::Value>,
    #[serde(default)]
    file: Option<serde_json::Value>,
}

fn source_parts(source: &SyncSource) -> Result<(&str, &str, &str)> {
    match source {
        SyncSource::Sharepoint {
            site_id,
            drive_id,
            folder_path,
            ..
        } => Ok((site_id, drive_id, folder_path)),
        _ => Err(Error::ProviderFatal("not a sharepoint source".into())),
    }
}

#[async_trait]
impl Provider for SharepointProvider {
    fn name(&self) -> &'static str {
        "sharepoint"
    }

    async fn authorize(&self, source: &SyncSource) -> Result<Authorization> {
        let cred = source
            .oauth()
            .ok_or_else(|| Error::ProviderFatal("sharepoint source without oauth".into()))?;
        oauth::authorize("sharepoint", TOKEN_URL, cred).await
    }

    async fn list_remote(
        &self,
        source: &SyncSource,
        auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        let (site_id, drive_id, folder_path) = source_parts(source)?;
        let token = auth.token.clone().unwrap_or_default();

        let root_url = if folder_path.trim_matches('/').is_empty() {
            format!("{GRAPH}/sites/{site_id}/drives/{drive_id}/root/children")
        } else {
            format!(
                "{GRAPH}/sites/{site_id}/drives/{drive_id}/root:/{}:/children",
                folder_path.trim_matches('/')
            )
        };

        let mut entries = Vec::new();
        let mut queue = vec![(root_url, String::new())];

        while let Some((start_url, prefix)) = queue.pop() {
            let mut url = Some(start_url);
            while let Some(current) = url.take() {
                let page: DriveChildren =
                    http::send_json(http::client().get(&current).bearer_auth(&token))
                        .await
                        .map_err(|e| http::with_provider(e, "sharepoint"))?;

                for item in page.value {
                    let path = if prefix.is_empty() {
                        item.name.clone()
                    } else {
                        format!("{prefix}/{}", item.name)
                    };
                    if item.folder.is_some() {
                        queue.push((
                            format!(
                                "{GRAPH}/sites/{site_id}/drives/{drive_id}/items/{}/children",
                                item.id
                            ),
                            path,
                        ));
                    } else if item.file.is_some() {
                        entries.push(RemoteEntry {
                            version: item.etag.clone().unwrap_or_else(|| item.id.clone()),
                            fetch_ref: format!(
                                "{GRAPH}/sites/{site_id}/drives/{drive_id}/items/{}/content",
                                item.id
                            ),
                            path,
                            size: item.size,
                            modified_at: item
                                .last_modified
                                .as_deref()
                                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                                .map(|t| t.with_timezone(&Utc)),
                        });
                    }
                }
                url = page.next_link;
            }
        }
        Ok(entries)
    }

    async fn fetch(
        &self,
        _source: &SyncSource,
        auth: &Authorization,
        entry: &RemoteEntry,
    ) -> Result<Vec<u8>> {
        let token = auth.token.clone().unwrap_or_default();
        http::send_bytes(http::client().get(&entry.fetch_ref).bearer_auth(&token))
            .await
            .map_err(|e| http::with_provider(e, "sharepoint"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_page_parses() {
        let json = r#"{"value":[
            {"id":"i1","name":"a.docx","eTag":"\"e1\"","size":100,"file":{},"lastModifiedDateTime":"2025-01-02T03:04:05Z"},
            {"id":"i2","name":"sub","folder":{"childCount":3}}
        ]}"#;
        let parsed: DriveChildren = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.value.len(), 2);
        assert!(parsed.value[0].file.is_some());
        assert!(parsed.value[1].folder.is_some());
    }
}
