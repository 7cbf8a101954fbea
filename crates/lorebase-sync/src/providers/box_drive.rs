//! Box folders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::oauth;
use crate::provider::{Authorization, Provider, RemoteEntry};

const TOKEN_URL: &str = "https://api.box.com/oauth2/token";
const API: &str = "https://api.box.com/2.0";

pub struct BoxProvider;

impl BoxProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for BoxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ItemPage {
    #[serde(default)]
    entries: Vec<BoxItem>,
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    limit: u64,
}

#[derive(Deserialize)]
struct BoxItem {
    id: String,
    name: String,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    sha1: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
}

fn folder_id(source: &SyncSource) -> Result<&str> {
    match source {
        SyncSource::Box { folder_id, .. } => Ok(folder_id),
        _ => Err(Error::ProviderFatal("not a box source".into())),
    }
}

#[async_trait]
impl Provider for BoxProvider {
    fn name(&self) -> &'static str {
        "box"
    }

    async fn authorize(&self, source: &SyncSource) -> Result<Authorization> {
        let cred = source
            .oauth()
            .ok_or_else(|| Error::ProviderFatal("box source without oauth".into()))?;
        oauth::authorize("box", TOKEN_URL, cred).await
    }

    async fn list_remote(
        &self,
        source: &SyncSource,
        auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        let root = folder_id(source)?;
        let token = auth.token.clone().unwrap_or_default();
        let mut entries = Vec::new();
        let mut queue = vec![(root.to_string(), String::new())];

        while let Some((id, prefix)) = queue.pop() {
            let mut offset = 0u64;
            loop {
                let url = format!(
                    "{API}/folders/{id}/items?fields=id,name,type,sha1,size,modified_at&limit=1000&offset={offset}"
                );
                let page: ItemPage = http::send_json(http::client().get(&url).bearer_auth(&token))
                    .await
                    .map_err(|e| http::with_provider(e, "box"))?;

                let fetched = page.entries.len() as u64;
                for item in page.entries {
                    let path = if prefix.is_empty() {
                        item.name.clone()
                    } else {
                        format!("{prefix}/{}", item.name)
                    };
                    match item.item_type.as_str() {
                        "folder" => queue.push((item.id, path)),
                        "file" => entries.push(RemoteEntry {
                            version: item.sha1.clone().unwrap_or_else(|| item.id.clone()),
                            fetch_ref: format!("{API}/files/{}/content", item.id),
                            path,
                            size: item.size,
                            modified_at: item
                                .modified_at
                                .as_deref()
                                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                                .map(|t| t.with_timezone(&Utc)),
                        }),
                        _ => {}
                    }
                }

                offset += page.limit.max(fetched).max(1);
                if offset >= page.total_count || fetched == 0 {
                    break;
                }
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
            .map_err(|e| http::with_provider(e, "box"))
    }
}
