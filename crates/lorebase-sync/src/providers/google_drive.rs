//! Google Drive folders.
//!
//! Breadth-first walk over the files API; md5 checksums are the version
//! markers. Google-native documents (Docs/Sheets/Slides) have no binary
//! content and are skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::oauth;
use crate::provider::{Authorization, Provider, RemoteEntry};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

pub struct GoogleDriveProvider;

impl GoogleDriveProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GoogleDriveProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default, rename = "md5Checksum")]
    md5: Option<String>,
    #[serde(default, rename = "modifiedTime")]
    modified_time: Option<String>,
}

fn folder_id(source: &SyncSource) -> Result<&str> {
    match source {
        SyncSource::GoogleDrive { folder_id, .. } => Ok(folder_id),
        _ => Err(Error::ProviderFatal("not a google_drive source".into())),
    }
}

#[async_trait]
impl Provider for GoogleDriveProvider {
    fn name(&self) -> &'static str {
        "google_drive"
    }

    async fn authorize(&self, source: &SyncSource) -> Result<Authorization> {
        let cred = source
            .oauth()
            .ok_or_else(|| Error::ProviderFatal("google_drive source without oauth".into()))?;
        oauth::authorize("google_drive", TOKEN_URL, cred).await
    }

    async fn list_remote(
        &self,
        source: &SyncSource,
        auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        let root = folder_id(source)?;
        let token = auth.token.clone().unwrap_or_default();
        let mut entries = Vec::new();
        // (folder id, path prefix)
        let mut queue = vec![(root.to_string(), String::new())];

        while let Some((id, prefix)) = queue.pop() {
            let mut page_token: Option<String> = None;
            loop {
                let mut request = http::client()
                    .get("https://www.googleapis.com/drive/v3/files")
                    .bearer_auth(&token)
                    .query(&[
                        ("q", format!("'{id}' in parents and trashed = false")),
                        (
                            "fields",
                            "nextPageToken,files(id,name,mimeType,size,md5Checksum,modifiedTime)"
                                .to_string(),
                        ),
                        ("pageSize", "1000".to_string()),
                    ]);
                if let Some(next) = &page_token {
                    request = request.query(&[("pageToken", next.as_str())]);
                }
                let page: FileList = http::send_json(request)
                    .await
                    .map_err(|e| http::with_provider(e, "google_drive"))?;

                for file in page.files {
                    let path = if prefix.is_empty() {
                        file.name.clone()
                    } else {
                        format!("{prefix}/{}", file.name)
                    };
                    if file.mime_type == FOLDER_MIME {
                        queue.push((file.id, path));
                    } else if file.mime_type.starts_with("application/vnd.google-apps") {
                        // Native docs have no downloadable bytes.
                        continue;
                    } else {
                        entries.push(RemoteEntry {
                            version: file
                                .md5
                                .clone()
                                .or(file.modified_time.clone())
                                .unwrap_or_else(|| file.id.clone()),
                            fetch_ref: file.id,
                            path,
                            size: file.size.and_then(|s| s.parse().ok()),
                            modified_at: file
                                .modified_time
                                .as_deref()
                                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                                .map(|t| t.with_timezone(&Utc)),
                        });
                    }
                }

                page_token = page.next_page_token;
                if page_token.is_none() {
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
        let url = format!(
            "https://www.googleapis.com/drive/v3/files/{}?alt=media",
            entry.fetch_ref
        );
        http::send_bytes(http::client().get(&url).bearer_auth(&token))
            .await
            .map_err(|e| http::with_provider(e, "google_drive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_parses() {
        let json = r#"{"files":[
            {"id":"f1","name":"a.txt","mimeType":"text/plain","size":"12","md5Checksum":"m1"},
            {"id":"d1","name":"sub","mimeType":"application/vnd.google-apps.folder"},
            {"id":"g1","name":"Doc","mimeType":"application/vnd.google-apps.document"}
        ]}"#;
        let parsed: FileList = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.files.len(), 3);
        assert_eq!(parsed.files[0].md5.as_deref(), Some("m1"));
        assert!(parsed.next_page_token.is_none());
    }
}
