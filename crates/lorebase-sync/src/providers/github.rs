//! GitHub repositories over the REST API.
//!
//! Listing uses the recursive git trees endpoint (one request per sync);
//! blob shas are the version markers, so unchanged files cost nothing.
//! Fetch goes through `raw.githubusercontent.com`.

use async_trait::async_trait;
use serde::Deserialize;

use lorebase_core::{Error, Result, SyncSource};

use crate::http;
use crate::provider::{Authorization, Provider, RemoteEntry};

pub struct GithubProvider;

impl GithubProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GithubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeNode {
    path: String,
    #[serde(rename = "type")]
    node_type: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

fn source_parts(source: &SyncSource) -> Result<(&str, &str, &str, Option<&str>)> {
    match source {
        SyncSource::Github {
            repo,
            branch,
            path,
            token,
        } => Ok((repo, branch, path, token.as_deref())),
        _ => Err(Error::ProviderFatal("not a github source".into())),
    }
}

fn with_token(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

#[async_trait]
impl Provider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn authorize(&self, source: &SyncSource) -> Result<Authorization> {
        let (_, _, _, token) = source_parts(source)?;
        // PATs don't expire on a schedule; a rejected token surfaces as a
        // 401 from the API and becomes ProviderAuthRequired there.
        Ok(Authorization {
            token: token.map(String::from),
            refreshed: None,
        })
    }

    async fn list_remote(
        &self,
        source: &SyncSource,
        auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        let (repo, branch, subpath, _) = source_parts(source)?;
        let url = format!("https://api.github.com/repos/{repo}/git/trees/{branch}?recursive=1");
        let response: TreeResponse =
            http::send_json(with_token(http::client().get(&url), auth.token.as_deref()))
                .await
                .map_err(|e| http::with_provider(e, "github"))?;

        if response.truncated {
            return Err(Error::ProviderFatal(format!(
                "tree listing for {repo}@{branch} is truncated; narrow the sync path"
            )));
        }

        let prefix = subpath.trim_matches('/');
        let entries = response
            .tree
            .into_iter()
            .filter(|n| n.node_type == "blob")
            .filter_map(|n| {
                let relative = if prefix.is_empty() {
                    Some(n.path.as_str())
                } else {
                    n.path
                        .strip_prefix(prefix)
                        .and_then(|rest| rest.strip_prefix('/'))
                };
                let relative = relative?.to_string();
                Some(RemoteEntry {
                    fetch_ref: format!(
                        "https://raw.githubusercontent.com/{repo}/{branch}/{}",
                        n.path
                    ),
                    path: relative,
                    size: n.size,
                    modified_at: None,
                    version: n.sha,
                })
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
        http::send_bytes(with_token(
            http::client().get(&entry.fetch_ref),
            auth.token.as_deref(),
        ))
        .await
        .map_err(|e| http::with_provider(e, "github"))
    }
}
