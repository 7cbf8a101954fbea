//! The provider capability and its registry.
//!
//! Every remote source implements the same three operations: authorize,
//! list, fetch. The engine owns the mirror algorithm; providers only know
//! their API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use lorebase_core::{Error, OAuthCredential, Result, SyncSource};

/// A file as the remote reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    /// Path relative to the synced folder, POSIX separators.
    pub path: String,
    pub size: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Provider version marker (etag, blob sha, version number). Drives
    /// incremental planning through the sync cursor.
    pub version: String,
    /// Provider-specific handle used by `fetch` (download URL or item id).
    pub fetch_ref: String,
}

/// Result of authorization: a usable token plus, after a refresh, the
/// credential the caller should persist.
#[derive(Debug, Clone, Default)]
pub struct Authorization {
    pub token: Option<String>,
    pub refreshed: Option<OAuthCredential>,
}

/// A remote content provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Matches [`SyncSource::provider`].
    fn name(&self) -> &'static str;

    /// Produce a usable credential, refreshing an expired OAuth token when
    /// a refresh token exists. `ProviderAuthRequired` when reconnection
    /// through the UI is the only way forward.
    async fn authorize(&self, source: &SyncSource) -> Result<Authorization>;

    /// Recursive remote listing.
    async fn list_remote(
        &self,
        source: &SyncSource,
        auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>>;

    /// Download one entry's bytes.
    async fn fetch(
        &self,
        source: &SyncSource,
        auth: &Authorization,
        entry: &RemoteEntry,
    ) -> Result<Vec<u8>>;
}

/// Providers keyed by source variant.
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registry with every built-in provider.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::providers::github::GithubProvider::new()));
        registry.register(Arc::new(crate::providers::google_drive::GoogleDriveProvider::new()));
        registry.register(Arc::new(crate::providers::sharepoint::SharepointProvider::new()));
        registry.register(Arc::new(crate::providers::box_drive::BoxProvider::new()));
        registry.register(Arc::new(crate::providers::azure_devops::AzureDevopsProvider::new()));
        registry.register(Arc::new(crate::providers::jira::JiraProvider::new()));
        registry.register(Arc::new(crate::providers::confluence::ConfluenceProvider::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, source: &SyncSource) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(source.provider())
            .cloned()
            .ok_or_else(|| Error::ProviderFatal(format!("no provider for '{}'", source.provider())))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_variant() {
        let registry = ProviderRegistry::with_defaults();
        let sources = [
            SyncSource::Github {
                repo: "o/r".into(),
                branch: "main".into(),
                path: String::new(),
                token: None,
            },
            SyncSource::Jira {
                base_url: "https://x".into(),
                project_key: "K".into(),
                email: "e".into(),
                api_token: "t".into(),
            },
        ];
        for source in &sources {
            let provider = registry.get(source).unwrap();
            assert_eq!(provider.name(), source.provider());
        }
    }
}
