//! The sync engine: per-folder mirror pulls with single-flight.
//!
//! A run has three phases. Authenticate resolves (and if needed refreshes)
//! the provider credential. Plan diffs the remote listing against the
//! persisted cursor and the local tree. Apply streams changed files to
//! disk with write-to-temp + rename, so the observer's hash-based change
//! detection only ever sees complete files, and deletes what the remote no
//! longer has. Cancellation is cooperative between file writes and never
//! removes data already on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lorebase_core::{Error, LogicalPath, OAuthCredential, Result, SyncSource, SyncStatus};
use lorebase_events::{Event, EventBus};
use lorebase_state::StateStore;

use crate::provider::{Authorization, Provider, ProviderRegistry, RemoteEntry};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whole-run deadline.
    pub run_deadline: Duration,
    /// Attempts per file on transient failures.
    pub transient_retries: u32,
    pub retry_base: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            run_deadline: Duration::from_secs(15 * 60),
            transient_retries: 3,
            retry_base: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct SyncFlags {
    running: bool,
    pending: bool,
}

/// Outcome counters for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    pub downloaded: u64,
    pub deleted: u64,
    pub skipped: u64,
}

/// Per-folder pull engine.
pub struct SyncEngine {
    root: PathBuf,
    state: Arc<StateStore>,
    providers: ProviderRegistry,
    bus: Arc<EventBus>,
    config: SyncConfig,
    flags: Mutex<HashMap<String, SyncFlags>>,
    cancel: CancellationToken,
    write_nonce: std::sync::atomic::AtomicU64,
}

impl SyncEngine {
    pub fn new(
        root: PathBuf,
        state: Arc<StateStore>,
        providers: ProviderRegistry,
        bus: Arc<EventBus>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            root,
            state,
            providers,
            bus,
            config,
            flags: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            write_nonce: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Trigger a sync for a folder. Concurrent triggers collapse into one
    /// follow-up run.
    pub fn trigger(self: &Arc<Self>, folder: &LogicalPath) {
        {
            let mut flags = self.flags.lock().expect("sync flags poisoned");
            let entry = flags.entry(folder.as_str().to_string()).or_default();
            if entry.running {
                entry.pending = true;
                return;
            }
            entry.running = true;
        }

        let engine = Arc::clone(self);
        let folder = folder.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = engine.run_once(&folder).await {
                    // run_once records status itself; this is the backstop.
                    warn!("sync of {folder} failed: {e}");
                }
                let again = {
                    let mut flags = engine.flags.lock().expect("sync flags poisoned");
                    let entry = flags.entry(folder.as_str().to_string()).or_default();
                    if entry.pending && !engine.cancel.is_cancelled() {
                        entry.pending = false;
                        true
                    } else {
                        entry.running = false;
                        false
                    }
                };
                if !again {
                    break;
                }
            }
        });
    }

    /// Whether a run is in flight for the folder.
    pub fn is_running(&self, folder: &LogicalPath) -> bool {
        let flags = self.flags.lock().expect("sync flags poisoned");
        flags.get(folder.as_str()).map(|f| f.running).unwrap_or(false)
    }

    /// Periodic trigger for every folder with a sync source.
    pub async fn schedule_loop(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.state.list_folders().await {
                Ok(folders) => {
                    for folder in folders {
                        match self.state.get_sync_source(&folder.path).await {
                            Ok(Some(_)) => self.trigger(&folder.path),
                            Ok(None) => {}
                            Err(e) => warn!("sync sweep failed for {}: {e}", folder.path),
                        }
                    }
                }
                Err(e) => warn!("sync sweep failed: {e}"),
            }
        }
    }

    /// Accept a completed OAuth token from the external callback and
    /// announce the connection.
    pub async fn complete_connect(
        &self,
        folder: &LogicalPath,
        refreshed: OAuthCredential,
    ) -> Result<()> {
        let source = self
            .state
            .get_sync_source(folder)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no sync source on '{folder}'")))?;
        let updated = replace_oauth(source, refreshed)?;
        self.state.set_sync_source(folder, &updated, true).await?;
        self.state
            .set_folder_sync_status(folder, SyncStatus::Idle, None)
            .await?;
        self.bus.publish(Event::Connected {
            provider: updated.provider().to_string(),
            path: folder.as_str().to_string(),
        });
        Ok(())
    }

    /// One full sync run. Status transitions and events happen here.
    pub async fn run_once(&self, folder: &LogicalPath) -> Result<SyncStats> {
        let source = self
            .state
            .get_sync_source(folder)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no sync source on '{folder}'")))?;
        let provider = self.providers.get(&source)?;

        self.set_status(folder, SyncStatus::Syncing, None, false).await?;

        match self.run_phases(folder, &source, provider.as_ref()).await {
            Ok(stats) => {
                self.set_status(folder, SyncStatus::Synced, None, false).await?;
                info!(
                    "sync of {folder}: {} downloaded, {} deleted, {} skipped",
                    stats.downloaded, stats.deleted, stats.skipped
                );
                Ok(stats)
            }
            Err(Error::Cancelled) => {
                // Partial state stays on disk; the observer reconciles it.
                self.set_status(folder, SyncStatus::Idle, None, false).await?;
                Err(Error::Cancelled)
            }
            Err(e) => {
                let auth_required = matches!(e, Error::ProviderAuthRequired { .. });
                self.set_status(folder, SyncStatus::Error, Some(&e.to_string()), auth_required)
                    .await?;
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        folder: &LogicalPath,
        source: &SyncSource,
        provider: &dyn Provider,
    ) -> Result<SyncStats> {
        let deadline = Instant::now() + self.config.run_deadline;

        // Phase 1: authenticate.
        let auth = provider.authorize(source).await?;
        if let Some(refreshed) = &auth.refreshed {
            let updated = replace_oauth(source.clone(), refreshed.clone())?;
            self.state.set_sync_source(folder, &updated, true).await?;
        }

        // Phase 2: plan.
        let listing = provider.list_remote(source, &auth).await?;
        let cursor = self.state.get_sync_cursor(folder).await?;
        let local_root = folder.to_abs(&self.root);
        tokio::fs::create_dir_all(&local_root).await?;

        let mut stats = SyncStats::default();
        let mut new_cursor = lorebase_core::SyncCursor::default();

        // Phase 3: apply.
        for entry in &listing {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() > deadline {
                return Err(Error::ProviderTransient("sync deadline exceeded".into()));
            }

            let local = safe_join(&local_root, &entry.path)?;
            let unchanged = cursor.entries.get(&entry.path) == Some(&entry.version)
                && local.exists();
            if unchanged {
                stats.skipped += 1;
                new_cursor
                    .entries
                    .insert(entry.path.clone(), entry.version.clone());
                continue;
            }

            let bytes = self.fetch_with_retry(source, provider, &auth, entry).await?;
            self.write_atomic(&local, &bytes).await?;
            stats.downloaded += 1;
            new_cursor
                .entries
                .insert(entry.path.clone(), entry.version.clone());
            debug!("downloaded {} ({} bytes)", entry.path, bytes.len());
        }

        // Mirror deletions: anything local the remote no longer lists.
        let remote_paths: std::collections::HashSet<&str> =
            listing.iter().map(|e| e.path.as_str()).collect();
        stats.deleted = self.delete_absent(&local_root, &remote_paths).await?;
        prune_empty_dirs(&local_root);

        self.state.set_sync_cursor(folder, &new_cursor).await?;
        Ok(stats)
    }

    async fn fetch_with_retry(
        &self,
        source: &SyncSource,
        provider: &dyn Provider,
        auth: &Authorization,
        entry: &RemoteEntry,
    ) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            match provider.fetch(source, auth, entry).await {
                Ok(bytes) => return Ok(bytes),
                Err(e @ Error::ProviderTransient(_)) if attempt < self.config.transient_retries => {
                    attempt += 1;
                    let delay = self.config.retry_base.saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!("transient fetch failure for {} (attempt {attempt}): {e}", entry.path);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write-to-temp + rename within the destination directory.
    async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| Error::Other(format!("no parent for {}", dest.display())))?;
        tokio::fs::create_dir_all(parent).await?;

        let nonce = self
            .write_nonce
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Other(format!("bad file name: {}", dest.display())))?;
        let tmp = parent.join(format!(".{file_name}.tmp-{nonce}"));

        tokio::fs::write(&tmp, bytes).await?;
        match tokio::fs::rename(&tmp, dest).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(Error::Io(e))
            }
        }
    }

    async fn delete_absent(
        &self,
        local_root: &Path,
        remote_paths: &std::collections::HashSet<&str>,
    ) -> Result<u64> {
        let mut deleted = 0u64;
        let mut stack = vec![local_root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let rel = path
                        .strip_prefix(local_root)
                        .ok()
                        .map(|p| p.to_string_lossy().replace('\\', "/"))
                        .unwrap_or_default();
                    if !remote_paths.contains(rel.as_str()) {
                        tokio::fs::remove_file(&path).await?;
                        deleted += 1;
                        debug!("deleted local file no longer on remote: {rel}");
                    }
                }
            }
        }
        Ok(deleted)
    }

    async fn set_status(
        &self,
        folder: &LogicalPath,
        status: SyncStatus,
        error: Option<&str>,
        auth_required: bool,
    ) -> Result<()> {
        self.state.set_folder_sync_status(folder, status, error).await?;
        self.bus.publish(Event::SyncStatus {
            path: folder.as_str().to_string(),
            status,
            error: error.map(String::from),
            auth_required,
        });
        Ok(())
    }
}

/// Swap the OAuth credential inside a source, leaving selectors untouched.
fn replace_oauth(source: SyncSource, cred: OAuthCredential) -> Result<SyncSource> {
    Ok(match source {
        SyncSource::GoogleDrive { folder_id, .. } => SyncSource::GoogleDrive {
            folder_id,
            oauth: cred,
        },
        SyncSource::Sharepoint {
            site_id,
            drive_id,
            folder_path,
            ..
        } => SyncSource::Sharepoint {
            site_id,
            drive_id,
            folder_path,
            oauth: cred,
        },
        SyncSource::Box { folder_id, .. } => SyncSource::Box {
            folder_id,
            oauth: cred,
        },
        other => {
            return Err(Error::Conflict(format!(
                "provider '{}' does not use browser credentials",
                other.provider()
            )))
        }
    })
}

/// Join a remote-relative path under the local root, refusing traversal.
fn safe_join(local_root: &Path, remote_path: &str) -> Result<PathBuf> {
    let mut out = local_root.to_path_buf();
    for part in remote_path.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(Error::InvalidPath(format!("unsafe remote path: {remote_path}")));
        }
        out.push(part);
    }
    Ok(out)
}

fn prune_empty_dirs(root: &Path) {
    // Deepest-first so parents empty out as children go.
    let mut dirs = Vec::new();
    collect_dirs(root, &mut dirs);
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        if dir != root {
            let _ = std::fs::remove_dir(&dir); // fails when non-empty, fine
        }
    }
}

fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.push(path.clone());
                collect_dirs(&path, out);
            }
        }
    }
}
