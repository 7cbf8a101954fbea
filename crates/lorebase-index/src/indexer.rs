//! Indexing engine: folder scans through extract → chunk → embed → store.
//!
//! The unit of work is a folder scan, not a file. A fixed pool of workers
//! drains a folder queue; per-folder single-flight is enforced by a flag
//! table, and an enqueue that lands while a scan is running collapses into
//! one follow-up scan. Within a folder, files are processed one at a time,
//! smallest first.
//!
//! Ordering rule: for every file, the state store commits before the vector
//! store is touched. A reader joining state rows to vectors by point id
//! therefore never sees vectors the state store does not account for; on a
//! vector-store failure the chunk rows stay authoritative and the file is
//! marked `error` for the next scan to retry.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lorebase_chunker::TokenChunker;
use lorebase_core::{
    chunk_point_id, ChangeEvent, ChangeKind, ChunkRecord, Error, FileRecord, IndexStatus,
    LogicalPath, PointPayload, Result, SparseEmbedder, VectorFilter, VectorPoint, VectorStore,
};
use lorebase_embed::EmbedderPool;
use lorebase_events::{Event, EventBus};
use lorebase_extract::ExtractorRegistry;
use lorebase_state::StateStore;

use crate::watcher::is_ignored;

/// Indexer tuning knobs.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
    pub workers: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            embed_batch_size: 32,
            workers: 2,
            max_retries: 6,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct FolderFlags {
    queued: bool,
    running: bool,
    pending: bool,
    retries: u32,
}

/// Result of one folder scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub files_deleted: u64,
    pub files_failed: u64,
    pub total_chunks: u64,
}

enum FileOutcome {
    Indexed(u32),
    Skipped,
    Failed,
}

/// The indexing engine.
pub struct Indexer {
    root: PathBuf,
    state: Arc<StateStore>,
    vectors: Arc<dyn VectorStore>,
    extractors: Arc<ExtractorRegistry>,
    chunker: TokenChunker,
    embedder: Arc<EmbedderPool>,
    sparse: Arc<dyn SparseEmbedder>,
    bus: Arc<EventBus>,
    config: IndexerConfig,
    queue_tx: mpsc::UnboundedSender<LogicalPath>,
    queue_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<LogicalPath>>>,
    flags: Mutex<HashMap<String, FolderFlags>>,
    cancel: CancellationToken,
}

impl Indexer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: PathBuf,
        state: Arc<StateStore>,
        vectors: Arc<dyn VectorStore>,
        extractors: Arc<ExtractorRegistry>,
        embedder: Arc<EmbedderPool>,
        sparse: Arc<dyn SparseEmbedder>,
        bus: Arc<EventBus>,
        config: IndexerConfig,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            chunker: TokenChunker::new(config.chunk_size, config.chunk_overlap),
            root,
            state,
            vectors,
            extractors,
            embedder,
            sparse,
            bus,
            config,
            queue_tx,
            queue_rx: AsyncMutex::new(Some(queue_rx)),
            flags: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting work; running workers exit at their next check.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Spawn the worker pool. Call once.
    pub async fn spawn_workers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let rx = self
            .queue_rx
            .lock()
            .await
            .take()
            .expect("spawn_workers called twice");
        let rx = Arc::new(AsyncMutex::new(rx));
        (0..self.config.workers.max(1))
            .map(|i| {
                let indexer = Arc::clone(self);
                let rx = Arc::clone(&rx);
                tokio::spawn(async move { indexer.worker_loop(i, rx).await })
            })
            .collect()
    }

    /// Queue a folder scan. Repeats collapse; an enqueue during a running
    /// scan causes exactly one follow-up scan.
    pub fn enqueue(&self, folder: &LogicalPath) {
        let mut flags = self.flags.lock().expect("flag table poisoned");
        let entry = flags.entry(folder.as_str().to_string()).or_default();
        if entry.running {
            entry.pending = true;
        } else if !entry.queued {
            entry.queued = true;
            let _ = self.queue_tx.send(folder.clone());
        }
    }

    /// Number of workers currently holding the folder (0 or 1 by contract).
    pub fn holders(&self, folder: &LogicalPath) -> usize {
        let flags = self.flags.lock().expect("flag table poisoned");
        flags
            .get(folder.as_str())
            .map(|f| usize::from(f.running))
            .unwrap_or(0)
    }

    /// Enable or disable indexing for a folder and schedule the matching
    /// scan (an index run when enabling, a purge when disabling).
    pub async fn set_folder_enabled(&self, folder: &LogicalPath, enabled: bool) -> Result<()> {
        self.state.set_folder_enabled(folder, enabled).await?;
        if enabled {
            self.state
                .set_folder_index_status(folder, IndexStatus::Pending, None)
                .await?;
            self.publish_status(folder, IndexStatus::Pending);
        }
        self.enqueue(folder);
        Ok(())
    }

    /// Force a fresh scan of an enabled folder.
    pub async fn request_reindex(&self, folder: &LogicalPath) -> Result<()> {
        let record = self
            .state
            .get_folder(folder)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder '{folder}'")))?;
        if !record.indexing_enabled {
            return Err(Error::Conflict(format!("folder '{folder}' is not enabled")));
        }
        self.state
            .set_folder_index_status(folder, IndexStatus::Pending, None)
            .await?;
        self.publish_status(folder, IndexStatus::Pending);
        self.enqueue(folder);
        Ok(())
    }

    /// Re-enqueue folders left pending or mid-scan by a previous process.
    pub async fn recover(&self) -> Result<()> {
        for folder in self.state.list_folders().await? {
            if folder.indexing_enabled
                && matches!(folder.index_status, IndexStatus::Pending | IndexStatus::Indexing)
            {
                info!("recovering interrupted folder {}", folder.path);
                self.enqueue(&folder.path);
            }
        }
        Ok(())
    }

    /// Periodic sweep for pending folders; complements event-driven enqueues.
    pub async fn poll_loop(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.state.list_folders().await {
                Ok(folders) => {
                    for folder in folders {
                        if folder.indexing_enabled && folder.index_status == IndexStatus::Pending {
                            self.enqueue(&folder.path);
                        }
                    }
                }
                Err(e) => warn!("pending sweep failed: {e}"),
            }
        }
    }

    /// Consume observer events: publish them and schedule the index work
    /// they imply.
    pub async fn run_events(self: Arc<Self>, mut events: mpsc::Receiver<ChangeEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return,
                e = events.recv() => match e { Some(e) => e, None => return },
            };
            self.bus.publish(wire_event(&event));
            if let Err(e) = self.handle_change(&event).await {
                if !matches!(e, Error::Cancelled) {
                    warn!("change handling failed for {}: {e}", event.path);
                }
            }
        }
    }

    async fn handle_change(&self, event: &ChangeEvent) -> Result<()> {
        match event.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                if let Some(folder) = self.governing_folder(&event.path).await? {
                    self.enqueue(&folder);
                }
            }
            ChangeKind::Deleted => {
                if event.is_dir {
                    self.purge_subtree(&event.path).await?;
                } else {
                    self.remove_file(&event.path).await?;
                }
            }
            ChangeKind::Moved => {
                if event.is_dir {
                    self.purge_subtree(&event.path).await?;
                } else {
                    self.remove_file(&event.path).await?;
                }
                if let Some(dest) = &event.dest_path {
                    if let Some(folder) = self.governing_folder(dest).await? {
                        self.enqueue(&folder);
                    }
                }
            }
        }
        Ok(())
    }

    /// The enabled folder that owns indexing for `path`: the nearest
    /// ancestor with an explicit folder row. A disabled row gates the whole
    /// subtree.
    async fn governing_folder(&self, path: &LogicalPath) -> Result<Option<LogicalPath>> {
        let mut candidates = Vec::new();
        if let Some(parent) = path.parent() {
            if !parent.is_root() {
                candidates.push(parent.clone());
                candidates.extend(parent.ancestors());
            }
        }
        for candidate in candidates {
            if let Some(record) = self.state.get_folder(&candidate).await? {
                return Ok(record.indexing_enabled.then_some(candidate));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Worker pool
    // ========================================================================

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<LogicalPath>>>,
    ) {
        debug!("index worker {worker_id} started");
        loop {
            let folder = tokio::select! {
                _ = self.cancel.cancelled() => return,
                f = async { rx.lock().await.recv().await } => match f {
                    Some(f) => f,
                    None => return,
                },
            };

            {
                let mut flags = self.flags.lock().expect("flag table poisoned");
                let entry = flags.entry(folder.as_str().to_string()).or_default();
                entry.queued = false;
                entry.running = true;
            }

            loop {
                let outcome = self.scan(&folder).await;

                match outcome {
                    Ok(summary) => {
                        let mut flags = self.flags.lock().expect("flag table poisoned");
                        if let Some(entry) = flags.get_mut(folder.as_str()) {
                            entry.retries = 0;
                        }
                        debug!("worker {worker_id} finished {folder}: {summary:?}");
                    }
                    Err(Error::Cancelled) => {
                        self.clear_running(&folder);
                        return;
                    }
                    Err(e) if e.is_retryable() => {
                        self.schedule_retry(&folder, &e);
                        break;
                    }
                    Err(e) => {
                        error!("scan of {folder} failed: {e}");
                        let _ = self
                            .state
                            .set_folder_index_status(&folder, IndexStatus::Error, Some(&e.to_string()))
                            .await;
                        self.publish_status(&folder, IndexStatus::Error);
                    }
                }

                let run_again = {
                    let mut flags = self.flags.lock().expect("flag table poisoned");
                    let entry = flags.entry(folder.as_str().to_string()).or_default();
                    if entry.pending {
                        entry.pending = false;
                        true
                    } else {
                        entry.running = false;
                        false
                    }
                };
                if !run_again {
                    break;
                }
            }
        }
    }

    fn clear_running(&self, folder: &LogicalPath) {
        let mut flags = self.flags.lock().expect("flag table poisoned");
        if let Some(entry) = flags.get_mut(folder.as_str()) {
            entry.running = false;
            entry.pending = false;
        }
    }

    fn schedule_retry(&self, folder: &LogicalPath, cause: &Error) {
        let (attempt, give_up) = {
            let mut flags = self.flags.lock().expect("flag table poisoned");
            let entry = flags.entry(folder.as_str().to_string()).or_default();
            entry.running = false;
            entry.pending = false;
            entry.retries += 1;
            (entry.retries, entry.retries > self.config.max_retries)
        };

        if give_up {
            warn!("giving up on {folder} after {attempt} attempts: {cause}");
            let state = Arc::clone(&self.state);
            let bus = Arc::clone(&self.bus);
            let folder = folder.clone();
            let message = cause.to_string();
            tokio::spawn(async move {
                let _ = state
                    .set_folder_index_status(&folder, IndexStatus::Error, Some(&message))
                    .await;
                bus.publish(Event::IndexStatus {
                    path: folder.as_str().to_string(),
                    status: IndexStatus::Error,
                });
            });
            return;
        }

        let exp = self
            .config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = exp.min(self.config.backoff_cap);
        warn!("retrying {folder} in {delay:?} (attempt {attempt}): {cause}");

        let tx = self.queue_tx.clone();
        let cancel = self.cancel.clone();
        let folder = folder.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(folder);
                }
            }
        });
    }

    // ========================================================================
    // Folder scan
    // ========================================================================

    /// Scan one folder: enumerate, reconcile, process. Retryable store
    /// failures abort the scan; per-file failures are isolated.
    pub async fn scan(&self, folder: &LogicalPath) -> Result<ScanSummary> {
        let record = match self.state.get_folder(folder).await? {
            Some(record) => record,
            None => return Ok(ScanSummary::default()),
        };

        if !record.indexing_enabled {
            self.purge_folder_index(folder).await?;
            return Ok(ScanSummary::default());
        }

        self.state
            .set_folder_index_status(folder, IndexStatus::Indexing, None)
            .await?;
        self.publish_status(folder, IndexStatus::Indexing);

        let mut summary = ScanSummary::default();
        let mut first_error: Option<String> = None;

        let scan_result: Result<()> = async {
            let disk_files = self.enumerate(folder).await?;
            let known = self.state.list_files_under(folder).await?;

            // Rows with no file on disk: vectors first, then rows.
            let on_disk: std::collections::HashSet<&str> =
                disk_files.iter().map(|f| f.path.as_str()).collect();
            for row in &known {
                if !on_disk.contains(row.path.as_str()) {
                    self.remove_file(&row.path).await?;
                    summary.files_deleted += 1;
                }
            }

            for entry in disk_files {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                match self.process_file(&entry).await? {
                    FileOutcome::Indexed(chunks) => {
                        summary.files_indexed += 1;
                        summary.total_chunks += u64::from(chunks);
                    }
                    FileOutcome::Skipped => summary.files_skipped += 1,
                    FileOutcome::Failed => {
                        summary.files_failed += 1;
                        if first_error.is_none() {
                            first_error = Some(format!("failed to index {}", entry.path));
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        // An aborted scan leaves the folder in `indexing`; the worker turns
        // that into a retry or an error depending on the failure kind.
        scan_result?;

        if summary.files_failed > 0 {
            let message = format!("{} file(s) failed", summary.files_failed);
            self.state
                .set_folder_index_status(folder, IndexStatus::Error, Some(&message))
                .await?;
            self.publish_status(folder, IndexStatus::Error);
        } else {
            self.state
                .set_folder_index_status(folder, IndexStatus::Indexed, None)
                .await?;
            self.publish_status(folder, IndexStatus::Indexed);
        }

        self.bus.publish(Event::IndexComplete {
            path: folder.as_str().to_string(),
            files_indexed: summary.files_indexed,
            total_chunks: summary.total_chunks,
        });
        info!(
            "scan of {folder}: {} indexed, {} skipped, {} deleted, {} failed",
            summary.files_indexed, summary.files_skipped, summary.files_deleted, summary.files_failed
        );
        Ok(summary)
    }

    /// Files on disk under the folder, smallest first.
    async fn enumerate(&self, folder: &LogicalPath) -> Result<Vec<DiskFile>> {
        let abs = folder.to_abs(&self.root);
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || -> Result<Vec<DiskFile>> {
            let mut files = Vec::new();
            if !abs.exists() {
                return Ok(files);
            }
            for entry in walkdir::WalkDir::new(&abs).follow_links(false) {
                let entry = entry.map_err(|e| Error::Other(format!("walk failed: {e}")))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if is_ignored(&root, entry.path()) {
                    continue;
                }
                let meta = entry
                    .metadata()
                    .map_err(|e| Error::Other(format!("stat failed: {e}")))?;
                let path = LogicalPath::from_abs(&root, entry.path())?;
                files.push(DiskFile {
                    abs: entry.path().to_path_buf(),
                    folder_path: path.parent().unwrap_or_else(LogicalPath::root),
                    path,
                    size: meta.len(),
                    mtime: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
            files.sort_by_key(|f| (f.size, f.path.as_str().to_string()));
            Ok(files)
        })
        .await
        .map_err(|e| Error::Other(format!("scan task panicked: {e}")))??;
        Ok(entries)
    }

    async fn process_file(&self, entry: &DiskFile) -> Result<FileOutcome> {
        let bytes = match tokio::fs::read(&entry.abs).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Raced with a delete; the next observer event reconciles.
                return Ok(FileOutcome::Skipped);
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let content_hash = blake3::hash(&bytes).to_hex().to_string();
        let embedding_version = self.embedder.embedding_version();

        let existing = self.state.get_file(&entry.path).await?;
        if let Some(ex) = &existing {
            let unchanged = ex.index_status == IndexStatus::Indexed
                && ex.indexed_hash.as_deref() == Some(content_hash.as_str())
                && ex.chunk_count.is_some()
                && ex.embedding_version == embedding_version;
            if unchanged {
                return Ok(FileOutcome::Skipped);
            }
        }

        let mime = mime_guess::from_path(&entry.abs)
            .first_or_octet_stream()
            .to_string();

        let record = FileRecord {
            path: entry.path.clone(),
            folder_path: entry.folder_path.clone(),
            size: entry.size,
            mtime: entry.mtime,
            content_hash: content_hash.clone(),
            mime: mime.clone(),
            index_status: IndexStatus::Indexing,
            indexed_at: existing.as_ref().and_then(|e| e.indexed_at),
            indexed_hash: existing.as_ref().and_then(|e| e.indexed_hash.clone()),
            chunk_count: existing.as_ref().and_then(|e| e.chunk_count),
            embedding_version,
            error_message: None,
        };
        self.state.upsert_file(&record).await?;

        // Extraction is pure; errors isolate to the file.
        let extracted = match self.extractors.extract(&bytes, &mime, &entry.path) {
            Ok(Some(extracted)) => extracted,
            Ok(None) => {
                // Unrecognized type: indexed with zero chunks.
                return self.finish_empty(&entry.path, &content_hash, embedding_version).await;
            }
            Err(e) => {
                warn!("extract failed for {}: {e}", entry.path);
                self.state
                    .mark_file_status(&entry.path, IndexStatus::Error, Some(&e.to_string()))
                    .await?;
                return Ok(FileOutcome::Failed);
            }
        };

        let pieces = self
            .chunker
            .chunk(&extracted.text, self.embedder.token_counter());
        if pieces.is_empty() {
            return self.finish_empty(&entry.path, &content_hash, embedding_version).await;
        }

        // Embed in bounded batches.
        let mut chunks: Vec<ChunkRecord> = Vec::with_capacity(pieces.len());
        let mut points: Vec<VectorPoint> = Vec::with_capacity(pieces.len());
        for (batch_index, batch) in pieces.chunks(self.config.embed_batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let texts: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
            let dense = match self.embedder.embed_batch(&texts).await {
                Ok(dense) => dense,
                Err(e) => {
                    warn!("embedding failed for {}: {e}", entry.path);
                    self.state
                        .mark_file_status(&entry.path, IndexStatus::Error, Some(&e.to_string()))
                        .await?;
                    return Ok(FileOutcome::Failed);
                }
            };
            let sparse = self.sparse.embed_batch(&texts);

            for (i, piece) in batch.iter().enumerate() {
                let ordinal = (batch_index * self.config.embed_batch_size + i) as u32;
                let id = chunk_point_id(&entry.path, ordinal, embedding_version);
                let sparse_vec = sparse.get(i).filter(|s| !s.is_empty()).cloned();
                chunks.push(ChunkRecord {
                    file_path: entry.path.clone(),
                    ordinal,
                    text: piece.text.clone(),
                    token_count: piece.token_count,
                    char_start: piece.char_start,
                    char_end: piece.char_end,
                    embedding_version,
                    dense_vector_id: id,
                    sparse_vector_id: sparse_vec.as_ref().map(|_| id),
                });
                points.push(VectorPoint {
                    id,
                    dense: dense[i].vector.clone(),
                    sparse: sparse_vec,
                    payload: PointPayload {
                        file_path: entry.path.clone(),
                        folder_path: entry.folder_path.clone(),
                        ordinal,
                        text: piece.text.clone(),
                        token_count: piece.token_count,
                        file_mime: mime.clone(),
                    },
                });
            }
        }

        // State store first.
        self.state
            .swap_chunks(&entry.path, &chunks, &content_hash, embedding_version)
            .await?;

        // Then the vector store: clear the old point set, write the new one.
        let vector_result: std::result::Result<(), lorebase_core::StoreError> = async {
            self.vectors
                .delete_by_filter(&VectorFilter::for_file(entry.path.clone()))
                .await?;
            self.vectors.upsert(points).await?;
            Ok(())
        }
        .await;

        if let Err(e) = vector_result {
            warn!("vector upsert failed for {}: {e}", entry.path);
            self.state
                .mark_file_status(&entry.path, IndexStatus::Error, Some(&e.to_string()))
                .await?;
            return Ok(FileOutcome::Failed);
        }

        Ok(FileOutcome::Indexed(chunks.len() as u32))
    }

    async fn finish_empty(
        &self,
        path: &LogicalPath,
        content_hash: &str,
        embedding_version: u32,
    ) -> Result<FileOutcome> {
        self.state
            .swap_chunks(path, &[], content_hash, embedding_version)
            .await?;
        if let Err(e) = self
            .vectors
            .delete_by_filter(&VectorFilter::for_file(path.clone()))
            .await
        {
            self.state
                .mark_file_status(path, IndexStatus::Error, Some(&e.to_string()))
                .await?;
            return Ok(FileOutcome::Failed);
        }
        Ok(FileOutcome::Indexed(0))
    }

    /// Delete a file from both stores: vectors first, so a concurrent
    /// search sees the file whole or not at all.
    pub async fn remove_file(&self, path: &LogicalPath) -> Result<()> {
        self.vectors
            .delete_by_filter(&VectorFilter::for_file(path.clone()))
            .await?;
        self.state.delete_file(path).await?;
        Ok(())
    }

    /// Purge a deleted directory's subtree from both stores.
    async fn purge_subtree(&self, folder: &LogicalPath) -> Result<()> {
        self.vectors
            .delete_by_filter(&VectorFilter::for_folder(folder.clone()))
            .await?;
        for row in self.state.list_files_under(folder).await? {
            self.state.delete_file(&row.path).await?;
        }
        if self.state.get_folder(folder).await?.is_some() {
            self.state
                .set_folder_index_status(folder, IndexStatus::None, None)
                .await?;
            self.publish_status(folder, IndexStatus::None);
        }
        Ok(())
    }

    /// A disabled folder loses its vectors and chunk rows; settings stay.
    async fn purge_folder_index(&self, folder: &LogicalPath) -> Result<()> {
        self.vectors
            .delete_by_filter(&VectorFilter::for_folder(folder.clone()))
            .await?;
        for row in self.state.list_files_under(folder).await? {
            self.state.delete_file(&row.path).await?;
        }
        self.state
            .set_folder_index_status(folder, IndexStatus::None, None)
            .await?;
        self.publish_status(folder, IndexStatus::None);
        Ok(())
    }

    fn publish_status(&self, folder: &LogicalPath, status: IndexStatus) {
        self.bus.publish(Event::IndexStatus {
            path: folder.as_str().to_string(),
            status,
        });
    }
}

struct DiskFile {
    abs: PathBuf,
    path: LogicalPath,
    folder_path: LogicalPath,
    size: u64,
    mtime: Option<DateTime<Utc>>,
}

fn wire_event(event: &ChangeEvent) -> Event {
    let path = event.path.as_str().to_string();
    match event.kind {
        ChangeKind::Created => Event::Created {
            path,
            is_dir: event.is_dir,
        },
        ChangeKind::Modified => Event::Modified {
            path,
            is_dir: event.is_dir,
        },
        ChangeKind::Deleted => Event::Deleted {
            path,
            is_dir: event.is_dir,
        },
        ChangeKind::Moved => Event::Moved {
            path,
            dest_path: event
                .dest_path
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            is_dir: event.is_dir,
        },
    }
}
