//! Service construction and lifecycle.
//!
//! Everything shared is built once at startup and passed around explicitly
//! behind `Arc`s; there are no globals. Lifecycle: `init` builds the stack,
//! `serve` spawns the long-lived tasks, `drain` cancels tokens and waits
//! for workers to reach a safe boundary, `close` releases the stores.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use lorebase_core::{Embedder, Error, Result, SparseEmbedder, VectorStore};
use lorebase_embed::{Bm25SparseEmbedder, EmbedderPool, HashEmbedder};
use lorebase_events::EventBus;
use lorebase_extract::ExtractorRegistry;
use lorebase_index::{FileSig, FileWatcher, Indexer, IndexerConfig, DEBOUNCE_WINDOW};
use lorebase_search::{SearchEngine, UriIssuer};
use lorebase_state::StateStore;
use lorebase_sync::{ProviderRegistry, SyncConfig, SyncEngine};
use lorebase_vector::MemoryVectorStore;

use crate::config::Config;

/// The constructed service stack.
pub struct Services {
    pub config: Config,
    pub state: Arc<StateStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<EmbedderPool>,
    pub sparse: Arc<dyn SparseEmbedder>,
    pub bus: Arc<EventBus>,
    pub indexer: Arc<Indexer>,
    pub sync: Arc<SyncEngine>,
    pub search: SearchEngine,
    pub uris: UriIssuer,
}

/// Handles to the long-lived tasks, for drain.
pub struct Running {
    watcher: FileWatcher,
    tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Build the full stack from configuration.
    pub async fn init(config: Config) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.root_path)?;
        let state = Arc::new(StateStore::open(&config.db_path).await?);

        // The production vector backend lives behind VECTOR_HOST/PORT and
        // the VectorStore seam; the in-process backend serves single-node
        // deployments and tests.
        let vectors: Arc<dyn VectorStore> =
            Arc::new(MemoryVectorStore::new(config.embedding_dimension));
        vectors.init().await?;

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.embedding_dimension));
        let pool = Arc::new(EmbedderPool::new(embedder, config.index_workers.max(2)));
        let sparse: Arc<dyn SparseEmbedder> = Arc::new(Bm25SparseEmbedder::new());
        let bus = Arc::new(EventBus::new());

        let indexer = Indexer::new(
            config.root_path.clone(),
            Arc::clone(&state),
            Arc::clone(&vectors),
            Arc::new(ExtractorRegistry::with_defaults()),
            Arc::clone(&pool),
            Arc::clone(&sparse),
            Arc::clone(&bus),
            IndexerConfig {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
                workers: config.index_workers,
                ..IndexerConfig::default()
            },
        );

        let sync = SyncEngine::new(
            config.root_path.clone(),
            Arc::clone(&state),
            ProviderRegistry::with_defaults(),
            Arc::clone(&bus),
            SyncConfig::default(),
        );

        let search = SearchEngine::new(
            Arc::clone(&state),
            Arc::clone(&vectors),
            Arc::clone(&pool),
            Arc::clone(&sparse),
        );

        info!(
            "lorebase initialized: root={}, db={}, model={} ({} dims)",
            config.root_path.display(),
            config.db_path.display(),
            config.embedding_model,
            config.embedding_dimension
        );

        let services = Arc::new(Self {
            config,
            state,
            vectors,
            embedder: pool,
            sparse,
            bus,
            indexer,
            sync,
            search,
            uris: UriIssuer::default(),
        });

        // The in-process vector backend starts empty; rebuild it from the
        // chunk rows so invariant "indexed file ⇒ chunk_count points"
        // survives restarts. The embedder is deterministic, so the rebuilt
        // points are identical to what the previous process held.
        let restored = services.rehydrate_vectors().await?;
        if restored > 0 {
            info!("rehydrated {restored} vector points from the state store");
        }

        Ok(services)
    }

    /// Re-populate the vector store from persisted chunks.
    pub async fn rehydrate_vectors(&self) -> Result<u64> {
        use lorebase_core::{chunk_point_id, IndexStatus, PointPayload, VectorPoint};

        let files = self
            .state
            .list_files_under(&lorebase_core::LogicalPath::root())
            .await?;
        let mut restored = 0u64;
        for file in files {
            if file.index_status != IndexStatus::Indexed || file.chunk_count.unwrap_or(0) == 0 {
                continue;
            }
            let chunks = self.state.get_chunks(&file.path).await?;
            if chunks.is_empty() {
                continue;
            }
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            let dense = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(Error::Embedding)?;
            let sparse = self.sparse.embed_batch(&texts);

            let points: Vec<VectorPoint> = chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| VectorPoint {
                    id: chunk_point_id(&chunk.file_path, chunk.ordinal, chunk.embedding_version),
                    dense: dense[i].vector.clone(),
                    sparse: sparse.get(i).filter(|s| !s.is_empty()).cloned(),
                    payload: PointPayload {
                        file_path: chunk.file_path.clone(),
                        folder_path: file.folder_path.clone(),
                        ordinal: chunk.ordinal,
                        text: chunk.text.clone(),
                        token_count: chunk.token_count,
                        file_mime: file.mime.clone(),
                    },
                })
                .collect();
            restored += points.len() as u64;
            self.vectors.upsert(points).await?;
        }
        Ok(restored)
    }

    /// Spawn the observer, workers, and schedulers.
    pub async fn serve(self: &Arc<Self>) -> Result<Running> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let mut watcher = FileWatcher::new(self.config.root_path.clone(), event_tx, DEBOUNCE_WINDOW)
            .map_err(|e| Error::Other(format!("watcher init failed: {e}")))?;
        watcher
            .watch(&self.config.root_path)
            .map_err(|e| Error::Other(format!("watch failed: {e}")))?;

        // Seed move correlation from what the state store already knows.
        let known = self.state.list_files_under(&lorebase_core::LogicalPath::root()).await?;
        watcher.prime(known.into_iter().filter_map(|f| {
            let mtime = f.mtime?.timestamp();
            Some((f.path.as_str().to_string(), FileSig::new(f.size, mtime)))
        }));

        let mut tasks = self.indexer.spawn_workers().await;
        tasks.push(tokio::spawn(
            Arc::clone(&self.indexer).run_events(event_rx),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.indexer).poll_loop(self.config.indexing_poll_interval),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.sync).schedule_loop(self.config.sync_interval),
        ));

        // Pick up work interrupted by the previous process.
        self.indexer.recover().await?;

        Ok(Running { watcher, tasks })
    }

    /// Stop intake, wait for workers to finish their current unit, release
    /// the stores.
    pub async fn drain_and_close(self: &Arc<Self>, running: Running) {
        let Running { watcher, tasks } = running;
        drop(watcher);

        self.indexer.shutdown();
        self.sync.shutdown();

        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("task ended abnormally: {e}");
                }
            }
        }

        self.state.close().await;
        info!("lorebase drained and closed");
    }
}
