//! End-to-end pipeline scenarios over the real component stack:
//! temp managed root, SQLite state store, in-memory vector store,
//! deterministic embedders.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use lorebase_core::{
    Error, IndexStatus, LogicalPath, Result, SparseEmbedder, SyncSource, VectorStore,
};
use lorebase_embed::{Bm25SparseEmbedder, EmbedderPool, HashEmbedder};
use lorebase_events::EventBus;
use lorebase_extract::ExtractorRegistry;
use lorebase_index::{Indexer, IndexerConfig};
use lorebase_search::{SearchEngine, SearchRequest};
use lorebase_state::StateStore;
use lorebase_sync::{
    Authorization, Provider, ProviderRegistry, RemoteEntry, SyncConfig, SyncEngine,
};
use lorebase_vector::MemoryVectorStore;

const DIM: usize = 128;

struct Stack {
    _dir: tempfile::TempDir,
    root: PathBuf,
    state: Arc<StateStore>,
    vectors: Arc<MemoryVectorStore>,
    indexer: Arc<Indexer>,
    search: SearchEngine,
    sync: Arc<SyncEngine>,
    repo: Arc<FakeRepo>,
}

/// A "github" standing in for the real API: serves a scripted file set.
struct FakeRepo {
    files: Mutex<Vec<(String, String, String)>>, // (path, version, content)
}

#[async_trait]
impl Provider for FakeRepo {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn authorize(&self, _source: &SyncSource) -> Result<Authorization> {
        Ok(Authorization::default())
    }

    async fn list_remote(
        &self,
        _source: &SyncSource,
        _auth: &Authorization,
    ) -> Result<Vec<RemoteEntry>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(path, version, content)| RemoteEntry {
                path: path.clone(),
                size: Some(content.len() as u64),
                modified_at: None,
                version: version.clone(),
                fetch_ref: path.clone(),
            })
            .collect())
    }

    async fn fetch(
        &self,
        _source: &SyncSource,
        _auth: &Authorization,
        entry: &RemoteEntry,
    ) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|(path, _, _)| path == &entry.fetch_ref)
            .map(|(_, _, content)| content.clone().into_bytes())
            .ok_or_else(|| Error::ProviderFatal("no such file".into()))
    }
}

async fn stack() -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let state = Arc::new(StateStore::in_memory().await.unwrap());
    let vectors = Arc::new(MemoryVectorStore::new(DIM));
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let sparse = Arc::new(Bm25SparseEmbedder::new());
    let bus = Arc::new(EventBus::new());
    let pool = Arc::new(EmbedderPool::new(
        Arc::clone(&embedder) as Arc<dyn lorebase_core::Embedder>,
        2,
    ));

    let indexer = Indexer::new(
        root.clone(),
        Arc::clone(&state),
        Arc::clone(&vectors) as Arc<dyn VectorStore>,
        Arc::new(ExtractorRegistry::with_defaults()),
        Arc::clone(&pool),
        Arc::clone(&sparse) as Arc<dyn SparseEmbedder>,
        Arc::clone(&bus),
        IndexerConfig::default(),
    );

    let search = SearchEngine::new(
        Arc::clone(&state),
        Arc::clone(&vectors) as Arc<dyn VectorStore>,
        Arc::clone(&pool),
        Arc::clone(&sparse) as Arc<dyn SparseEmbedder>,
    );

    let repo = Arc::new(FakeRepo {
        files: Mutex::new(vec![]),
    });
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::clone(&repo) as Arc<dyn Provider>);
    let sync = SyncEngine::new(
        root.clone(),
        Arc::clone(&state),
        providers,
        Arc::clone(&bus),
        SyncConfig::default(),
    );

    Stack {
        _dir: dir,
        root,
        state,
        vectors,
        indexer,
        search,
        sync,
        repo,
    }
}

fn path(s: &str) -> LogicalPath {
    LogicalPath::parse(s).unwrap()
}

fn request(query: &str) -> SearchRequest {
    SearchRequest {
        query: query.into(),
        limit: Some(5),
        ..Default::default()
    }
}

async fn write(root: &PathBuf, rel: &str, content: &str) {
    let abs = root.join(rel);
    tokio::fs::create_dir_all(abs.parent().unwrap()).await.unwrap();
    tokio::fs::write(abs, content).await.unwrap();
}

#[tokio::test]
async fn upload_index_search() {
    // S1: create docs, enable indexing, upload, search.
    let stack = stack().await;
    write(&stack.root, "docs/hello.txt", "the quick brown fox").await;
    stack.state.set_folder_enabled(&path("docs"), true).await.unwrap();
    stack.indexer.scan(&path("docs")).await.unwrap();

    let hits = stack.search.search(&request("fox")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file_path, "docs/hello.txt");
    assert!(hits[0].chunk_text.contains("fox"));
}

#[tokio::test]
async fn modified_content_replaces_search_results() {
    // S2: overwrite bytes, rescan, old content stops matching.
    let stack = stack().await;
    write(&stack.root, "docs/hello.txt", "the quick brown fox").await;
    stack.state.set_folder_enabled(&path("docs"), true).await.unwrap();
    stack.indexer.scan(&path("docs")).await.unwrap();

    write(&stack.root, "docs/hello.txt", "a lazy dog").await;
    stack.indexer.scan(&path("docs")).await.unwrap();

    let fox_hits = stack.search.search(&request("fox")).await.unwrap();
    assert!(
        fox_hits.iter().all(|h| !h.chunk_text.contains("fox")),
        "stale chunk text surfaced for the old bytes"
    );

    let dog_hits = stack.search.search(&request("dog")).await.unwrap();
    assert_eq!(dog_hits.len(), 1);
    assert!(dog_hits[0].chunk_text.contains("dog"));
}

#[tokio::test]
async fn disabled_folder_leaves_search() {
    // S3: disable docs; search over everything returns nothing from docs.
    let stack = stack().await;
    write(&stack.root, "docs/hello.txt", "the quick brown fox").await;
    stack.state.set_folder_enabled(&path("docs"), true).await.unwrap();
    stack.indexer.scan(&path("docs")).await.unwrap();
    assert_eq!(stack.search.search(&request("fox")).await.unwrap().len(), 1);

    stack.state.set_folder_enabled(&path("docs"), false).await.unwrap();
    stack.indexer.scan(&path("docs")).await.unwrap();

    let hits = stack.search.search(&request("fox")).await.unwrap();
    assert!(hits.is_empty());

    let folders = stack.search.list_indexed_folders().await.unwrap();
    let docs = folders.iter().find(|f| f.folder_path == "docs").unwrap();
    assert_eq!(docs.status, IndexStatus::None);
}

#[tokio::test]
async fn github_sync_lands_and_indexes() {
    // S4: two-file repository synced, then indexed and searchable.
    let stack = stack().await;
    *stack.repo.files.lock().unwrap() = vec![
        (
            "README.md".into(),
            "v1".into(),
            "# Project\nInstallation instructions for the widget.".into(),
        ),
        (
            "code.py".into(),
            "v1".into(),
            "def greet():\n    return 'salutations'".into(),
        ),
    ];
    stack
        .state
        .set_sync_source(
            &path("repo"),
            &SyncSource::Github {
                repo: "octo/site".into(),
                branch: "main".into(),
                path: String::new(),
                token: None,
            },
            false,
        )
        .await
        .unwrap();

    let stats = stack.sync.run_once(&path("repo")).await.unwrap();
    assert_eq!(stats.downloaded, 2);

    stack.state.set_folder_enabled(&path("repo"), true).await.unwrap();
    stack.indexer.scan(&path("repo")).await.unwrap();

    for name in ["repo/README.md", "repo/code.py"] {
        let file = stack.state.get_file(&path(name)).await.unwrap().unwrap();
        assert_eq!(file.index_status, IndexStatus::Indexed, "{name}");
    }

    let hits = stack.search.search(&request("installation widget")).await.unwrap();
    assert!(hits.iter().any(|h| h.file_path == "repo/README.md"));

    let hits = stack.search.search(&request("salutations")).await.unwrap();
    assert!(hits.iter().any(|h| h.file_path == "repo/code.py"));
}

#[tokio::test]
async fn rename_moves_vectors_to_new_path() {
    // Rename a/b.txt -> a/c.txt: old path stops matching, new one works.
    let stack = stack().await;
    write(&stack.root, "a/b.txt", "unique zebra paragraph").await;
    stack.state.set_folder_enabled(&path("a"), true).await.unwrap();
    stack.indexer.scan(&path("a")).await.unwrap();
    assert_eq!(stack.vectors.count_by_file(&path("a/b.txt")).await.unwrap(), 1);

    tokio::fs::rename(stack.root.join("a/b.txt"), stack.root.join("a/c.txt"))
        .await
        .unwrap();
    stack.indexer.scan(&path("a")).await.unwrap();

    assert_eq!(stack.vectors.count_by_file(&path("a/b.txt")).await.unwrap(), 0);
    assert_eq!(stack.vectors.count_by_file(&path("a/c.txt")).await.unwrap(), 1);

    let hits = stack.search.search(&request("zebra")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file_path, "a/c.txt");
}

#[tokio::test]
async fn idempotent_rescan_writes_nothing() {
    // upsert(file) twice with identical bytes: second scan skips entirely.
    let stack = stack().await;
    write(&stack.root, "docs/a.txt", "stable bytes").await;
    stack.state.set_folder_enabled(&path("docs"), true).await.unwrap();

    let first = stack.indexer.scan(&path("docs")).await.unwrap();
    assert_eq!(first.files_indexed, 1);
    let points_before = stack.vectors.len().await;

    let second = stack.indexer.scan(&path("docs")).await.unwrap();
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_skipped, 1);
    assert_eq!(stack.vectors.len().await, points_before);
}

#[tokio::test]
async fn get_file_round_trips_multi_chunk_content() {
    // get_file == merged full chunk range, overlap deduplicated.
    let stack = stack().await;
    let body = (0..120)
        .map(|i| format!("Sentence number {i} fills the corpus with words."))
        .collect::<Vec<_>>()
        .join(" ");
    write(&stack.root, "docs/long.txt", &body).await;
    stack.state.set_folder_enabled(&path("docs"), true).await.unwrap();
    stack.indexer.scan(&path("docs")).await.unwrap();

    let file = stack.state.get_file(&path("docs/long.txt")).await.unwrap().unwrap();
    let chunk_count = file.chunk_count.unwrap();
    assert!(chunk_count > 1, "fixture must span chunks");

    let full = stack.search.get_file(&path("docs/long.txt")).await.unwrap();
    let range = stack
        .search
        .get_chunk_range(&path("docs/long.txt"), 0, chunk_count - 1)
        .await
        .unwrap();
    assert_eq!(full.content, range.merged_text);
    assert_eq!(full.content, body);
}

#[tokio::test]
async fn vector_count_matches_chunk_count_for_indexed_files() {
    // Invariant 1, checked over a mixed tree.
    let stack = stack().await;
    write(&stack.root, "docs/a.txt", "first body of text").await;
    write(&stack.root, "docs/sub/b.md", "# second\n\nbody of text").await;
    write(&stack.root, "docs/empty.txt", "").await;
    stack.state.set_folder_enabled(&path("docs"), true).await.unwrap();
    stack.indexer.scan(&path("docs")).await.unwrap();

    for file in stack.state.list_files_under(&path("docs")).await.unwrap() {
        assert_eq!(file.index_status, IndexStatus::Indexed, "{}", file.path);
        let points = stack.vectors.count_by_file(&file.path).await.unwrap();
        assert_eq!(points, u64::from(file.chunk_count.unwrap()), "{}", file.path);
    }
}
