//! The search engine: hybrid retrieval with per-user folder visibility.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use lorebase_core::{
    Error, FolderRecord, HybridQuery, IndexStatus, LogicalPath, Result, SparseEmbedder,
    VectorFilter, VectorStore,
};
use lorebase_embed::EmbedderPool;
use lorebase_state::StateStore;

use crate::assemble::merge_overlapping;

/// Hard cap on result count.
pub const MAX_LIMIT: usize = 100;
/// Hard cap on chunks returned by one `get_chunk_range` call.
pub const MAX_RANGE_CHUNKS: u32 = 20;
/// Dense weight in the hybrid score.
pub const DEFAULT_ALPHA: f32 = 0.6;

/// A search request as the MCP/HTTP surfaces pass it in.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub include_folders: Option<Vec<LogicalPath>>,
    pub exclude_folders: Vec<LogicalPath>,
    /// Opaque identity from the transport (`X-User-Name` contract).
    pub user: Option<String>,
    /// Attach the neighbouring chunks of each hit.
    pub with_context: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub file_path: String,
    pub file_name: String,
    pub folder_path: String,
    pub chunk_text: String,
    pub chunk_ordinal: u32,
    pub token_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_metadata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexedFolderInfo {
    pub folder_path: String,
    pub status: IndexStatus,
    pub indexing_enabled: bool,
    pub file_count: u64,
    pub total_chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub file_path: String,
    pub file_name: String,
    pub content: String,
    pub chunk_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRange {
    pub file_path: String,
    pub merged_text: String,
    pub actual_first_chunk: u32,
    pub actual_last_chunk: u32,
    pub total_chunks_in_file: u32,
    pub truncated_to_limit: bool,
    pub truncated_beyond_file: bool,
}

/// Hybrid search over the state and vector stores.
pub struct SearchEngine {
    state: Arc<StateStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<EmbedderPool>,
    sparse: Arc<dyn SparseEmbedder>,
    alpha: f32,
}

impl SearchEngine {
    pub fn new(
        state: Arc<StateStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<EmbedderPool>,
        sparse: Arc<dyn SparseEmbedder>,
    ) -> Self {
        Self {
            state,
            vectors,
            embedder,
            sparse,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Folders whose chunks this user may see: indexing enabled, fully
    /// indexed, search-active for the user, and no explicitly disabled
    /// ancestor.
    pub async fn visible_folders(&self, user: Option<&str>) -> Result<Vec<FolderRecord>> {
        let folders = self.state.list_folders().await?;
        let mut visible = Vec::new();
        'outer: for folder in folders {
            if !folder.indexing_enabled || folder.index_status != IndexStatus::Indexed {
                continue;
            }
            for ancestor in folder.path.ancestors() {
                if let Some(row) = folders_lookup(&self.state, &ancestor).await? {
                    if !row.indexing_enabled {
                        continue 'outer;
                    }
                }
            }
            if let Some(user) = user {
                if !self.state.get_visibility(user, &folder.path).await? {
                    continue;
                }
            }
            visible.push(folder);
        }
        Ok(visible)
    }

    /// Hybrid search. Empty result when nothing is visible or nothing
    /// matches.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let limit = request.limit.unwrap_or(20).clamp(1, MAX_LIMIT);
        if request.query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let visible = self.visible_folders(request.user.as_deref()).await?;
        if visible.is_empty() {
            return Ok(Vec::new());
        }

        // Effective folder set: visible ∩ include.
        let mut effective: Vec<LogicalPath> = Vec::new();
        match &request.include_folders {
            Some(includes) => {
                for folder in &visible {
                    for include in includes {
                        if include.contains(&folder.path) {
                            effective.push(folder.path.clone());
                        } else if folder.path.contains(include) {
                            effective.push(include.clone());
                        }
                    }
                }
            }
            None => effective = visible.iter().map(|f| f.path.clone()).collect(),
        }
        effective.sort();
        effective.dedup();
        if effective.is_empty() {
            return Ok(Vec::new());
        }

        let dense = self
            .embedder
            .embed_query(&request.query)
            .await
            .map_err(Error::Embedding)?;
        let sparse = self.sparse.embed_query(&request.query);

        // Oversample so per-file dedup still fills the page.
        let hits = self
            .vectors
            .query(HybridQuery {
                dense: dense.vector,
                sparse: (!sparse.is_empty()).then_some(sparse),
                limit: limit * 4,
                filter: VectorFilter {
                    include_folders: Some(effective),
                    exclude_folders: request.exclude_folders.clone(),
                    ..Default::default()
                },
                alpha: self.alpha,
            })
            .await?;

        // Best chunk per file.
        let mut out: Vec<SearchHit> = Vec::new();
        for hit in hits {
            if out.iter().any(|h| h.file_path == hit.payload.file_path.as_str()) {
                continue;
            }
            let folder_metadata = folders_lookup(&self.state, &hit.payload.folder_path)
                .await?
                .and_then(|f| f.metadata_text);
            let context = if request.with_context {
                Some(self.chunk_context(&hit.payload.file_path, hit.payload.ordinal).await?)
            } else {
                None
            };
            out.push(SearchHit {
                score: hit.score,
                file_name: hit.payload.file_path.file_name().to_string(),
                file_path: hit.payload.file_path.as_str().to_string(),
                folder_path: hit.payload.folder_path.as_str().to_string(),
                chunk_text: hit.payload.text,
                chunk_ordinal: hit.payload.ordinal,
                token_count: hit.payload.token_count,
                folder_metadata,
                context,
            });
            if out.len() >= limit {
                break;
            }
        }
        debug!("search '{}' -> {} hits", request.query, out.len());
        Ok(out)
    }

    /// The hit's chunk merged with its immediate neighbours.
    async fn chunk_context(&self, path: &LogicalPath, ordinal: u32) -> Result<String> {
        let start = ordinal.saturating_sub(1);
        let chunks = self.state.get_chunk_range(path, start, ordinal + 1).await?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        Ok(merge_overlapping(&texts))
    }

    /// Indexed folders with counts, for the folder-listing tool.
    pub async fn list_indexed_folders(&self) -> Result<Vec<IndexedFolderInfo>> {
        let folders = self.state.list_folders().await?;
        let mut out = Vec::with_capacity(folders.len());
        for folder in folders {
            let stats = self.state.folder_stats(&folder.path).await?;
            out.push(IndexedFolderInfo {
                folder_path: folder.path.as_str().to_string(),
                status: folder.index_status,
                indexing_enabled: folder.indexing_enabled,
                file_count: stats.file_count,
                total_chunks: stats.chunk_count,
                metadata: folder.metadata_text,
            });
        }
        Ok(out)
    }

    /// Full text of an indexed file: every chunk merged in order.
    pub async fn get_file(&self, path: &LogicalPath) -> Result<FileContent> {
        let file = self
            .state
            .get_file(path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file '{path}' is not indexed")))?;
        let chunks = self.state.get_chunks(path).await?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        Ok(FileContent {
            file_path: path.as_str().to_string(),
            file_name: path.file_name().to_string(),
            content: merge_overlapping(&texts),
            chunk_count: file.chunk_count.unwrap_or(0),
        })
    }

    /// A sub-range of chunks merged, capped at [`MAX_RANGE_CHUNKS`].
    pub async fn get_chunk_range(
        &self,
        path: &LogicalPath,
        first: u32,
        last: u32,
    ) -> Result<ChunkRange> {
        if last < first {
            return Err(Error::InvalidPath(format!(
                "invalid chunk range {first}..{last}"
            )));
        }
        let file = self
            .state
            .get_file(path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file '{path}' is not indexed")))?;
        let total = file.chunk_count.unwrap_or(0);
        if total == 0 || first >= total {
            return Err(Error::NotFound(format!(
                "chunk range {first}..{last} is beyond '{path}' ({total} chunks)"
            )));
        }

        let truncated_to_limit = last - first + 1 > MAX_RANGE_CHUNKS;
        let effective_last = if truncated_to_limit {
            first + MAX_RANGE_CHUNKS - 1
        } else {
            last
        };

        let chunks = self.state.get_chunk_range(path, first, effective_last).await?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let actual_first = chunks.first().map(|c| c.ordinal).unwrap_or(first);
        let actual_last = chunks.last().map(|c| c.ordinal).unwrap_or(first);

        Ok(ChunkRange {
            file_path: path.as_str().to_string(),
            merged_text: merge_overlapping(&texts),
            actual_first_chunk: actual_first,
            actual_last_chunk: actual_last,
            total_chunks_in_file: total,
            truncated_to_limit,
            truncated_beyond_file: actual_last < effective_last,
        })
    }
}

async fn folders_lookup(
    state: &StateStore,
    path: &LogicalPath,
) -> Result<Option<FolderRecord>> {
    Ok(state.get_folder(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebase_core::{
        chunk_point_id, ChunkRecord, Embedder, FileRecord, PointPayload, VectorPoint,
    };
    use lorebase_embed::{Bm25SparseEmbedder, HashEmbedder};
    use lorebase_vector::MemoryVectorStore;

    const DIM: usize = 128;

    struct Fixture {
        state: Arc<StateStore>,
        vectors: Arc<MemoryVectorStore>,
        embedder: Arc<HashEmbedder>,
        sparse: Arc<Bm25SparseEmbedder>,
        engine: SearchEngine,
    }

    async fn fixture() -> Fixture {
        let state = Arc::new(StateStore::in_memory().await.unwrap());
        let vectors = Arc::new(MemoryVectorStore::new(DIM));
        let embedder = Arc::new(HashEmbedder::new(DIM));
        let sparse = Arc::new(Bm25SparseEmbedder::new());
        let engine = SearchEngine::new(
            Arc::clone(&state),
            Arc::clone(&vectors) as Arc<dyn VectorStore>,
            Arc::new(EmbedderPool::new(
                Arc::clone(&embedder) as Arc<dyn Embedder>,
                2,
            )),
            Arc::clone(&sparse) as Arc<dyn SparseEmbedder>,
        );
        Fixture {
            state,
            vectors,
            embedder,
            sparse,
            engine,
        }
    }

    fn path(s: &str) -> LogicalPath {
        LogicalPath::parse(s).unwrap()
    }

    /// Index a one-chunk file directly into both stores.
    async fn seed_file(fx: &Fixture, folder: &str, name: &str, text: &str) {
        let file_path = path(&format!("{folder}/{name}"));
        let folder_path = path(folder);
        let hash = format!("hash-{name}");

        fx.state
            .upsert_file(&FileRecord {
                path: file_path.clone(),
                folder_path: folder_path.clone(),
                size: text.len() as u64,
                mtime: None,
                content_hash: hash.clone(),
                mime: "text/plain".into(),
                index_status: IndexStatus::Pending,
                indexed_at: None,
                indexed_hash: None,
                chunk_count: None,
                embedding_version: 1,
                error_message: None,
            })
            .await
            .unwrap();

        let id = chunk_point_id(&file_path, 0, 1);
        fx.state
            .swap_chunks(
                &file_path,
                &[ChunkRecord {
                    file_path: file_path.clone(),
                    ordinal: 0,
                    text: text.into(),
                    token_count: text.split_whitespace().count() as u32,
                    char_start: 0,
                    char_end: text.chars().count() as u32,
                    embedding_version: 1,
                    dense_vector_id: id,
                    sparse_vector_id: Some(id),
                }],
                &hash,
                1,
            )
            .await
            .unwrap();

        let dense = fx.embedder.embed_batch(&[text]).await.unwrap();
        let sparse = lorebase_core::SparseEmbedder::embed_batch(fx.sparse.as_ref(), &[text]);
        fx.vectors
            .upsert(vec![VectorPoint {
                id,
                dense: dense[0].vector.clone(),
                sparse: sparse.into_iter().next(),
                payload: PointPayload {
                    file_path: file_path.clone(),
                    folder_path,
                    ordinal: 0,
                    text: text.into(),
                    token_count: 1,
                    file_mime: "text/plain".into(),
                },
            }])
            .await
            .unwrap();
    }

    async fn mark_indexed(fx: &Fixture, folder: &str) {
        fx.state.set_folder_enabled(&path(folder), true).await.unwrap();
        fx.state
            .set_folder_index_status(&path(folder), IndexStatus::Indexed, None)
            .await
            .unwrap();
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn basic_search_finds_matching_file() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "hello.txt", "the quick brown fox").await;
        seed_file(&fx, "docs", "other.txt", "sqlite checkpoint internals").await;
        mark_indexed(&fx, "docs").await;

        let hits = fx.engine.search(&request("fox")).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].file_path, "docs/hello.txt");
        assert_eq!(hits[0].file_name, "hello.txt");
        assert!(hits[0].chunk_text.contains("fox"));
    }

    #[tokio::test]
    async fn unindexed_folder_invisible() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "hello.txt", "the quick brown fox").await;
        // Folder enabled but still pending: not visible.
        fx.state.set_folder_enabled(&path("docs"), true).await.unwrap();
        fx.state
            .set_folder_index_status(&path("docs"), IndexStatus::Pending, None)
            .await
            .unwrap();

        let hits = fx.engine.search(&request("fox")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn disabled_folder_excluded_from_search() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "hello.txt", "the quick brown fox").await;
        mark_indexed(&fx, "docs").await;
        fx.state.set_folder_enabled(&path("docs"), false).await.unwrap();

        let hits = fx.engine.search(&request("fox")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn user_visibility_gates_results() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "hello.txt", "the quick brown fox").await;
        mark_indexed(&fx, "docs").await;
        fx.state.set_visibility("alice", &path("docs"), false).await.unwrap();

        let mut req = request("fox");
        req.user = Some("alice".into());
        assert!(fx.engine.search(&req).await.unwrap().is_empty());

        req.user = Some("bob".into());
        assert!(!fx.engine.search(&req).await.unwrap().is_empty());

        req.user = None;
        assert!(!fx.engine.search(&req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_ancestor_gates_subfolder() {
        let fx = fixture().await;
        seed_file(&fx, "docs/sub", "hello.txt", "the quick brown fox").await;
        mark_indexed(&fx, "docs/sub").await;
        // Ancestor row explicitly disabled.
        fx.state.set_folder_enabled(&path("docs"), false).await.unwrap();

        let hits = fx.engine.search(&request("fox")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn include_exclude_folders() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "a.txt", "shared fox words").await;
        seed_file(&fx, "notes", "b.txt", "shared fox words").await;
        mark_indexed(&fx, "docs").await;
        mark_indexed(&fx, "notes").await;

        let mut req = request("fox");
        req.include_folders = Some(vec![path("docs")]);
        let hits = fx.engine.search(&req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].folder_path, "docs");

        let mut req = request("fox");
        req.exclude_folders = vec![path("docs")];
        let hits = fx.engine.search(&req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].folder_path, "notes");
    }

    #[tokio::test]
    async fn dedupe_keeps_best_chunk_per_file() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "a.txt", "fox fox fox everywhere").await;
        mark_indexed(&fx, "docs").await;

        // Add a second chunk to the same file, less relevant.
        let file_path = path("docs/a.txt");
        let id = chunk_point_id(&file_path, 1, 1);
        let dense = fx.embedder.embed_batch(&["unrelated text"]).await.unwrap();
        fx.vectors
            .upsert(vec![VectorPoint {
                id,
                dense: dense[0].vector.clone(),
                sparse: None,
                payload: PointPayload {
                    file_path: file_path.clone(),
                    folder_path: path("docs"),
                    ordinal: 1,
                    text: "unrelated text".into(),
                    token_count: 2,
                    file_mime: "text/plain".into(),
                },
            }])
            .await
            .unwrap();

        let hits = fx.engine.search(&request("fox")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_ordinal, 0);
    }

    #[tokio::test]
    async fn empty_query_empty_result() {
        let fx = fixture().await;
        assert!(fx.engine.search(&request("  ")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_file_merges_chunks() {
        let fx = fixture().await;
        let file_path = path("docs/a.txt");
        fx.state
            .upsert_file(&FileRecord {
                path: file_path.clone(),
                folder_path: path("docs"),
                size: 10,
                mtime: None,
                content_hash: "h".into(),
                mime: "text/plain".into(),
                index_status: IndexStatus::Pending,
                indexed_at: None,
                indexed_hash: None,
                chunk_count: None,
                embedding_version: 1,
                error_message: None,
            })
            .await
            .unwrap();
        let chunks: Vec<ChunkRecord> = [
            "the quick brown ",
            "brown fox jumps ",
            "jumps over the lazy dog",
        ]
        .iter()
        .enumerate()
        .map(|(i, text)| ChunkRecord {
            file_path: file_path.clone(),
            ordinal: i as u32,
            text: (*text).into(),
            token_count: 3,
            char_start: 0,
            char_end: 0,
            embedding_version: 1,
            dense_vector_id: chunk_point_id(&file_path, i as u32, 1),
            sparse_vector_id: None,
        })
        .collect();
        fx.state.swap_chunks(&file_path, &chunks, "h", 1).await.unwrap();

        let content = fx.engine.get_file(&file_path).await.unwrap();
        assert_eq!(content.content, "the quick brown fox jumps over the lazy dog");
        assert_eq!(content.chunk_count, 3);

        // get_file equals the merge of the full chunk range.
        let range = fx.engine.get_chunk_range(&file_path, 0, 2).await.unwrap();
        assert_eq!(range.merged_text, content.content);
    }

    #[tokio::test]
    async fn chunk_range_validation() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "a.txt", "some words here").await;

        let err = fx.engine.get_chunk_range(&path("docs/a.txt"), 3, 1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));

        let err = fx.engine.get_chunk_range(&path("docs/a.txt"), 5, 9).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = fx.engine.get_chunk_range(&path("docs/missing.txt"), 0, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_indexed_folders_reports_counts() {
        let fx = fixture().await;
        seed_file(&fx, "docs", "a.txt", "words one").await;
        seed_file(&fx, "docs", "b.txt", "words two").await;
        mark_indexed(&fx, "docs").await;
        fx.state
            .set_metadata(&path("docs"), Some("team handbook"), Some("alice"))
            .await
            .unwrap();

        let folders = fx.engine.list_indexed_folders().await.unwrap();
        let docs = folders.iter().find(|f| f.folder_path == "docs").unwrap();
        assert_eq!(docs.status, IndexStatus::Indexed);
        assert_eq!(docs.file_count, 2);
        assert_eq!(docs.total_chunks, 2);
        assert_eq!(docs.metadata.as_deref(), Some("team handbook"));
    }
}
