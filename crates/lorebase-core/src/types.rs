//! Core types shared across the lorebase workspace.
//!
//! ## Entities
//! - [`FolderRecord`]: per-folder settings, sync and index state
//! - [`FileRecord`]: per-file metadata and change-detection state
//! - [`ChunkRecord`]: a stored slice of extracted text
//! - [`SyncSource`]: remote provider binding attached to a folder
//!
//! ## Pipeline
//! - [`ExtractedText`]: extractor output
//! - [`ChunkPiece`]: chunker output, before embedding
//!
//! ## Vector store
//! - [`VectorPoint`] / [`PointPayload`] / [`SparseVector`]
//! - [`VectorFilter`] / [`HybridQuery`] / [`ScoredPoint`]
//!
//! ## Change events
//! - [`ChangeEvent`] / [`ChangeKind`]: filesystem observer output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::path::LogicalPath;

/// Namespace for deterministic chunk point ids.
const POINT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6c, 0x6f, 0x72, 0x65, 0x62, 0x61, 0x73, 0x65, 0x2d, 0x70, 0x6f, 0x69, 0x6e, 0x74, 0x2d,
    0x31,
]);

// ============================================================================
// Statuses
// ============================================================================

/// Index status of a folder or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    /// Not tracked for indexing
    None,
    /// Queued for a folder scan
    Pending,
    /// A worker holds the folder
    Indexing,
    /// Up to date with the state store
    Indexed,
    /// Last attempt failed
    Error,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::None => "none",
            IndexStatus::Pending => "pending",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> IndexStatus {
        match s {
            "pending" => IndexStatus::Pending,
            "indexing" => IndexStatus::Indexing,
            "indexed" => IndexStatus::Indexed,
            "error" => IndexStatus::Error,
            _ => IndexStatus::None,
        }
    }
}

/// Sync status of a folder with a remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> SyncStatus {
        match s {
            "syncing" => SyncStatus::Syncing,
            "synced" => SyncStatus::Synced,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Idle,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Per-folder settings and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRecord {
    pub path: LogicalPath,
    pub indexing_enabled: bool,
    pub index_status: IndexStatus,
    pub index_error: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub metadata_text: Option<String>,
    pub metadata_updated_by: Option<String>,
}

impl FolderRecord {
    /// A fresh folder with nothing enabled and nothing indexed.
    pub fn new(path: LogicalPath) -> Self {
        Self {
            path,
            indexing_enabled: false,
            index_status: IndexStatus::None,
            index_error: None,
            indexed_at: None,
            sync_status: SyncStatus::Idle,
            last_synced_at: None,
            last_sync_error: None,
            metadata_text: None,
            metadata_updated_by: None,
        }
    }
}

/// Per-file metadata and change-detection state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: LogicalPath,
    pub folder_path: LogicalPath,
    pub size: u64,
    pub mtime: Option<DateTime<Utc>>,
    /// blake3 of the raw bytes currently on disk
    pub content_hash: String,
    pub mime: String,
    pub index_status: IndexStatus,
    pub indexed_at: Option<DateTime<Utc>>,
    /// The hash that was last indexed; may trail `content_hash`
    pub indexed_hash: Option<String>,
    pub chunk_count: Option<u32>,
    pub embedding_version: u32,
    pub error_message: Option<String>,
}

impl FileRecord {
    /// True when the stored vectors no longer reflect the bytes on disk.
    pub fn needs_reindex(&self, embedding_version: u32) -> bool {
        self.indexed_hash.as_deref() != Some(self.content_hash.as_str())
            || self.chunk_count.is_none()
            || self.embedding_version != embedding_version
    }
}

/// A stored chunk, keyed by `(file_path, ordinal)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub file_path: LogicalPath,
    pub ordinal: u32,
    pub text: String,
    pub token_count: u32,
    pub char_start: u32,
    pub char_end: u32,
    pub embedding_version: u32,
    pub dense_vector_id: Uuid,
    pub sparse_vector_id: Option<Uuid>,
}

/// Deterministic vector-point id for a chunk.
pub fn chunk_point_id(file_path: &LogicalPath, ordinal: u32, embedding_version: u32) -> Uuid {
    let name = format!("{}#{ordinal}@{embedding_version}", file_path.as_str());
    Uuid::new_v5(&POINT_NAMESPACE, name.as_bytes())
}

/// Per-extension counts inside a folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionStat {
    pub extension: String,
    pub file_count: u64,
    pub chunk_count: u64,
}

// ============================================================================
// Sync sources
// ============================================================================

/// OAuth credential bundle for providers that use browser-based consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

/// Remote provider binding attached to a folder.
///
/// A source is replaced wholesale, never edited field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SyncSource {
    Github {
        /// `owner/name`
        repo: String,
        branch: String,
        /// Subdirectory within the repo; empty for the whole tree
        #[serde(default)]
        path: String,
        token: Option<String>,
    },
    GoogleDrive {
        folder_id: String,
        oauth: OAuthCredential,
    },
    Sharepoint {
        site_id: String,
        drive_id: String,
        #[serde(default)]
        folder_path: String,
        oauth: OAuthCredential,
    },
    Box {
        folder_id: String,
        oauth: OAuthCredential,
    },
    AzureDevops {
        organization: String,
        project: String,
        repo: String,
        branch: String,
        pat: String,
    },
    Jira {
        base_url: String,
        project_key: String,
        email: String,
        api_token: String,
    },
    Confluence {
        base_url: String,
        space_key: String,
        email: String,
        api_token: String,
    },
}

impl SyncSource {
    /// Stable provider name used in events and registry lookup.
    pub fn provider(&self) -> &'static str {
        match self {
            SyncSource::Github { .. } => "github",
            SyncSource::GoogleDrive { .. } => "google_drive",
            SyncSource::Sharepoint { .. } => "sharepoint",
            SyncSource::Box { .. } => "box",
            SyncSource::AzureDevops { .. } => "azure_devops",
            SyncSource::Jira { .. } => "jira",
            SyncSource::Confluence { .. } => "confluence",
        }
    }

    pub fn oauth(&self) -> Option<&OAuthCredential> {
        match self {
            SyncSource::GoogleDrive { oauth, .. }
            | SyncSource::Sharepoint { oauth, .. }
            | SyncSource::Box { oauth, .. } => Some(oauth),
            _ => None,
        }
    }
}

/// Last-seen remote listing, persisted per folder for incremental planning.
///
/// Maps remote path to the provider's version marker (etag, sha, version id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncCursor {
    pub entries: BTreeMap<String, String>,
}

// ============================================================================
// Extraction and chunking
// ============================================================================

/// Output of content extraction: normalized UTF-8 text.
///
/// Blank lines act as soft-break markers the chunker prefers to split on.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    /// Language hint for source code (file extension based)
    pub language: Option<String>,
}

/// A chunk produced by the chunker, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub text: String,
    pub token_count: u32,
    pub char_start: u32,
    pub char_end: u32,
}

// ============================================================================
// Vector store
// ============================================================================

/// Bag-of-tokens weights for keyword scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub weights: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Payload stored alongside each vector point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    pub file_path: LogicalPath,
    pub folder_path: LogicalPath,
    pub ordinal: u32,
    pub text: String,
    pub token_count: u32,
    pub file_mime: String,
}

/// A point to upsert into the vector store. Idempotent by `id`.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    pub payload: PointPayload,
}

/// Filter for queries and bulk deletes.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Exact file match
    pub file_path: Option<LogicalPath>,
    /// Folder prefix match (the folder and everything under it)
    pub folder_prefix: Option<LogicalPath>,
    /// Only points in one of these folders (prefix semantics)
    pub include_folders: Option<Vec<LogicalPath>>,
    /// No points in any of these folders (prefix semantics)
    pub exclude_folders: Vec<LogicalPath>,
    /// Only these MIME types
    pub mime_types: Option<Vec<String>>,
}

impl VectorFilter {
    pub fn for_file(path: LogicalPath) -> Self {
        Self {
            file_path: Some(path),
            ..Default::default()
        }
    }

    pub fn for_folder(path: LogicalPath) -> Self {
        Self {
            folder_prefix: Some(path),
            ..Default::default()
        }
    }

    /// Whether a payload passes this filter.
    pub fn matches(&self, payload: &PointPayload) -> bool {
        if let Some(fp) = &self.file_path {
            if &payload.file_path != fp {
                return false;
            }
        }
        if let Some(prefix) = &self.folder_prefix {
            if !prefix.contains(&payload.file_path) {
                return false;
            }
        }
        if let Some(include) = &self.include_folders {
            if !include.iter().any(|f| f.contains(&payload.file_path)) {
                return false;
            }
        }
        if self
            .exclude_folders
            .iter()
            .any(|f| f.contains(&payload.file_path))
        {
            return false;
        }
        if let Some(mimes) = &self.mime_types {
            if !mimes.iter().any(|m| m == &payload.file_mime) {
                return false;
            }
        }
        true
    }
}

/// A hybrid dense + sparse query.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    pub limit: usize,
    pub filter: VectorFilter,
    /// Weight of the dense score; `1 - alpha` goes to the sparse score.
    pub alpha: f32,
}

/// A scored query match.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: PointPayload,
}

// ============================================================================
// Change events
// ============================================================================

/// Kind of filesystem change observed under the managed root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A coalesced filesystem change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: LogicalPath,
    pub abs_path: PathBuf,
    pub is_dir: bool,
    /// Destination for `Moved`
    pub dest_path: Option<LogicalPath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [
            IndexStatus::None,
            IndexStatus::Pending,
            IndexStatus::Indexing,
            IndexStatus::Indexed,
            IndexStatus::Error,
        ] {
            assert_eq!(IndexStatus::parse(s.as_str()), s);
        }
        assert_eq!(
            serde_json::to_string(&IndexStatus::Indexed).unwrap(),
            "\"indexed\""
        );
    }

    #[test]
    fn sync_status_round_trip() {
        for s in [
            SyncStatus::Idle,
            SyncStatus::Syncing,
            SyncStatus::Synced,
            SyncStatus::Error,
        ] {
            assert_eq!(SyncStatus::parse(s.as_str()), s);
        }
    }

    #[test]
    fn needs_reindex_rules() {
        let mut file = FileRecord {
            path: LogicalPath::parse("docs/a.txt").unwrap(),
            folder_path: LogicalPath::parse("docs").unwrap(),
            size: 10,
            mtime: None,
            content_hash: "abc".into(),
            mime: "text/plain".into(),
            index_status: IndexStatus::Indexed,
            indexed_at: None,
            indexed_hash: Some("abc".into()),
            chunk_count: Some(3),
            embedding_version: 1,
            error_message: None,
        };
        assert!(!file.needs_reindex(1));

        file.content_hash = "def".into();
        assert!(file.needs_reindex(1));

        file.indexed_hash = Some("def".into());
        assert!(!file.needs_reindex(1));
        assert!(file.needs_reindex(2), "version bump invalidates");

        file.chunk_count = None;
        assert!(file.needs_reindex(1));
    }

    #[test]
    fn point_id_deterministic() {
        let path = LogicalPath::parse("docs/a.txt").unwrap();
        let a = chunk_point_id(&path, 0, 1);
        let b = chunk_point_id(&path, 0, 1);
        assert_eq!(a, b);
        assert_ne!(a, chunk_point_id(&path, 1, 1));
        assert_ne!(a, chunk_point_id(&path, 0, 2));
    }

    #[test]
    fn sync_source_tagged_serde() {
        let src = SyncSource::Github {
            repo: "octo/site".into(),
            branch: "main".into(),
            path: String::new(),
            token: None,
        };
        let json = serde_json::to_string(&src).unwrap();
        assert!(json.contains("\"provider\":\"github\""));
        let back: SyncSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider(), "github");
    }

    #[test]
    fn oauth_expiry() {
        let cred = OAuthCredential {
            access_token: "t".into(),
            refresh_token: Some("r".into()),
            expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            client_id: "c".into(),
            client_secret: "s".into(),
        };
        assert!(cred.is_expired(Utc::now()));
    }

    #[test]
    fn filter_matches() {
        let payload = PointPayload {
            file_path: LogicalPath::parse("docs/a/b.txt").unwrap(),
            folder_path: LogicalPath::parse("docs/a").unwrap(),
            ordinal: 0,
            text: "hello".into(),
            token_count: 1,
            file_mime: "text/plain".into(),
        };

        assert!(VectorFilter::for_folder(LogicalPath::parse("docs").unwrap()).matches(&payload));
        assert!(!VectorFilter::for_folder(LogicalPath::parse("other").unwrap()).matches(&payload));
        assert!(
            VectorFilter::for_file(LogicalPath::parse("docs/a/b.txt").unwrap()).matches(&payload)
        );

        let excluded = VectorFilter {
            exclude_folders: vec![LogicalPath::parse("docs").unwrap()],
            ..Default::default()
        };
        assert!(!excluded.matches(&payload));

        let mime = VectorFilter {
            mime_types: Some(vec!["application/pdf".into()]),
            ..Default::default()
        };
        assert!(!mime.matches(&payload));
    }
}
