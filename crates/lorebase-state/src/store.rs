//! The state store: durable metadata behind every pipeline decision.
//!
//! All mutations go through this API and are serialized per row by SQLite
//! transactions; readers never take locks (WAL mode allows concurrent
//! readers with one writer). The one multi-statement guarantee callers rely
//! on is [`StateStore::swap_chunks`]: the chunk replacement commits in the
//! same transaction as the file's `indexed` transition, so a reader never
//! observes a stale `chunk_count`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use lorebase_core::{
    ChunkRecord, Error, ExtensionStat, FileRecord, FolderRecord, IndexStatus, LogicalPath,
    StoreError, SyncCursor, SyncSource, SyncStatus,
};

/// Per-folder aggregate used by folder listings.
#[derive(Debug, Clone, Default)]
pub struct FolderStats {
    pub file_count: u64,
    pub chunk_count: u64,
}

/// SQLite-backed metadata store.
pub struct StateStore {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Query(e.to_string()),
    }
}

impl StateStore {
    /// Open (creating if missing) the database at `db_path` with WAL mode.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Init(e.to_string()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(db_err)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        info!("state store ready at {}", db_path.display());
        Ok(store)
    }

    /// An isolated in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(db_err)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in crate::schema::SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================================================================
    // Folders
    // ========================================================================

    pub async fn get_folder(&self, path: &LogicalPath) -> Result<Option<FolderRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM folders WHERE path = ?")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| folder_from_row(&r)).transpose()
    }

    pub async fn list_folders(&self) -> Result<Vec<FolderRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM folders ORDER BY path")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(folder_from_row).collect()
    }

    /// Create the folder row if it does not exist yet.
    pub async fn ensure_folder(&self, path: &LogicalPath) -> Result<FolderRecord, StoreError> {
        sqlx::query(
            "INSERT INTO folders (path, updated_at) VALUES (?, ?)
             ON CONFLICT(path) DO NOTHING",
        )
        .bind(path.as_str())
        .bind(now_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(self
            .get_folder(path)
            .await?
            .unwrap_or_else(|| FolderRecord::new(path.clone())))
    }

    pub async fn delete_folder(&self, path: &LogicalPath) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let like = prefix_pattern(path);

        sqlx::query(
            "DELETE FROM chunks WHERE file_path IN
             (SELECT path FROM files WHERE folder_path = ? OR folder_path LIKE ?)",
        )
        .bind(path.as_str())
        .bind(&like)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM files WHERE folder_path = ? OR folder_path LIKE ?")
            .bind(path.as_str())
            .bind(&like)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("DELETE FROM sync_sources WHERE folder_path = ? OR folder_path LIKE ?")
            .bind(path.as_str())
            .bind(&like)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("DELETE FROM folders WHERE path = ? OR path LIKE ?")
            .bind(path.as_str())
            .bind(&like)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    pub async fn set_folder_enabled(
        &self,
        path: &LogicalPath,
        enabled: bool,
    ) -> Result<(), StoreError> {
        self.ensure_folder(path).await?;
        sqlx::query("UPDATE folders SET indexing_enabled = ?, updated_at = ? WHERE path = ?")
            .bind(enabled as i64)
            .bind(now_str())
            .bind(path.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_folder_index_status(
        &self,
        path: &LogicalPath,
        status: IndexStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.ensure_folder(path).await?;
        let indexed_at = if status == IndexStatus::Indexed {
            Some(now_str())
        } else {
            None
        };
        sqlx::query(
            "UPDATE folders SET index_status = ?, index_error = ?,
             indexed_at = COALESCE(?, indexed_at), updated_at = ? WHERE path = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(indexed_at)
        .bind(now_str())
        .bind(path.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_folder_sync_status(
        &self,
        path: &LogicalPath,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.ensure_folder(path).await?;
        let synced_at = if status == SyncStatus::Synced {
            Some(now_str())
        } else {
            None
        };
        sqlx::query(
            "UPDATE folders SET sync_status = ?, last_sync_error = ?,
             last_synced_at = COALESCE(?, last_synced_at), updated_at = ? WHERE path = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(synced_at)
        .bind(now_str())
        .bind(path.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_metadata(
        &self,
        path: &LogicalPath,
        text: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<(), StoreError> {
        self.ensure_folder(path).await?;
        sqlx::query(
            "UPDATE folders SET metadata_text = ?, metadata_updated_by = ?, updated_at = ?
             WHERE path = ?",
        )
        .bind(text)
        .bind(updated_by)
        .bind(now_str())
        .bind(path.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Free-form metadata attached to a folder path.
    pub async fn get_metadata(&self, path: &LogicalPath) -> Result<Option<String>, StoreError> {
        Ok(self.get_folder(path).await?.and_then(|f| f.metadata_text))
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub async fn get_file(&self, path: &LogicalPath) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM files WHERE path = ?")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| file_from_row(&r)).transpose()
    }

    /// Files whose containing folder is `folder` or below it.
    pub async fn list_files_under(
        &self,
        folder: &LogicalPath,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let rows = if folder.is_root() {
            sqlx::query("SELECT * FROM files ORDER BY path")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?
        } else {
            sqlx::query(
                "SELECT * FROM files WHERE folder_path = ? OR folder_path LIKE ? ORDER BY path",
            )
            .bind(folder.as_str())
            .bind(prefix_pattern(folder))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        };
        rows.iter().map(file_from_row).collect()
    }

    pub async fn upsert_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO files (path, folder_path, size, mtime, content_hash, mime,
                               index_status, indexed_at, indexed_hash, chunk_count,
                               embedding_version, error_message, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                folder_path = excluded.folder_path,
                size = excluded.size,
                mtime = excluded.mtime,
                content_hash = excluded.content_hash,
                mime = excluded.mime,
                index_status = excluded.index_status,
                indexed_at = excluded.indexed_at,
                indexed_hash = excluded.indexed_hash,
                chunk_count = excluded.chunk_count,
                embedding_version = excluded.embedding_version,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(file.path.as_str())
        .bind(file.folder_path.as_str())
        .bind(file.size as i64)
        .bind(file.mtime.map(|t| t.to_rfc3339()))
        .bind(&file.content_hash)
        .bind(&file.mime)
        .bind(file.index_status.as_str())
        .bind(file.indexed_at.map(|t| t.to_rfc3339()))
        .bind(file.indexed_hash.as_deref())
        .bind(file.chunk_count.map(|c| c as i64))
        .bind(file.embedding_version as i64)
        .bind(file.error_message.as_deref())
        .bind(now_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_file_status(
        &self,
        path: &LogicalPath,
        status: IndexStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE files SET index_status = ?, error_message = ?, updated_at = ? WHERE path = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now_str())
        .bind(path.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Atomically replace a file's chunk set and mark it indexed.
    ///
    /// The delete, the inserts, and the `indexed` transition (with
    /// `indexed_hash`, `chunk_count`, `indexed_at`) commit together.
    pub async fn swap_chunks(
        &self,
        path: &LogicalPath,
        chunks: &[ChunkRecord],
        indexed_hash: &str,
        embedding_version: u32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM chunks WHERE file_path = ?")
            .bind(path.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (file_path, ordinal, text, token_count, char_start,
                                    char_end, embedding_version, dense_vector_id,
                                    sparse_vector_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.file_path.as_str())
            .bind(chunk.ordinal as i64)
            .bind(&chunk.text)
            .bind(chunk.token_count as i64)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(chunk.embedding_version as i64)
            .bind(chunk.dense_vector_id.to_string())
            .bind(chunk.sparse_vector_id.map(|u| u.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            "UPDATE files SET index_status = 'indexed', indexed_hash = ?, chunk_count = ?,
             embedding_version = ?, indexed_at = ?, error_message = NULL, updated_at = ?
             WHERE path = ?",
        )
        .bind(indexed_hash)
        .bind(chunks.len() as i64)
        .bind(embedding_version as i64)
        .bind(now_str())
        .bind(now_str())
        .bind(path.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!("swapped {} chunks for {}", chunks.len(), path);
        Ok(())
    }

    /// Remove a file row together with its chunks.
    pub async fn delete_file(&self, path: &LogicalPath) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM chunks WHERE file_path = ?")
            .bind(path.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let result = sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_chunks(&self, path: &LogicalPath) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE file_path = ? ORDER BY ordinal")
            .bind(path.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(chunk_from_row).collect()
    }

    /// Chunks with `start <= ordinal <= end`, in order.
    pub async fn get_chunk_range(
        &self,
        path: &LogicalPath,
        start: u32,
        end: u32,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE file_path = ? AND ordinal >= ? AND ordinal <= ?
             ORDER BY ordinal",
        )
        .bind(path.as_str())
        .bind(start as i64)
        .bind(end as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(chunk_from_row).collect()
    }

    // ========================================================================
    // Sync sources
    // ========================================================================

    pub async fn get_sync_source(
        &self,
        folder: &LogicalPath,
    ) -> Result<Option<SyncSource>, StoreError> {
        let row = sqlx::query("SELECT source_json FROM sync_sources WHERE folder_path = ?")
            .bind(folder.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(r) => {
                let json: String = r.get("source_json");
                serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| StoreError::Query(format!("bad sync source json: {e}")))
            }
            None => Ok(None),
        }
    }

    /// Attach or replace a folder's sync source.
    ///
    /// A folder that already has a source keeps it unless `replace` is set;
    /// sources are swapped wholesale, never edited field-by-field.
    pub async fn set_sync_source(
        &self,
        folder: &LogicalPath,
        source: &SyncSource,
        replace: bool,
    ) -> Result<(), Error> {
        self.ensure_folder(folder).await?;
        if !replace && self.get_sync_source(folder).await?.is_some() {
            return Err(Error::Conflict(format!(
                "folder '{folder}' already has a sync source; replace it explicitly"
            )));
        }
        let json = serde_json::to_string(source)?;
        sqlx::query(
            r#"
            INSERT INTO sync_sources (folder_path, source_json, cursor_json, updated_at)
            VALUES (?, ?, NULL, ?)
            ON CONFLICT(folder_path) DO UPDATE SET
                source_json = excluded.source_json,
                cursor_json = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(folder.as_str())
        .bind(json)
        .bind(now_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(db_err(e)))?;
        Ok(())
    }

    pub async fn clear_sync_source(&self, folder: &LogicalPath) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sync_sources WHERE folder_path = ?")
            .bind(folder.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_sync_cursor(&self, folder: &LogicalPath) -> Result<SyncCursor, StoreError> {
        let row = sqlx::query("SELECT cursor_json FROM sync_sources WHERE folder_path = ?")
            .bind(folder.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row.and_then(|r| r.get::<Option<String>, _>("cursor_json")) {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Query(format!("bad sync cursor json: {e}"))),
            None => Ok(SyncCursor::default()),
        }
    }

    pub async fn set_sync_cursor(
        &self,
        folder: &LogicalPath,
        cursor: &SyncCursor,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(cursor)
            .map_err(|e| StoreError::Write(format!("cursor encode: {e}")))?;
        sqlx::query("UPDATE sync_sources SET cursor_json = ?, updated_at = ? WHERE folder_path = ?")
            .bind(json)
            .bind(now_str())
            .bind(folder.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ========================================================================
    // Per-user visibility
    // ========================================================================

    pub async fn set_visibility(
        &self,
        user: &str,
        folder: &LogicalPath,
        active: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_folder_visibility (user, folder_path, active, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user, folder_path) DO UPDATE SET
                active = excluded.active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user)
        .bind(folder.as_str())
        .bind(active as i64)
        .bind(now_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Visibility defaults to true when the user never toggled the folder.
    pub async fn get_visibility(
        &self,
        user: &str,
        folder: &LogicalPath,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT active FROM user_folder_visibility WHERE user = ? AND folder_path = ?",
        )
        .bind(user)
        .bind(folder.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| r.get::<i64, _>("active") != 0).unwrap_or(true))
    }

    pub async fn visibility_map(&self, user: &str) -> Result<BTreeMap<String, bool>, StoreError> {
        let rows =
            sqlx::query("SELECT folder_path, active FROM user_folder_visibility WHERE user = ?")
                .bind(user)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("folder_path"), r.get::<i64, _>("active") != 0))
            .collect())
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub async fn folder_stats(&self, folder: &LogicalPath) -> Result<FolderStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS files, COALESCE(SUM(chunk_count), 0) AS chunks
             FROM files WHERE (folder_path = ? OR folder_path LIKE ?) AND index_status = 'indexed'",
        )
        .bind(folder.as_str())
        .bind(prefix_pattern(folder))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(FolderStats {
            file_count: row.get::<i64, _>("files") as u64,
            chunk_count: row.get::<i64, _>("chunks") as u64,
        })
    }

    /// Per-extension file and chunk counts within a folder subtree.
    pub async fn extension_stats(
        &self,
        folder: &LogicalPath,
    ) -> Result<Vec<ExtensionStat>, StoreError> {
        let files = self.list_files_under(folder).await?;
        let mut by_ext: BTreeMap<String, ExtensionStat> = BTreeMap::new();
        for file in files {
            let ext = file.path.extension().unwrap_or_else(|| "(none)".to_string());
            let entry = by_ext.entry(ext.clone()).or_insert_with(|| ExtensionStat {
                extension: ext,
                file_count: 0,
                chunk_count: 0,
            });
            entry.file_count += 1;
            entry.chunk_count += u64::from(file.chunk_count.unwrap_or(0));
        }
        Ok(by_ext.into_values().collect())
    }
}

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

/// SQL LIKE pattern matching everything strictly below `folder`.
fn prefix_pattern(folder: &LogicalPath) -> String {
    if folder.is_root() {
        "%".to_string()
    } else {
        format!("{}/%", folder.as_str())
    }
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn parse_path(raw: String) -> Result<LogicalPath, StoreError> {
    LogicalPath::parse(&raw).map_err(|e| StoreError::Query(format!("bad stored path: {e}")))
}

fn folder_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FolderRecord, StoreError> {
    Ok(FolderRecord {
        path: parse_path(row.get("path"))?,
        indexing_enabled: row.get::<i64, _>("indexing_enabled") != 0,
        index_status: IndexStatus::parse(&row.get::<String, _>("index_status")),
        index_error: row.get("index_error"),
        indexed_at: parse_time(row.get("indexed_at")),
        sync_status: SyncStatus::parse(&row.get::<String, _>("sync_status")),
        last_synced_at: parse_time(row.get("last_synced_at")),
        last_sync_error: row.get("last_sync_error"),
        metadata_text: row.get("metadata_text"),
        metadata_updated_by: row.get("metadata_updated_by"),
    })
}

fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord, StoreError> {
    Ok(FileRecord {
        path: parse_path(row.get("path"))?,
        folder_path: parse_path(row.get("folder_path"))?,
        size: row.get::<i64, _>("size") as u64,
        mtime: parse_time(row.get("mtime")),
        content_hash: row.get("content_hash"),
        mime: row.get("mime"),
        index_status: IndexStatus::parse(&row.get::<String, _>("index_status")),
        indexed_at: parse_time(row.get("indexed_at")),
        indexed_hash: row.get("indexed_hash"),
        chunk_count: row.get::<Option<i64>, _>("chunk_count").map(|c| c as u32),
        embedding_version: row.get::<i64, _>("embedding_version") as u32,
        error_message: row.get("error_message"),
    })
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord, StoreError> {
    let dense: String = row.get("dense_vector_id");
    let sparse: Option<String> = row.get("sparse_vector_id");
    Ok(ChunkRecord {
        file_path: parse_path(row.get("file_path"))?,
        ordinal: row.get::<i64, _>("ordinal") as u32,
        text: row.get("text"),
        token_count: row.get::<i64, _>("token_count") as u32,
        char_start: row.get::<i64, _>("char_start") as u32,
        char_end: row.get::<i64, _>("char_end") as u32,
        embedding_version: row.get::<i64, _>("embedding_version") as u32,
        dense_vector_id: Uuid::parse_str(&dense)
            .map_err(|e| StoreError::Query(format!("bad vector id: {e}")))?,
        sparse_vector_id: sparse
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| StoreError::Query(format!("bad vector id: {e}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebase_core::chunk_point_id;

    fn path(s: &str) -> LogicalPath {
        LogicalPath::parse(s).unwrap()
    }

    fn sample_file(p: &str, folder: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path(p),
            folder_path: path(folder),
            size: 42,
            mtime: Some(Utc::now()),
            content_hash: hash.into(),
            mime: "text/plain".into(),
            index_status: IndexStatus::Pending,
            indexed_at: None,
            indexed_hash: None,
            chunk_count: None,
            embedding_version: 1,
            error_message: None,
        }
    }

    fn sample_chunks(p: &str, n: u32) -> Vec<ChunkRecord> {
        (0..n)
            .map(|i| ChunkRecord {
                file_path: path(p),
                ordinal: i,
                text: format!("chunk {i}"),
                token_count: 2,
                char_start: i * 10,
                char_end: i * 10 + 7,
                embedding_version: 1,
                dense_vector_id: chunk_point_id(&path(p), i, 1),
                sparse_vector_id: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn folder_lifecycle() {
        let store = StateStore::in_memory().await.unwrap();
        let docs = path("docs");

        let folder = store.ensure_folder(&docs).await.unwrap();
        assert!(!folder.indexing_enabled);
        assert_eq!(folder.index_status, IndexStatus::None);

        store.set_folder_enabled(&docs, true).await.unwrap();
        store
            .set_folder_index_status(&docs, IndexStatus::Pending, None)
            .await
            .unwrap();

        let folder = store.get_folder(&docs).await.unwrap().unwrap();
        assert!(folder.indexing_enabled);
        assert_eq!(folder.index_status, IndexStatus::Pending);

        store
            .set_folder_index_status(&docs, IndexStatus::Indexed, None)
            .await
            .unwrap();
        let folder = store.get_folder(&docs).await.unwrap().unwrap();
        assert!(folder.indexed_at.is_some());
    }

    #[tokio::test]
    async fn swap_chunks_is_atomic_transition() {
        let store = StateStore::in_memory().await.unwrap();
        let file_path = path("docs/a.txt");
        store.upsert_file(&sample_file("docs/a.txt", "docs", "h1")).await.unwrap();

        store
            .swap_chunks(&file_path, &sample_chunks("docs/a.txt", 3), "h1", 1)
            .await
            .unwrap();

        let file = store.get_file(&file_path).await.unwrap().unwrap();
        assert_eq!(file.index_status, IndexStatus::Indexed);
        assert_eq!(file.indexed_hash.as_deref(), Some("h1"));
        assert_eq!(file.chunk_count, Some(3));
        assert!(file.indexed_at.is_some());

        let chunks = store.get_chunks(&file_path).await.unwrap();
        assert_eq!(chunks.len(), 3);
        let ordinals: Vec<u32> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);

        // Re-swap with fewer chunks: old set fully replaced.
        store
            .swap_chunks(&file_path, &sample_chunks("docs/a.txt", 2), "h2", 1)
            .await
            .unwrap();
        let chunks = store.get_chunks(&file_path).await.unwrap();
        assert_eq!(chunks.len(), 2);
        let file = store.get_file(&file_path).await.unwrap().unwrap();
        assert_eq!(file.indexed_hash.as_deref(), Some("h2"));
        assert_eq!(file.chunk_count, Some(2));
    }

    #[tokio::test]
    async fn chunk_range_query() {
        let store = StateStore::in_memory().await.unwrap();
        store.upsert_file(&sample_file("docs/a.txt", "docs", "h")).await.unwrap();
        store
            .swap_chunks(&path("docs/a.txt"), &sample_chunks("docs/a.txt", 5), "h", 1)
            .await
            .unwrap();

        let range = store.get_chunk_range(&path("docs/a.txt"), 1, 3).await.unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].ordinal, 1);
        assert_eq!(range[2].ordinal, 3);
    }

    #[tokio::test]
    async fn delete_file_removes_chunks() {
        let store = StateStore::in_memory().await.unwrap();
        store.upsert_file(&sample_file("docs/a.txt", "docs", "h")).await.unwrap();
        store
            .swap_chunks(&path("docs/a.txt"), &sample_chunks("docs/a.txt", 2), "h", 1)
            .await
            .unwrap();

        assert!(store.delete_file(&path("docs/a.txt")).await.unwrap());
        assert!(store.get_file(&path("docs/a.txt")).await.unwrap().is_none());
        assert!(store.get_chunks(&path("docs/a.txt")).await.unwrap().is_empty());
        assert!(!store.delete_file(&path("docs/a.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn list_files_under_is_recursive() {
        let store = StateStore::in_memory().await.unwrap();
        store.upsert_file(&sample_file("docs/a.txt", "docs", "h")).await.unwrap();
        store.upsert_file(&sample_file("docs/sub/b.txt", "docs/sub", "h")).await.unwrap();
        store.upsert_file(&sample_file("other/c.txt", "other", "h")).await.unwrap();

        let under_docs = store.list_files_under(&path("docs")).await.unwrap();
        assert_eq!(under_docs.len(), 2);

        let all = store.list_files_under(&LogicalPath::root()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn sync_source_replace_conflict() {
        let store = StateStore::in_memory().await.unwrap();
        let docs = path("docs");
        let src = SyncSource::Github {
            repo: "octo/site".into(),
            branch: "main".into(),
            path: String::new(),
            token: None,
        };

        store.set_sync_source(&docs, &src, false).await.unwrap();
        let got = store.get_sync_source(&docs).await.unwrap().unwrap();
        assert_eq!(got.provider(), "github");

        let other = SyncSource::Jira {
            base_url: "https://example.atlassian.net".into(),
            project_key: "KB".into(),
            email: "a@b.c".into(),
            api_token: "t".into(),
        };
        let err = store.set_sync_source(&docs, &other, false).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        store.set_sync_source(&docs, &other, true).await.unwrap();
        let got = store.get_sync_source(&docs).await.unwrap().unwrap();
        assert_eq!(got.provider(), "jira");
    }

    #[tokio::test]
    async fn sync_cursor_round_trip() {
        let store = StateStore::in_memory().await.unwrap();
        let docs = path("docs");
        let src = SyncSource::Github {
            repo: "octo/site".into(),
            branch: "main".into(),
            path: String::new(),
            token: None,
        };
        store.set_sync_source(&docs, &src, false).await.unwrap();

        assert!(store.get_sync_cursor(&docs).await.unwrap().entries.is_empty());

        let mut cursor = SyncCursor::default();
        cursor.entries.insert("README.md".into(), "sha1".into());
        store.set_sync_cursor(&docs, &cursor).await.unwrap();

        let back = store.get_sync_cursor(&docs).await.unwrap();
        assert_eq!(back.entries.get("README.md").map(String::as_str), Some("sha1"));

        // Replacing the source resets the cursor.
        store.set_sync_source(&docs, &src, true).await.unwrap();
        assert!(store.get_sync_cursor(&docs).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn visibility_defaults_true() {
        let store = StateStore::in_memory().await.unwrap();
        let docs = path("docs");

        assert!(store.get_visibility("alice", &docs).await.unwrap());

        store.set_visibility("alice", &docs, false).await.unwrap();
        assert!(!store.get_visibility("alice", &docs).await.unwrap());
        assert!(store.get_visibility("bob", &docs).await.unwrap());

        let map = store.visibility_map("alice").await.unwrap();
        assert_eq!(map.get("docs"), Some(&false));
    }

    #[tokio::test]
    async fn extension_stats_grouping() {
        let store = StateStore::in_memory().await.unwrap();
        let mut f1 = sample_file("docs/a.txt", "docs", "h");
        f1.chunk_count = Some(3);
        let mut f2 = sample_file("docs/b.txt", "docs", "h");
        f2.chunk_count = Some(2);
        let mut f3 = sample_file("docs/c.pdf", "docs", "h");
        f3.chunk_count = Some(7);
        for f in [&f1, &f2, &f3] {
            store.upsert_file(f).await.unwrap();
        }

        let stats = store.extension_stats(&path("docs")).await.unwrap();
        let txt = stats.iter().find(|s| s.extension == "txt").unwrap();
        assert_eq!(txt.file_count, 2);
        assert_eq!(txt.chunk_count, 5);
        let pdf = stats.iter().find(|s| s.extension == "pdf").unwrap();
        assert_eq!(pdf.file_count, 1);
    }

    #[tokio::test]
    async fn delete_folder_cascades() {
        let store = StateStore::in_memory().await.unwrap();
        store.set_folder_enabled(&path("docs"), true).await.unwrap();
        store.upsert_file(&sample_file("docs/a.txt", "docs", "h")).await.unwrap();
        store
            .swap_chunks(&path("docs/a.txt"), &sample_chunks("docs/a.txt", 2), "h", 1)
            .await
            .unwrap();

        store.delete_folder(&path("docs")).await.unwrap();
        assert!(store.get_folder(&path("docs")).await.unwrap().is_none());
        assert!(store.get_file(&path("docs/a.txt")).await.unwrap().is_none());
        assert!(store.get_chunks(&path("docs/a.txt")).await.unwrap().is_empty());
    }
}
