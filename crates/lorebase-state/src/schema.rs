//! SQLite schema.
//!
//! Ownership is strictly hierarchical: a folder owns its files, a file owns
//! its chunks. Deletions propagate top-down through explicit statements (no
//! FK cascades, so folder removal stays a single pass per table).

/// Statements applied on startup. `IF NOT EXISTS` keeps them idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS folders (
        path                TEXT PRIMARY KEY,
        indexing_enabled    INTEGER NOT NULL DEFAULT 0,
        index_status        TEXT NOT NULL DEFAULT 'none',
        index_error         TEXT,
        indexed_at          TEXT,
        sync_status         TEXT NOT NULL DEFAULT 'idle',
        last_synced_at      TEXT,
        last_sync_error     TEXT,
        metadata_text       TEXT,
        metadata_updated_by TEXT,
        updated_at          TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        path              TEXT PRIMARY KEY,
        folder_path       TEXT NOT NULL,
        size              INTEGER NOT NULL,
        mtime             TEXT,
        content_hash      TEXT NOT NULL,
        mime              TEXT NOT NULL,
        index_status      TEXT NOT NULL DEFAULT 'pending',
        indexed_at        TEXT,
        indexed_hash      TEXT,
        chunk_count       INTEGER,
        embedding_version INTEGER NOT NULL DEFAULT 0,
        error_message     TEXT,
        updated_at        TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_files_folder ON files (folder_path)",
    r#"
    CREATE TABLE IF NOT EXISTS chunks (
        file_path         TEXT NOT NULL,
        ordinal           INTEGER NOT NULL,
        text              TEXT NOT NULL,
        token_count       INTEGER NOT NULL,
        char_start        INTEGER NOT NULL,
        char_end          INTEGER NOT NULL,
        embedding_version INTEGER NOT NULL,
        dense_vector_id   TEXT NOT NULL,
        sparse_vector_id  TEXT,
        PRIMARY KEY (file_path, ordinal)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_sources (
        folder_path TEXT PRIMARY KEY,
        source_json TEXT NOT NULL,
        cursor_json TEXT,
        updated_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_folder_visibility (
        user        TEXT NOT NULL,
        folder_path TEXT NOT NULL,
        active      INTEGER NOT NULL DEFAULT 1,
        updated_at  TEXT NOT NULL,
        PRIMARY KEY (user, folder_path)
    )
    "#,
];
