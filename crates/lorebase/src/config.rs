//! Environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The managed root directory.
    pub root_path: PathBuf,
    /// SQLite state database.
    pub db_path: PathBuf,
    pub vector_host: String,
    pub vector_port: u16,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub index_workers: usize,
    pub indexing_poll_interval: Duration,
    pub sync_interval: Duration,
    pub mcp_port: u16,
    pub mcp_transport: String,
    pub mcp_search_limit: usize,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Read configuration from the environment, with defaults matching a
    /// local single-process deployment.
    pub fn from_env() -> Self {
        Self {
            root_path: PathBuf::from(env_or("LOREBASE_ROOT_PATH", "./data")),
            db_path: PathBuf::from(env_or("LOREBASE_DB_PATH", "./lorebase.db")),
            vector_host: env_or("VECTOR_HOST", "localhost"),
            vector_port: env_parse("VECTOR_PORT", 6334),
            embedding_model: env_or("EMBEDDING_MODEL", "feature-hash"),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", 384),
            chunk_size: env_parse("CHUNK_SIZE", 512),
            chunk_overlap: env_parse("CHUNK_OVERLAP", 50),
            index_workers: env_parse("INDEX_WORKERS", 2),
            indexing_poll_interval: Duration::from_secs(env_parse("INDEXING_POLL_INTERVAL", 10)),
            sync_interval: Duration::from_secs(env_parse("SYNC_INTERVAL", 900)),
            mcp_port: env_parse("MCP_PORT", 8001),
            mcp_transport: env_or("MCP_TRANSPORT", "stdio"),
            mcp_search_limit: env_parse("MCP_SEARCH_LIMIT", 20),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = Config::from_env();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.index_workers, 2);
        assert_eq!(config.mcp_transport, "stdio");
    }
}
