//! # lorebase
//!
//! Self-hosted knowledge base. Watches a managed directory tree, pulls
//! remote sources into it, indexes textual content into a hybrid vector
//! index, and serves search through an MCP tool surface (the HTTP/WebSocket
//! UI layer consumes the same services externally).
//!
//! ```bash
//! # Serve with defaults (./data as the managed root)
//! lorebase serve
//!
//! # One-shot index of a folder, then exit
//! lorebase index docs
//!
//! # Query from the shell
//! lorebase query "deployment checklist" --limit 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod mcp;
mod services;

use config::Config;
use mcp::McpSurface;
use services::Services;

#[derive(Parser)]
#[command(name = "lorebase")]
#[command(about = "Self-hosted knowledge base: watch, sync, index, search")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full service: observer, indexer, sync, MCP surface
    Serve,

    /// Enable and index one folder, wait for completion, then exit
    Index {
        /// Folder path relative to the managed root
        folder: String,
    },

    /// Run a single search query and print the results
    Query {
        query: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let config = Config::from_env();

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Index { folder } => index_once(config, &folder).await,
        Commands::Query { query, limit } => query_once(config, &query, limit).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let transport = config.mcp_transport.clone();
    let services = Services::init(config).await?;
    let running = services.serve().await?;

    match transport.as_str() {
        "stdio" => {
            info!("serving MCP over stdio");
            let surface = McpSurface::new(Arc::clone(&services), None);
            let server = surface
                .serve((tokio::io::stdin(), tokio::io::stdout()))
                .await
                .context("MCP server failed to start")?;
            server.waiting().await.context("MCP server errored")?;
        }
        other => {
            // Other transports terminate in the external HTTP layer; the
            // process just runs the pipeline until interrupted.
            info!("transport '{other}' is served externally; running pipeline only");
            tokio::signal::ctrl_c().await.context("signal wait failed")?;
        }
    }

    services.drain_and_close(running).await;
    Ok(())
}

async fn index_once(config: Config, folder: &str) -> Result<()> {
    let services = Services::init(config).await?;
    let path = lorebase_core::LogicalPath::parse(folder)?;
    services.state.set_folder_enabled(&path, true).await?;
    let summary = services.indexer.scan(&path).await?;
    println!(
        "indexed {} files ({} chunks), {} skipped, {} failed",
        summary.files_indexed, summary.total_chunks, summary.files_skipped, summary.files_failed
    );
    services.state.close().await;
    Ok(())
}

async fn query_once(config: Config, query: &str, limit: usize) -> Result<()> {
    let services = Services::init(config).await?;
    let hits = services
        .search
        .search(&lorebase_search::SearchRequest {
            query: query.to_string(),
            limit: Some(limit),
            ..Default::default()
        })
        .await?;

    if hits.is_empty() {
        println!("no results");
    }
    for hit in hits {
        println!("{:.3}  {}#{}", hit.score, hit.file_path, hit.chunk_ordinal);
        for line in hit.chunk_text.lines().take(3) {
            println!("    {line}");
        }
    }
    services.state.close().await;
    Ok(())
}
