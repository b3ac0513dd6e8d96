//! mnema MCP server
//!
//! Persistent memory for autonomous agents over the Model Context
//! Protocol:
//!
//! - Write Guard admission: every write classified as add/update/merge/skip
//! - Hybrid retrieval: BM25 over a CJK-aware index fused with semantic
//!   search, weighted by query intent, priority, recency, and vitality
//! - Ebbinghaus forgetting: memories decay unless recalled; recall
//!   strengthens them
//! - Sleep cycle: decay, tidy, and govern maintenance phases
//!
//! Storage is a single SQLite file; configuration arrives through
//! `AGENT_MEMORY_*` environment variables (see `config.rs`).

mod config;
mod engine;
mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mnema_core::Store;

use crate::config::Config;
use crate::engine::Engine;
use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments; returns an optional database path
/// override. Exits for `--help`/`--version`.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("mnema MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Persistent agent memory over the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    mnema-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help         Print help information");
                println!("    -V, --version      Print version information");
                println!("    --db <PATH>        Database file (overrides AGENT_MEMORY_DB)");
                println!();
                println!("ENVIRONMENT:");
                println!("    AGENT_MEMORY_DB                     Database file path");
                println!("    AGENT_MEMORY_AGENT_ID               Tenant scope");
                println!("    AGENT_MEMORY_EMBEDDINGS_PROVIDER    none|openai|gemini|qwen|dashscope");
                println!("    AGENT_MEMORY_RERANK_PROVIDER        none|openai|jina|cohere");
                println!("    RUST_LOG                            Log filter (logs go to stderr)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("mnema-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--db" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --db requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--db=") => {
                let path = arg.strip_prefix("--db=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --db requires a path argument");
                    std::process::exit(1);
                }
                db_path = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'mnema-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    db_path
}

#[tokio::main]
async fn main() {
    let db_override = parse_args();

    // Logging to stderr; stdout carries JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("mnema MCP server v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if let Some(path) = db_override {
        config.db_path = path;
    }

    let store = match Store::open(Some(config.db_path.clone())) {
        Ok(store) => {
            info!(
                path = %config.db_path.display(),
                schema_version = store.schema_version(),
                "store opened"
            );
            Arc::new(store)
        }
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let providers = config.build_providers();
    match providers.embedding.as_deref() {
        Some(provider) => info!(
            provider = provider.id(),
            model = provider.model(),
            "embeddings enabled, hybrid search active"
        ),
        None => info!("no embeddings provider, retrieval is BM25-only"),
    }

    let engine = Engine::new(store, providers, config.agent_id.clone());
    let server = McpServer::new(engine);
    let transport = StdioTransport::new();

    info!(agent = %config.agent_id, "serving MCP on stdio");
    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("mnema MCP server shutting down");
}
