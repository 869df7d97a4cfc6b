//! Recall MCP Server
//!
//! Run with: recall-server

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recall::error::Result;
use recall::mcp::{McpServer, RecallHandler};
use recall::service::MemoryService;
use recall::types::{StoreConfig, DEFAULT_JOURNAL_COMPACT_THRESHOLD};

#[derive(Parser, Debug)]
#[command(name = "recall-server")]
#[command(about = "Recall MCP server for persistent AI memory")]
#[command(version)]
struct Args {
    /// Memory store directory
    #[arg(long, env = "MEMORY_DIR", default_value = "~/.mcp-memory")]
    memory_dir: String,

    /// Index journal entries kept before writing a fresh snapshot
    #[arg(long, env = "RECALL_COMPACT_AFTER", default_value_t = DEFAULT_JOURNAL_COMPACT_THRESHOLD)]
    compact_after: usize,

    /// Log as JSON lines
    #[arg(long, env = "RECALL_LOG_JSON")]
    log_json: bool,
}

fn init_logging(json: bool) {
    // stdout carries the protocol, so logs go to stderr
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::from_default_env());
    if json {
        registry.with(fmt.json()).init();
    } else {
        registry.with(fmt).init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let root = shellexpand::tilde(&args.memory_dir).to_string();
    let config = StoreConfig {
        root: root.into(),
        journal_compact_threshold: args.compact_after,
    };

    let service = match MemoryService::open(config) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Error initializing memory store: {}", e);
            return Err(e);
        }
    };

    let server = McpServer::new(RecallHandler::new(service));

    tracing::info!("Recall MCP server running on stdio");
    server.run()?;

    Ok(())
}
