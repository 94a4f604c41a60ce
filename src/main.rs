//! MCP server over an in-memory document store.
//!
//! Run with `docstore-mcp` (public tools) or `docstore-mcp --exposure all`.

use std::sync::Arc;

use clap::builder::PossibleValuesParser;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docstore_mcp::{
    resolve_providers, CollisionPolicy, DocStore, Exposure, McpServer, ServerConfig, ToolRegistry,
    PROVIDER_NAMES,
};

/// MCP server for an in-memory document store.
///
/// Exposes database, collection and document operations as MCP tools for AI agents.
/// Communicates via JSON-RPC 2.0 over stdin/stdout.
#[derive(Parser)]
#[command(name = "docstore-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Which tool set to expose when no --provider is given.
    #[arg(long, value_enum, default_value_t = Exposure::Public)]
    exposure: Exposure,

    /// Register only the named provider (repeatable).
    #[arg(
        long = "provider",
        value_name = "NAME",
        value_parser = PossibleValuesParser::new(PROVIDER_NAMES.iter().copied())
    )]
    providers: Vec<String>,

    /// Reject every call made before `initialize`.
    #[arg(long)]
    require_init: bool,

    /// Let a later provider replace an earlier tool of the same name
    /// instead of failing at startup.
    #[arg(long)]
    allow_tool_override: bool,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> ServerConfig {
        ServerConfig {
            exposure: self.exposure,
            providers: self.providers.clone(),
            require_initialize: self.require_init,
            collision: if self.allow_tool_override {
                CollisionPolicy::LastWins
            } else {
                CollisionPolicy::Reject
            },
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "docstore_mcp=debug"
    } else {
        "docstore_mcp=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries the protocol; logs go to stderr only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.config();
    let store = Arc::new(DocStore::new());
    let providers = resolve_providers(&config.provider_names(), &store);

    let registry = match ToolRegistry::register(&providers, config.collision) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to build tool registry: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        tools = registry.len(),
        providers = registry.provider_names().len(),
        "Server ready, listening on stdin"
    );

    let mut server = McpServer::new(registry, config);
    let transport = tokio::spawn(async move { server.run().await });

    match transport.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Transport failed: {}", e);
            eprintln!("Error: Server error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Transport task aborted: {}", e);
            eprintln!("Error: Server task failed: {}", e);
            std::process::exit(1);
        }
    }
}
