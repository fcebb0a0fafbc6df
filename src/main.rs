//! tiddly-mcp binary: serve a tiddler store to MCP clients over HTTP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tiddly_mcp::{
    ConfigOverrides, Gateway, GatewayConfig, LogLevel, McpEngine, MemoryWiki, ToolRegistry,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INSTRUCTIONS: &str = "Tools for a TiddlyWiki. Tiddlers are titled notes with text, tags \
                            and other fields. Use list_tiddlers with a filter to find tiddlers \
                            by tag or title, search_tiddlers for text, and read_tiddler to get \
                            a tiddler's full content.";

#[derive(Parser, Debug)]
#[command(name = "tiddly-mcp", version, about = "MCP gateway for a TiddlyWiki tiddler store")]
struct Cli {
    /// TiddlyWiki JSON export to load and save tiddlers to
    #[arg(long, env = "TIDDLY_MCP_WIKI")]
    wiki: Option<PathBuf>,

    #[arg(long, env = "TIDDLY_MCP_HOST")]
    host: Option<String>,

    #[arg(long, env = "TIDDLY_MCP_PORT")]
    port: Option<u16>,

    /// Only register the non-mutating tools
    #[arg(long, env = "TIDDLY_MCP_READ_ONLY")]
    read_only: Option<bool>,

    #[arg(long, env = "TIDDLY_MCP_ENABLED")]
    enabled: Option<bool>,

    /// Comma-separated allowed origins, or "*"
    #[arg(long, env = "TIDDLY_MCP_CORS_ORIGINS")]
    cors_origins: Option<String>,

    /// Content type for tiddlers written without one
    #[arg(long, env = "TIDDLY_MCP_DEFAULT_CONTENT_TYPE")]
    default_content_type: Option<String>,

    #[arg(long, value_enum, env = "TIDDLY_MCP_LOG_LEVEL")]
    log_level: Option<LogLevel>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            enabled: self.enabled,
            read_only: self.read_only,
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            default_content_type: self.default_content_type.clone(),
            log_level: self.log_level,
        }
    }
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tiddly_mcp={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let wiki = match &cli.wiki {
        Some(path) => match MemoryWiki::open(path) {
            Ok(wiki) => wiki,
            Err(e) => {
                eprintln!("tiddly-mcp: failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => MemoryWiki::new(),
    };
    let wiki = Arc::new(wiki);

    let (config, problems) = GatewayConfig::from_wiki(wiki.as_ref());
    let config = config.apply_overrides(cli.overrides());

    init_tracing(config.log_level);
    for problem in &problems {
        tracing::warn!(error = %problem, "Ignoring invalid config tiddler");
    }

    if !config.enabled {
        tracing::info!("MCP server is disabled, exiting");
        return ExitCode::SUCCESS;
    }

    let tools = ToolRegistry::new(wiki, config.read_only)
        .with_default_content_type(config.default_content_type.clone());
    let engine = McpEngine::new(Arc::new(tools)).with_instructions(INSTRUCTIONS);

    let address = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %address, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let gateway = Gateway::new(config, Arc::new(engine));
    if let Err(e) = gateway.serve(listener, shutdown_signal()).await {
        tracing::error!(error = %e, "Server stopped with an error");
    }
    tracing::info!("Server closed");
    ExitCode::SUCCESS
}
