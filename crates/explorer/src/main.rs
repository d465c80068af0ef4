//! MCP spec explorer server.
//!
//! Fetches one remote `OpenAPI` document, caches and indexes it, and exposes search /
//! detail / section tools over MCP (stdio or streamable HTTP).

mod service;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use rmcp::ServiceExt as _;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use service::SpecExplorerService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use unrelated_spec_tools::cache::SpecCache;
use unrelated_spec_tools::config::{AuthConfig, SpecSourceConfig};
use unrelated_spec_tools::fetch::HttpSpecFetcher;
use unrelated_spec_tools::query::SpecExplorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Parser)]
#[command(
    name = "unrelated-mcp-spec-explorer",
    about = "MCP server exposing search/detail tools over a remote OpenAPI spec",
    version
)]
struct Args {
    /// OpenAPI spec URL to serve queries over.
    #[arg(long, env = "SPEC_URL")]
    spec_url: Option<String>,

    /// Cache freshness window, in seconds.
    #[arg(long, env = "SPEC_TTL_SECS", default_value_t = 300)]
    ttl_secs: u64,

    /// Bearer token sent when fetching the spec.
    #[arg(long, env = "SPEC_BEARER_TOKEN")]
    bearer_token: Option<String>,

    /// Extra header sent when fetching the spec, as 'Name: value'.
    #[arg(long, env = "SPEC_AUTH_HEADER")]
    auth_header: Option<String>,

    /// Cap on the spec body size, in bytes.
    #[arg(long, env = "SPEC_MAX_RESPONSE_BYTES")]
    max_response_bytes: Option<usize>,

    /// Transport to serve MCP on.
    #[arg(long, value_enum, default_value_t = TransportKind::Stdio)]
    transport: TransportKind,

    /// Bind address for the HTTP transport.
    #[arg(long, default_value = "127.0.0.1:3000", env = "BIND_ADDR")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr: stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = spec_config(&args)?;

    let fetcher = Arc::new(HttpSpecFetcher::new(&config));
    let cache = Arc::new(SpecCache::new(&config, fetcher));
    let explorer = Arc::new(SpecExplorer::new(cache));

    match args.transport {
        TransportKind::Stdio => serve_stdio(explorer).await,
        TransportKind::Http => serve_http(explorer, &args.bind).await,
    }
}

fn spec_config(args: &Args) -> anyhow::Result<SpecSourceConfig> {
    let Some(spec) = args.spec_url.clone() else {
        anyhow::bail!("Configuration error: --spec-url (or SPEC_URL) is required");
    };

    let mut config = SpecSourceConfig::new(spec);
    config.ttl_secs = args.ttl_secs;
    config.max_response_bytes = args.max_response_bytes;
    if let Some(token) = &args.bearer_token {
        config.auth = Some(AuthConfig::Bearer {
            token: token.clone(),
        });
    } else if let Some(header) = &args.auth_header {
        let (name, value) = header
            .split_once(':')
            .context("Configuration error: --auth-header must be 'Name: value'")?;
        config.auth = Some(AuthConfig::Header {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        });
    }

    Ok(config)
}

async fn serve_stdio(explorer: Arc<SpecExplorer>) -> anyhow::Result<()> {
    tracing::info!("serving MCP over stdio");
    let service = SpecExplorerService::new(explorer)
        .serve(stdio())
        .await
        .context("start stdio transport")?;
    service.waiting().await.context("stdio transport")?;
    Ok(())
}

async fn serve_http(explorer: Arc<SpecExplorer>, bind: &str) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(SpecExplorerService::new(Arc::clone(&explorer))),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;

    tracing::info!(addr = %bind, "serving MCP over streamable HTTP at /mcp");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serve HTTP")?;

    Ok(())
}
