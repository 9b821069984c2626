use anyhow::Result;
use clap::Parser;
use search_core::config::Config;
use search_core::store::{MemoryStore, Store};
use search_indexer::IndexBuilder;
use search_server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON configuration listing the sites and field weights
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,
    /// Index directory; overrides `index_dir` from the configuration
    #[arg(long)]
    index: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if args.index.is_some() {
        config.index_dir = args.index;
    }
    let store: Arc<dyn Store> = match &config.index_dir {
        Some(dir) => Arc::new(MemoryStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    };
    let app = build_app(IndexBuilder::new(config, store)?);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
