use anyhow::Result;
use clap::{Parser, Subcommand};
use search_core::config::Config;
use search_core::store::{MemoryStore, Store};
use search_indexer::IndexBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Crawl the configured sites into a lemma index", long_about = None)]
struct Cli {
    /// JSON configuration listing the sites and field weights
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,
    /// Index directory; overrides `index_dir` from the configuration
    #[arg(long)]
    index: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every configured site from scratch
    Build,
    /// Fetch a single page again and replace its lemmas
    Reindex {
        #[arg(long)]
        url: String,
    },
    /// Print index statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if cli.index.is_some() {
        config.index_dir = cli.index;
    }
    let store: Arc<dyn Store> = match &config.index_dir {
        Some(dir) => Arc::new(MemoryStore::open(dir)?),
        None => {
            tracing::warn!("no index directory configured, the index is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    let builder = IndexBuilder::new(config, store)?;

    match cli.command {
        Commands::Build => {
            builder.start()?;
            builder.wait_idle().await;
        }
        Commands::Reindex { url } => builder.index_page(&url).await?,
        Commands::Stats => {}
    }
    println!("{}", serde_json::to_string_pretty(&builder.statistics()?)?);
    Ok(())
}
