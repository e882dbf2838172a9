//! kvctl — a CLI driver for the wolflog storage engine
//!
//! One process per invocation: open the engine directory, perform a single
//! operation, close it again. This stands in for the out-of-scope HTTP
//! façade, exercising the engine's public contract directly instead of
//! serving requests over a network.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolflog::config::EngineConfig;
use wolflog::engine::Engine;
use wolflog::error::{Error, Result};

#[derive(Parser)]
#[command(name = "kvctl")]
#[command(author, version, about = "Drive the wolflog storage engine from the command line")]
struct Cli {
    /// Engine directory
    #[arg(short, long)]
    dir: PathBuf,

    /// Optional TOML configuration file; `--dir` overrides its `dir` field
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty engine directory
    Init,

    /// Store a string value under a key
    Put { key: String, value: String },

    /// Store an int64 value under a key
    PutInt64 { key: String, value: i64 },

    /// Fetch a string value by key
    Get { key: String },

    /// Fetch an int64 value by key
    GetInt64 { key: String },

    /// Show segment count and per-segment size
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => run_init(config).await,
        Commands::Put { key, value } => run_put(config, key, value).await,
        Commands::PutInt64 { key, value } => run_put_int64(config, key, value).await,
        Commands::Get { key } => run_get(config, key).await,
        Commands::GetInt64 { key } => run_get_int64(config, key).await,
        Commands::Stats => run_stats(config).await,
    }
}

fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::new(cli.dir.clone()),
    };
    config.dir = cli.dir.clone();
    config.validate()?;
    Ok(config)
}

async fn run_init(config: EngineConfig) -> Result<()> {
    let dir = config.dir.clone();
    let engine = Engine::open(config).await?;
    tracing::info!(dir = %dir.display(), "initialized engine directory");
    engine.close().await
}

async fn run_put(config: EngineConfig, key: String, value: String) -> Result<()> {
    if value.is_empty() {
        return Err(Error::EmptyValue);
    }

    let mut engine = Engine::open(config).await?;
    engine.put(&key, &value).await?;
    engine.close().await?;
    println!("OK");
    Ok(())
}

async fn run_put_int64(config: EngineConfig, key: String, value: i64) -> Result<()> {
    let mut engine = Engine::open(config).await?;
    engine.put_int64(&key, value).await?;
    engine.close().await?;
    println!("OK");
    Ok(())
}

async fn run_get(config: EngineConfig, key: String) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = engine.get(&key).await;
    engine.close().await?;

    match result {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(Error::NotFound) => {
            eprintln!("not found");
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

async fn run_get_int64(config: EngineConfig, key: String) -> Result<()> {
    let engine = Engine::open(config).await?;
    let result = engine.get_int64(&key).await;
    engine.close().await?;

    match result {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(Error::NotFound) => {
            eprintln!("not found");
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

async fn run_stats(config: EngineConfig) -> Result<()> {
    let engine = Engine::open(config).await?;
    println!("segments: {}", engine.segment_count());
    for (path, size) in engine.segment_sizes()? {
        println!("  {}: {} bytes", path.display(), size);
    }
    engine.close().await
}
