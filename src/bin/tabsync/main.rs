//! tabsync CLI tool
//!
//! Command-line interface for inspecting shared snapshots and running the sync engine against
//! simulated browsers.
//!
//! ## Commands
//!
//! - `decode [file]`: Print a stored snapshot payload as JSON
//! - `encode [file]`: Turn a JSON snapshot into a storage payload
//! - `simulate --peer name=url,url ...`: Run several peers over one shared store

use clap::{Parser, Subcommand};
use std::{
    io::{read_to_string, stdin},
    path::PathBuf,
    time::Duration,
};
use tabsync_core::{
    clock::Clock,
    config::{ConfigProvider, TomlConfigProvider},
    event::StorageArea,
    properties::PeerId,
    sim::{MemoryStore, SimPeer},
    snapshot::{decode_record, encode_record, SyncRecord},
    SyncError,
};

#[derive(Parser)]
#[command(name = "tabsync")]
#[command(author, version, about = "Inspect tab snapshots and simulate tab synchronization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a snapshot payload (base64 zstd, or legacy JSON)
    Decode {
        /// File holding the payload; stdin when omitted
        path: Option<PathBuf>,

        /// Print a readable summary instead of JSON
        #[arg(short, long)]
        readable: bool,

        /// Peer id to highlight in the readable summary
        #[arg(short, long)]
        me: Option<String>,
    },

    /// Encode a JSON snapshot into a storage payload
    Encode {
        /// File holding the JSON record; stdin when omitted
        path: Option<PathBuf>,
    },

    /// Run peers over one in-memory shared store and print where they end up
    Simulate {
        /// A peer and its initial tabs, as `name=url,url`
        #[arg(short, long = "peer", required = true)]
        peers: Vec<String>,

        /// Seconds to let each peer settle before the next one starts
        #[arg(short, long, default_value_t = 12)]
        seconds: u64,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn read_input(path: Option<PathBuf>) -> Result<String, SyncError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(read_to_string(stdin())?),
    }
}

fn parse_peer(spec: &str) -> Result<(String, Vec<String>), SyncError> {
    let (name, urls) = spec.split_once('=').unwrap_or((spec, ""));
    let name: PeerId = name.parse()?;
    let urls = urls
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name.to_string(), urls))
}

async fn simulate(
    peers: Vec<String>,
    settle: Duration,
    config: Option<PathBuf>,
) -> Result<(), SyncError> {
    let config = match config {
        Some(path) => TomlConfigProvider::new(path).get_config()?,
        None => Default::default(),
    };
    let shared = MemoryStore::new(StorageArea::Shared);
    let clock = Clock::new();

    let mut running = Vec::new();
    for spec in peers.iter() {
        let (name, urls) = parse_peer(spec)?;
        let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
        tracing::info!("starting {name} with {} tabs", urls.len());
        running.push(SimPeer::spawn(&name, &shared, &urls, config.clone(), clock).await?);
        tokio::time::sleep(settle).await;
    }
    tokio::time::sleep(settle).await;

    println!("\n=== Simulation Results ===");
    for peer in running.iter() {
        println!("{} ({}):", peer.name, *peer.engine.status().borrow());
        for url in peer.synced_urls(&config) {
            println!("    {url}");
        }
    }
    if let Some(peer) = running.first() {
        if let Some(record) = peer.engine.stored_record().await? {
            println!("\n=== Shared Snapshot ===");
            print!("{}", record.describe(None)?);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { path, readable, me } => {
            let payload = read_input(path)?;
            let record = decode_record(&payload)?;
            if readable {
                let me = me.map(|me| PeerId::from(me.as_str()));
                print!("{}", record.describe(me.as_ref())?);
            } else {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Ok(())
        }

        Commands::Encode { path } => {
            let json = read_input(path)?;
            let record: SyncRecord = serde_json::from_str(&json)?;
            println!("{}", encode_record(&record)?);
            Ok(())
        }

        Commands::Simulate {
            peers,
            seconds,
            config,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(simulate(peers, Duration::from_secs(seconds), config))?;
            Ok(())
        }
    }
}
