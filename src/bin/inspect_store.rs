//! Relayer Store Inspector
//!
//! Prints the persisted sync cursors, the retry backlog and the number of
//! checked transfers of a relayer database. Useful to tell whether a relay is
//! stuck without stopping the relayer.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin inspect-store -- --path ./relayer-db
//! ```
//!
//! Without `--path` the store path is read from the relayer configuration
//! (`RELAYER_CONFIG_PATH` or `config/relayer.toml`).

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zilliqa_relayer::codec::CrossTransfer;
use zilliqa_relayer::storage::RelayerStore;
use zilliqa_relayer::Config;

#[derive(Parser, Debug)]
#[command(name = "inspect-store")]
#[command(about = "Inspect the cursors and retry backlog of a relayer database")]
struct Args {
    /// Database directory (default: storage.path from the relayer configuration)
    #[arg(short, long)]
    path: Option<String>,

    /// Maximum number of retry records to print
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = match args.path {
        Some(path) => path,
        None => Config::load()?.storage.path,
    };
    info!("Inspecting relayer store at {}", path);

    let store = RelayerStore::open_read_only(&path)
        .with_context(|| format!("Failed to open store at {}", path))?;

    println!("poly_height:   {}", store.poly_height().await?);
    match store.zil_height().await? {
        Some(h) => println!("zil_height:    {}", h),
        None => println!("zil_height:    <unset>"),
    }
    match store.zil_ds_height().await? {
        Some(h) => println!("zil_ds_height: {}", h),
        None => println!("zil_ds_height: <unset>"),
    }

    let pending = store.count_pending().await?;
    let (records, hidden) = store.pending_page(args.limit).await?;
    println!();
    println!("retry backlog: {}", pending);
    for key in records {
        match CrossTransfer::deserialize(&key) {
            Ok(record) => println!(
                "  height {:>10}  to_chain {:>4}  index {}  tx {}  value {} bytes",
                record.height,
                record.to_chain,
                record.tx_index,
                hex::encode(&record.tx_id),
                record.value.len()
            ),
            Err(e) => warn!("Undecodable retry record {}: {}", hex::encode(&key), e),
        }
    }
    if hidden > 0 {
        println!("  ... {} more", hidden);
    }

    println!();
    println!("checked:       {}", store.count_checked().await?);
    Ok(())
}
