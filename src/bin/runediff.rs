//! runediff CLI tool
//!
//! Command-line interface for capturing indexer snapshots and diffing them.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use runediff::capture::{build_snapshot, Strategy};
use runediff::diff;
use runediff::driver;
use runediff::events::LogReporter;
use runediff::ord_client::{OrdApiConfig, OrdClient};
use runediff::ord_process::{OrdConfig, OrdIndexer};
use runediff::snapshot;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "runediff")]
#[command(about = "Differential verification for Bitcoin Runes ledger indexers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Connection and invocation parameters for the managed indexer.
#[derive(Args)]
struct IndexerArgs {
    /// Indexer executable: a path, or a bare name looked up in PATH
    #[arg(long, env = "ORD_EXECUTABLE_PATH")]
    ord_executable: PathBuf,
    /// Indexer data directory (exclusively owned while a cycle runs)
    #[arg(long, env = "ORD_DIR_PATH")]
    data_dir: PathBuf,
    /// HTTP port for the indexer's serve mode
    #[arg(long, env = "ORD_PORT", default_value_t = 8080)]
    http_port: u16,
    #[arg(long, env = "BITCOIN_RPC_URL")]
    bitcoin_rpc_url: String,
    #[arg(long, env = "BITCOIN_RPC_USERNAME")]
    bitcoin_rpc_username: String,
    #[arg(long, env = "BITCOIN_RPC_PASSWORD")]
    bitcoin_rpc_password: String,
    /// Snapshot output root; one subdirectory per run label
    #[arg(long, default_value = "states")]
    states_dir: PathBuf,
    /// Seconds to wait for the server to reach the target height
    #[arg(long, default_value_t = 120)]
    ready_timeout: u64,
}

impl IndexerArgs {
    fn into_config(self) -> OrdConfig {
        let mut config = OrdConfig::new(
            self.ord_executable,
            self.data_dir,
            self.http_port,
            self.bitcoin_rpc_url,
            self.bitcoin_rpc_username,
            self.bitcoin_rpc_password,
            self.states_dir,
        );
        config.ready_timeout = Duration::from_secs(self.ready_timeout);
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the indexer through update/serve cycles and capture one
    /// snapshot per height
    Capture {
        #[command(flatten)]
        indexer: IndexerArgs,
        /// First height to capture
        #[arg(long)]
        from: u64,
        /// Last height to capture (defaults to --from)
        #[arg(long)]
        to: Option<u64>,
        /// Run label (e.g. "reference" or "candidate")
        #[arg(long)]
        label: String,
        /// Ledger retrieval strategy
        #[arg(long, default_value_t = Strategy::LedgerFirst)]
        strategy: Strategy,
        /// Concurrent per-rune fetches in balance-first mode
        #[arg(long, default_value_t = 8)]
        fan_out: usize,
    },
    /// Capture one snapshot from an already-running indexer server
    Snapshot {
        /// Server base URL (e.g. http://127.0.0.1:8080)
        #[arg(long)]
        endpoint: String,
        /// Height the server is expected to be at
        #[arg(long)]
        height: u64,
        /// Run label (e.g. "reference" or "candidate")
        #[arg(long)]
        label: String,
        /// Snapshot output root
        #[arg(long, default_value = "states")]
        states_dir: PathBuf,
        #[arg(long, default_value_t = Strategy::LedgerFirst)]
        strategy: Strategy,
        #[arg(long, default_value_t = 8)]
        fan_out: usize,
    },
    /// Compare two persisted snapshots for exact structural equivalence
    Diff {
        /// Reference snapshot file
        a: PathBuf,
        /// Candidate snapshot file
        b: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Capture {
            indexer,
            from,
            to,
            label,
            strategy,
            fan_out,
        } => {
            let to = to.unwrap_or(from);
            anyhow::ensure!(from <= to, "--from must not exceed --to");
            let reporter = Arc::new(LogReporter);
            let indexer = OrdIndexer::new(indexer.into_config(), reporter.clone())
                .context("indexer configuration rejected")?;
            driver::capture_range(&indexer, &*reporter, from, to, &label, strategy, fan_out)
                .await
                .context("capture run aborted")?;
            log::info!("captured heights {from}..={to} under label {label:?}");
        }
        Commands::Snapshot {
            endpoint,
            height,
            label,
            states_dir,
            strategy,
            fan_out,
        } => {
            let client = OrdClient::new(OrdApiConfig::new(endpoint))
                .context("failed to build HTTP client")?;
            let reported = client
                .block_height()
                .await
                .context("server is not answering")?;
            anyhow::ensure!(
                reported == height,
                "server reports height {reported}, expected {height}"
            );
            let snapshot = build_snapshot(&client, height, strategy, fan_out)
                .await
                .context("snapshot capture failed")?;
            let path = snapshot
                .save(&states_dir, &label)
                .context("failed to persist snapshot")?;
            log::info!(
                "persisted {} runes for height {height} to {}",
                snapshot.runes.len(),
                path.display()
            );
        }
        Commands::Diff { a, b } => {
            let left = snapshot::load_value(&a)?;
            let right = snapshot::load_value(&b)?;
            let result = diff::diff(&left, &right);
            if result.equal {
                println!("snapshots are structurally identical");
            } else {
                let divergence = result.divergence.expect("unequal diff carries a divergence");
                println!("{divergence}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
