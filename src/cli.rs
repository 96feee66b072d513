//! Process configuration: bind address, snapshot path, and trade-store
//! path, parsed from flags with environment-variable fallback.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prophet-market-engine")]
#[command(author, version, about = "A prediction-market limit order book engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the TCP server, optionally loading a prior snapshot on startup.
    Serve(Config),
    /// Load a snapshot and immediately write it back out (round-trip check).
    Snapshot(Config),
    /// Replay a snapshot file and print a summary of the markets it contains.
    Replay {
        /// Path to the snapshot file to replay.
        #[arg(long, env = "PROPHET_SNAPSHOT_PATH")]
        snapshot_path: PathBuf,
    },
}

#[derive(Args, Clone, Debug)]
pub struct Config {
    /// Address the newline-JSON TCP server binds to.
    #[arg(long, env = "PROPHET_BIND_ADDR", default_value = "127.0.0.1:7878")]
    pub bind_addr: String,

    /// Path the whole-state JSON snapshot is loaded from (if present) and
    /// written to on shutdown.
    #[arg(long, env = "PROPHET_SNAPSHOT_PATH", default_value = "prophet_state.json")]
    pub snapshot_path: PathBuf,

    /// Path to the ParityDB-backed trade archive directory.
    #[arg(long, env = "PROPHET_TRADE_STORE_PATH", default_value = "prophet_trades.db")]
    pub trade_store_path: PathBuf,
}
