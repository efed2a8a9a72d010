//! Shared Jukebox - WebSocket Server
//!
//! Serves the jukebox over a WebSocket with a terminal dashboard.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --no-dashboard  # Plain logging mode

mod dashboard;
mod metrics;
mod network;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jukebox_core::{DisconnectPolicy, JukeboxConfig};
use parking_lot::RwLock;

/// Command-line arguments for the jukebox server
#[derive(Parser, Debug)]
#[command(name = "jukebox")]
#[command(about = "Shared jukebox with fair per-participant queues")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000", env = "JUKEBOX_PORT")]
    port: u16,

    /// Directory for play history and bookmarks
    #[arg(short, long, default_value = "saves", env = "JUKEBOX_DATA_DIR")]
    data_dir: PathBuf,

    /// Plain logging instead of the terminal dashboard
    #[arg(long)]
    no_dashboard: bool,

    /// Forget a participant and their queue when their last connection closes
    #[arg(long, env = "JUKEBOX_PURGE_ON_DISCONNECT")]
    purge_on_disconnect: bool,

    /// Advance a track the host has not finished after this many seconds
    #[arg(long, env = "JUKEBOX_STALL_TIMEOUT_SECS")]
    stall_timeout_secs: Option<u64>,

    /// How often the stall guard runs
    #[arg(long, default_value = "5", env = "JUKEBOX_TICK_INTERVAL_SECS")]
    tick_interval_secs: u64,
}

impl Args {
    fn server_config(&self) -> network::ServerConfig {
        let disconnect_policy = if self.purge_on_disconnect {
            DisconnectPolicy::Purge
        } else {
            DisconnectPolicy::Retain
        };

        network::ServerConfig {
            port: self.port,
            data_dir: self.data_dir.clone(),
            tick_interval: Duration::from_secs(self.tick_interval_secs.max(1)),
            jukebox: JukeboxConfig::default()
                .with_disconnect_policy(disconnect_policy)
                .with_stall_timeout(self.stall_timeout_secs.map(Duration::from_secs)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.server_config();

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(metrics::Metrics::new(
        config.port,
        config.data_dir.clone(),
    )));

    if args.no_dashboard {
        network::run_with_logging(config, metrics).await
    } else {
        dashboard::run(config, metrics).await
    }
}
