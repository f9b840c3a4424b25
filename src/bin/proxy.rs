//! # parlor-proxy
//!
//! Per-session backend connection proxy. Spawned by the web tier with the
//! session's Unix socket path as its sole positional argument; everything
//! else has defaults the spawner may override. Holds the one backend
//! connection for its session and relays client conversations to it, one at
//! a time, until the backend hangs up or the endpoint sits idle too long.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use parlor::proxy::{self, ProxySettings};

/// Session proxy: owns one backend connection behind a Unix socket.
#[derive(Parser)]
#[command(name = "parlor-proxy", version)]
struct Cli {
    /// Unix socket path to bind for this session.
    socket: PathBuf,

    /// Backend address as host:port.
    #[arg(long, default_value = "127.0.0.1:504")]
    backend: String,

    /// Exit after this many seconds with no connected client.
    #[arg(long, default_value_t = 900)]
    idle_timeout_secs: u64,

    /// Backend TCP connect timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let settings = ProxySettings {
        socket_path: cli.socket,
        backend_addr: cli.backend,
        connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
        idle_timeout: Duration::from_secs(cli.idle_timeout_secs),
    };

    if let Err(e) = proxy::run(&settings).await {
        error!("proxy exited with error: {e}");
        std::process::exit(1);
    }
}
