//! Parley Directory Service.
//!
//! ```text
//! parley-directory [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>              Listen address [default: 127.0.0.1:5555]
//!   --journal <PATH>           Snapshot journal; enables restart recovery
//!   --request-timeout <MS>     Per-connection request deadline [default: 5000]
//!   --probe-timeout <MS>       Per-member liveness probe deadline [default: 2000]
//! ```
//!
//! Every option can also be set through the `PARLEY_*` variable named in
//! `--help`. Log level comes from `RUST_LOG`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use parley::{DEFAULT_DIRECTORY_ADDR, DirectoryConfig, DirectoryServer};
use tracing_subscriber::EnvFilter;

/// Room registry for Parley chat clients.
#[derive(Debug, Parser)]
#[command(name = "parley-directory", version)]
struct Cli {
    /// Address to accept directory requests on.
    #[arg(long, default_value = DEFAULT_DIRECTORY_ADDR, env = "PARLEY_BIND")]
    bind: String,

    /// Append a room snapshot here after every change, and recover from
    /// it on startup.
    #[arg(long, env = "PARLEY_JOURNAL")]
    journal: Option<PathBuf>,

    /// Milliseconds a connection may take to send its request.
    #[arg(long, default_value_t = 5000, env = "PARLEY_REQUEST_TIMEOUT_MS")]
    request_timeout: u64,

    /// Milliseconds to wait for each member's liveness answer on startup.
    #[arg(long, default_value_t = 2000, env = "PARLEY_PROBE_TIMEOUT_MS")]
    probe_timeout: u64,
}

impl Cli {
    fn into_config(self) -> DirectoryConfig {
        let mut config = DirectoryConfig::default()
            .with_bind_addr(self.bind)
            .with_request_timeout(Duration::from_millis(self.request_timeout))
            .with_probe_timeout(Duration::from_millis(self.probe_timeout));
        if let Some(path) = self.journal {
            config = config.with_journal(path);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    let bind = config.bind_addr.clone();
    let server = DirectoryServer::builder()
        .config(config)
        .build()
        .await
        .with_context(|| format!("starting directory on {bind}"))?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}
