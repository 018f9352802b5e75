use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use courier_server::ServerConfig;
use courier_store::Database;
use courier_telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "courier", about = "Two-party direct-message routing server")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Path to the message database. Defaults to ~/.courier/messages.db.
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    courier_telemetry::init_telemetry(TelemetryConfig::default());
    tracing::info!("starting courier");

    let db_path = cli
        .database
        .unwrap_or_else(|| dirs_home().join(".courier").join("messages.db"));
    let db = Database::open(&db_path)
        .with_context(|| format!("open database at {}", db_path.display()))?;

    let config = ServerConfig {
        port: cli.port,
        ..Default::default()
    };
    let handle = courier_server::start(config, db)
        .await
        .context("start server")?;

    tracing::info!(port = handle.port, "courier ready");

    tokio::signal::ctrl_c()
        .await
        .context("listen for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
