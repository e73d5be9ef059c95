use clap::Parser;
use helpdesk_core::{HelpdeskConfig, SessionManager, SystemClock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use helpdesk_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "helpdesk.toml")]
    config: String,

    /// Validate the configuration, print the pool layout and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (local development)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match HelpdeskConfig::load_validated(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let default_level: tracing::Level = config.service.log_level.parse().unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    let settings = config.pool_settings();

    if args.health {
        let manager = SessionManager::new(&settings, Arc::new(SystemClock));
        println!(
            "✅ Config valid: {} regular, {} additional agents",
            settings.regular_agents.len(),
            settings.additional_agents.len()
        );
        println!(
            "✅ Capacity now: {} (max backlog {})",
            manager.capacity(),
            manager.maximum_queue_size()
        );
        return Ok(());
    }

    let manager = Arc::new(SessionManager::launch(&settings, Arc::new(SystemClock)));

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // HTTP API alongside the IPC socket
    let http_task = if config.http.enabled {
        let http_manager = manager.clone();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) =
                helpdesk_server::http::start_http_server(http_manager, http_config, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        }))
    } else {
        None
    };

    let socket_path = config.service.socket_path.clone();
    let ipc_result = server::run_unix_server(&socket_path, manager.clone(), tx.subscribe()).await;

    // IPC may exit on its own error; make sure HTTP stops too
    let _ = tx.send(());
    if let Some(task) = http_task {
        let _ = task.await;
    }
    manager.shutdown().await;

    ipc_result?;
    Ok(())
}
