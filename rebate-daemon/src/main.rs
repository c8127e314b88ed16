//! Rebate daemon HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (rebate.toml in current directory, optional)
//! cargo run -p rebate-daemon --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/rebate.toml cargo run -p rebate-daemon
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p rebate-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `rebate.toml`)
//! - `CHAIN_RPC_URL`, `BUNDLER_URL`, `OWNER_PRIVATE_KEY` - required
//! - `TOKEN_ADDRESS` - required for deposit watching and refunds
//! - `HOST` / `PORT` - Bind address (default: `0.0.0.0:4022`)
//! - `REFUND_ON_DEPOSIT` - Refund deposits to their senders (default: `true`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use rebate_evm::{DepositWatcher, RefundService, SmartAccountFactory};
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use rebate_daemon::config::DaemonConfig;
use rebate_daemon::handlers::{DepositTarget, daemon_router};
use rebate_daemon::pipeline::refund_deposits;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Daemon failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = DaemonConfig::load()?;
    config.validate()?;
    let pipeline = &config.pipeline;
    tracing::info!(
        host = %config.host,
        port = config.port,
        chain_id = pipeline.chain_id,
        entry_point_version = %pipeline.entry_point_version,
        refund_on_deposit = config.refund_on_deposit,
        "Loaded configuration"
    );

    let owner = config.owner_signer()?;
    let factory = SmartAccountFactory::from_config(pipeline)?;
    let context = factory.create_context(owner).await?;
    let token = pipeline.token_address_opt()?;

    let watch = if config.refund_on_deposit {
        let watcher = DepositWatcher::from_config(pipeline);
        let deposits = watcher.watch(context.address());
        let handle = deposits.handle().clone();
        let refunds = RefundService::from_config(pipeline)?;
        tokio::spawn(refund_deposits(deposits, refunds, context.clone()));
        Some(handle)
    } else {
        tracing::info!("Automatic refunds disabled");
        None
    };

    let state = Arc::new(DepositTarget {
        chain_id: context.chain().id(),
        account: context.address(),
        token,
    });

    let app = daemon_router(state).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(account = %context.address(), "Daemon listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = watch {
        handle.cancel();
    }
    tracing::info!("Daemon shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
