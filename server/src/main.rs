// Copyright (c) 2026 Paygate Contributors. MIT License.
// See LICENSE for details.

//! # Paygate Server
//!
//! Entry point for the `paygate-server` binary. Parses CLI arguments,
//! initializes logging and metrics, loads provider configuration from
//! the environment, and serves the payment API.
//!
//! The binary supports three subcommands:
//!
//! - `run`          — start the payment backend
//! - `check-config` — validate provider configuration and exit
//! - `version`      — print build version information

mod cli;
mod logging;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use paygate::config::{GatewaySettings, STALE_ORDER_WINDOW, SWEEP_INTERVAL};
use paygate::store::TransactionStore;

use cli::{Commands, PaygateCli};
use logging::LogFormat;
use metrics::GatewayMetrics;
use routes::MetricsNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PaygateCli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::CheckConfig => check_config(),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full backend: payment API, metrics endpoint, and the
/// stale-order sweeper.
async fn run_server(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "paygate_server=info,paygate=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        http_port = args.http_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting paygate-server"
    );

    // --- Configuration ---
    let settings = GatewaySettings::from_env()
        .context("provider configuration incomplete; run `paygate-server check-config`")?;

    // --- Persistent store ---
    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;
    let snapshot_path = args.data_dir.join("transactions.json");

    let gateway_metrics = Arc::new(GatewayMetrics::new());
    let sink = Arc::new(MetricsNotifier::new(Arc::clone(&gateway_metrics)));
    let store = Arc::new(
        TransactionStore::with_snapshot(&snapshot_path, sink).with_context(|| {
            format!("failed to load snapshot at {}", snapshot_path.display())
        })?,
    );
    tracing::info!(path = %snapshot_path.display(), "transaction store loaded");

    // --- Application state ---
    let app_state = routes::AppState::new(settings, Arc::clone(&store), Arc::clone(&gateway_metrics))
        .context("failed to construct application state")?;

    // --- API server ---
    let api_router = routes::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.http_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("payment API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&gateway_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Stale-order sweeper ---
    // Orders stuck in pending/processing past the window are failed by
    // the system actor. A sweep that loses the race to a late callback
    // simply finds the order already terminal.
    let sweep_store = Arc::clone(&store);
    let sweep_metrics = Arc::clone(&gateway_metrics);
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            interval.tick().await;
            let expired = sweep_store.expire_stale(STALE_ORDER_WINDOW);
            if !expired.is_empty() {
                sweep_metrics
                    .transitions_applied_total
                    .with_label_values(&["failed"])
                    .inc_by(expired.len() as u64);
                tracing::info!(count = expired.len(), "stale orders expired");
            }
            let stats = sweep_store.stats();
            sweep_metrics
                .orders_open
                .set((stats.pending + stats.processing) as i64);
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    sweeper.abort();
    tracing::info!("paygate-server stopped");
    Ok(())
}

/// Validates provider configuration from the environment and exits.
fn check_config() -> Result<()> {
    logging::init_logging("paygate_server=info", LogFormat::Pretty);

    let settings =
        GatewaySettings::from_env().context("provider configuration incomplete")?;

    println!("Configuration OK.");
    println!("  VNPay terminal : {}", settings.vnpay.tmn_code);
    println!("  Momo partner   : {}", settings.momo.partner_code);
    println!("  ZaloPay app    : {}", settings.zalopay.app_id);
    println!("  Viettel partner: {}", settings.viettel.partner_code);
    println!("  PayPal mode    : {:?}", settings.paypal.mode);
    Ok(())
}

/// Prints version information.
fn print_version() {
    println!("paygate-server {}", env!("CARGO_PKG_VERSION"));
}

/// Resolves when the process receives SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
