//! # CLI Interface
//!
//! Defines the command-line argument structure for `paygate-server`
//! using `clap` derive. Supports three subcommands: `run`,
//! `check-config`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Paygate payment backend.
///
/// Serves the storefront payment API: gateway initiation and callback
/// verification for VNPay, Momo, ZaloPay, Viettel Money, and PayPal,
/// plus the transaction store behind them.
#[derive(Parser, Debug)]
#[command(
    name = "paygate-server",
    about = "Storefront payment gateway backend",
    version,
    propagate_version = true
)]
pub struct PaygateCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the paygate binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the payment backend.
    Run(RunArgs),
    /// Validate provider configuration from the environment and exit.
    ///
    /// Exits non-zero naming the first missing variable. Useful as a
    /// deploy-time preflight before traffic arrives.
    CheckConfig,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory where the transaction snapshot is stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "PAYGATE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Port for the payment API.
    #[arg(long, env = "PAYGATE_HTTP_PORT", default_value_t = 5000)]
    pub http_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PAYGATE_METRICS_PORT", default_value_t = 5001)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "PAYGATE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}
