//! # CLI Interface
//!
//! Defines the command-line argument structure for `parcel-gateway` using
//! `clap` derive. Supports five subcommands: `serve`, `buy`, `catalog`,
//! `status`, and `version`.

use clap::{Parser, Subcommand, ValueEnum};

/// PARCEL tokenization gateway.
///
/// The reference backend for PARCEL's purchase flow: serves the asset
/// catalog, validates candidate investments, settles paid sessions against
/// the property-token registry, and exposes Prometheus metrics. The same
/// binary doubles as the buyer CLI for driving purchases against a running
/// gateway.
#[derive(Parser, Debug)]
#[command(
    name = "parcel-gateway",
    about = "PARCEL tokenization gateway",
    version,
    propagate_version = true
)]
pub struct ParcelGatewayCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the gateway binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the tokenization gateway.
    Serve(ServeArgs),
    /// Run one complete purchase flow against a running gateway.
    Buy(BuyArgs),
    /// List the investable catalog of a running gateway.
    Catalog(CatalogArgs),
    /// Query the status of a running gateway.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port for the REST API.
    #[arg(long, env = "PARCEL_API_PORT", default_value_t = 8742)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PARCEL_METRICS_PORT", default_value_t = 8743)]
    pub metrics_port: u16,

    /// Seconds an unpaid session lives before the gateway expires it.
    #[arg(long, env = "PARCEL_SESSION_TTL", default_value_t = 900)]
    pub session_ttl_secs: u64,

    /// Milliseconds between settlement worker passes.
    ///
    /// Each pass advances executed sessions by one settlement phase, so
    /// a purchase completes roughly two passes after execution.
    #[arg(long, env = "PARCEL_SETTLE_INTERVAL", default_value_t = 2000)]
    pub settle_interval_ms: u64,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "PARCEL_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Payment rail selection for the `buy` subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RailArg {
    /// Pay with the in-process dev wallet.
    Wallet,
    /// Pay through the card rail.
    Card,
}

/// Arguments for the `buy` subcommand.
#[derive(Parser, Debug)]
pub struct BuyArgs {
    /// Base URL of the gateway to buy from.
    #[arg(long, env = "PARCEL_GATEWAY_URL", default_value = "http://127.0.0.1:8742")]
    pub gateway_url: String,

    /// Asset to buy. Defaults to the first catalog entry.
    #[arg(long)]
    pub asset_id: Option<String>,

    /// Investment amount in cents. Defaults to the asset's minimum.
    #[arg(long)]
    pub amount: Option<u64>,

    /// Payment rail to use.
    #[arg(long, value_enum, default_value_t = RailArg::Wallet)]
    pub rail: RailArg,

    /// Hex-encoded 32-byte seed for the dev wallet.
    ///
    /// Omit for a fresh random wallet. Reusing a seed reuses the buying
    /// account, which is how you accumulate holdings across runs.
    #[arg(long, env = "PARCEL_WALLET_SEED")]
    pub wallet_seed: Option<String>,
}

/// Arguments for the `catalog` subcommand.
#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Base URL of the gateway to query.
    #[arg(long, env = "PARCEL_GATEWAY_URL", default_value = "http://127.0.0.1:8742")]
    pub gateway_url: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the gateway to query.
    #[arg(long, env = "PARCEL_GATEWAY_URL", default_value = "http://127.0.0.1:8742")]
    pub gateway_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        ParcelGatewayCli::command().debug_assert();
    }
}
