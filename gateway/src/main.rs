// Copyright (c) 2026 PARCEL Contributors. MIT License.
// See LICENSE for details.

//! # PARCEL Gateway
//!
//! Entry point for the `parcel-gateway` binary. Parses CLI arguments,
//! initializes logging and metrics, and either serves the tokenization
//! backend or drives a purchase against a running one.
//!
//! The binary supports five subcommands:
//!
//! - `serve`   — start the tokenization gateway
//! - `buy`     — run one complete purchase flow against a running gateway
//! - `catalog` — list the investable catalog of a running gateway
//! - `status`  — query a running gateway's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tokio::signal;

use parcel_flow::asset::Asset;
use parcel_flow::backend::http::HttpBackend;
use parcel_flow::backend::TokenizationBackend;
use parcel_flow::config::FLOW_PROTOCOL_VERSION;
use parcel_flow::payment::{CardRail, ChainRail, PaymentRail};
use parcel_flow::wallet::DevWallet;
use parcel_flow::{FlowController, FlowState};

use cli::{Commands, ParcelGatewayCli, RailArg};
use logging::LogFormat;
use metrics::GatewayMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ParcelGatewayCli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Buy(args) => buy(args).await,
        Commands::Catalog(args) => print_catalog(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

/// Starts the full gateway: API server, metrics endpoint, and the
/// settlement worker.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    logging::init_logging(
        "parcel_gateway=info,parcel_flow=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        session_ttl_secs = args.session_ttl_secs,
        settle_interval_ms = args.settle_interval_ms,
        "starting parcel-gateway"
    );

    // --- Issuer key ---
    // Ephemeral per run: the in-process registry is not persistent either,
    // so a fresh key per gateway lifetime matches the durability of what
    // it signs for.
    let issuer = SigningKey::generate(&mut OsRng);
    tracing::info!(
        issuer = %hex::encode(issuer.verifying_key().as_bytes()),
        "issuer key generated"
    );

    // --- Metrics ---
    let gateway_metrics = Arc::new(GatewayMetrics::new());

    // --- Application state ---
    let app_state = api::AppState::new(
        demo_listings(),
        issuer,
        Duration::from_secs(args.session_ttl_secs),
        Arc::clone(&gateway_metrics),
        format!("{} (flow {})", env!("CARGO_PKG_VERSION"), FLOW_PROTOCOL_VERSION),
    )
    .context("failed to build gateway state")?;
    tracing::info!(listings = app_state.listings.len(), "catalog seeded");

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&gateway_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Settlement worker ---
    let worker_state = app_state.clone();
    let settle_loop = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(args.settle_interval_ms.max(1)));
        loop {
            interval.tick().await;
            api::settle_tick(&worker_state);
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
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    settle_loop.abort();
    tracing::info!("parcel-gateway stopped");
    Ok(())
}

/// The seed catalog served by a fresh gateway. All amounts in cents.
fn demo_listings() -> Vec<Asset> {
    vec![
        Asset {
            id: "prop-marina-b".into(),
            title: "Marina Heights, Tower B".into(),
            location: "Dubai Marina".into(),
            total_price: 250_000_000,
            price_per_unit: 10_000,
            total_units: 25_000,
            available_units: 25_000,
            minimum_investment: 100_000,
            maximum_investment: 10_000_000,
            contract_address: "0x00000000000000000000000000000000000a55e7".into(),
            unit_symbol: "MRNA-B".into(),
        },
        Asset {
            id: "prop-palm-villa-12".into(),
            title: "Palm Grove Villa 12".into(),
            location: "Palm Jumeirah".into(),
            total_price: 820_000_000,
            price_per_unit: 50_000,
            total_units: 16_400,
            available_units: 16_400,
            minimum_investment: 250_000,
            maximum_investment: 25_000_000,
            contract_address: "0x00000000000000000000000000000000000fa112".into(),
            unit_symbol: "PALM-12".into(),
        },
        Asset {
            id: "prop-dtown-lofts".into(),
            title: "Downtown Lofts, Floor 9".into(),
            location: "Downtown Dubai".into(),
            total_price: 96_000_000,
            price_per_unit: 4_000,
            total_units: 24_000,
            available_units: 24_000,
            minimum_investment: 40_000,
            maximum_investment: 4_800_000,
            contract_address: "0x00000000000000000000000000000000000d7009".into(),
            unit_symbol: "DTWN-9".into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// buy
// ---------------------------------------------------------------------------

/// Drives one complete purchase flow against a running gateway and prints
/// a settlement summary.
async fn buy(args: cli::BuyArgs) -> Result<()> {
    logging::init_logging("parcel_gateway=info,parcel_flow=info", LogFormat::Pretty);

    let backend: Arc<dyn TokenizationBackend> = Arc::new(HttpBackend::new(&args.gateway_url));

    let wallet = match &args.wallet_seed {
        Some(seed_hex) => {
            let seed: [u8; 32] = hex::decode(seed_hex)
                .context("wallet seed is not valid hex")?
                .try_into()
                .map_err(|_| anyhow::anyhow!("wallet seed must be exactly 32 bytes"))?;
            DevWallet::from_seed(&seed)
        }
        None => DevWallet::generate(),
    };
    let account = wallet.address().to_string();
    println!("Buying as {}", account);

    // Pick the asset: explicit id, or the first catalog entry.
    let catalog = backend
        .list_assets()
        .await
        .context("failed to fetch the catalog")?;
    let asset = match &args.asset_id {
        Some(id) => catalog
            .into_iter()
            .find(|a| &a.id == id)
            .with_context(|| format!("asset {} is not listed", id))?,
        None => catalog
            .into_iter()
            .next()
            .context("the gateway lists no assets")?,
    };
    println!(
        "Asset: {} ({}) — {} units available at {} cents/unit",
        asset.title, asset.id, asset.available_units, asset.price_per_unit
    );

    let mut controller = FlowController::new(Arc::clone(&backend), account.clone());
    controller.select_asset(asset)?;
    if let Some(amount) = args.amount {
        controller.set_amount(amount)?;
    }
    println!("Amount: {} cents", controller.amount());

    controller.validate().await.context("validation failed")?;
    let session = controller.session().expect("session after validation");
    println!(
        "Session {} accepted: fees {} cents, total {} cents",
        session.id, session.estimated_fees, session.total_cost
    );

    let rail: Box<dyn PaymentRail> = match args.rail {
        RailArg::Wallet => Box::new(ChainRail::new(Arc::new(wallet))),
        RailArg::Card => Box::new(CardRail::new(Arc::clone(&backend))),
    };
    controller
        .choose_payment(rail.as_ref())
        .await
        .context("payment failed")?;
    println!("Payment submitted on the {} rail, settling...", rail.method());

    let final_state = controller.observe().await.context("settlement failed")?;
    match final_state {
        FlowState::Complete => {
            let snapshot = controller.snapshot().expect("snapshot after completion");
            println!(
                "Settled: {}",
                snapshot.tx_hash.as_deref().unwrap_or("(no tx hash)")
            );
            println!("Holdings for {}:", account);
            for holding in controller.holdings() {
                println!(
                    "  {:>10}  {} units  ({} cents)",
                    holding.unit_symbol, holding.units, holding.value
                );
            }
            Ok(())
        }
        other => {
            bail!(
                "flow ended in state {} ({})",
                other,
                controller.processing_error().unwrap_or("no error recorded")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// catalog / status / version
// ---------------------------------------------------------------------------

/// Fetches and prints the investable catalog of a running gateway.
async fn print_catalog(args: cli::CatalogArgs) -> Result<()> {
    let backend = HttpBackend::new(&args.gateway_url);
    let catalog = backend
        .list_assets()
        .await
        .context("failed to fetch the catalog")?;

    if catalog.is_empty() {
        println!("The gateway lists no assets.");
        return Ok(());
    }

    println!(
        "{:<22} {:<28} {:>12} {:>12} {:>14}",
        "ID", "TITLE", "UNIT PRICE", "AVAILABLE", "MIN INVEST"
    );
    for asset in catalog {
        println!(
            "{:<22} {:<28} {:>12} {:>12} {:>14}",
            asset.id, asset.title, asset.price_per_unit, asset.available_units,
            asset.minimum_investment
        );
    }
    Ok(())
}

/// Queries a running gateway's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.gateway_url.trim_end_matches('/'));
    let body = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .text()
        .await
        .context("failed to read the status body")?;
    println!("{}", body);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("parcel-gateway {}", env!("CARGO_PKG_VERSION"));
    println!("flow protocol  {}", FLOW_PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
