//! # REST API
//!
//! Builds the axum router that exposes the gateway's HTTP interface — the
//! server side of the tokenization backend protocol the purchase flow
//! speaks. All endpoints share application state through axum's `State`
//! extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                             | Description                      |
//! |--------|----------------------------------|----------------------------------|
//! | GET    | `/health`                        | Liveness probe                   |
//! | GET    | `/status`                        | Gateway status summary           |
//! | GET    | `/v1/assets`                     | Investable catalog               |
//! | POST   | `/v1/validate`                   | Validate a candidate investment  |
//! | POST   | `/v1/sessions`                   | Payment descriptor for a session |
//! | POST   | `/v1/sessions/:id/execute`       | Report payment, start settlement |
//! | GET    | `/v1/sessions/:id/status`        | Settlement progress snapshot     |
//! | POST   | `/v1/sessions/:id/confirm-card`  | Confirm a card checkout          |
//! | GET    | `/v1/holdings/:account`          | Settled positions of an account  |
//!
//! Validation here is authoritative: the flow client treats its own bounds
//! checks as advisory and defers to the answers this module gives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use dashmap::DashMap;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use parcel_contracts::escrow::PurchaseEscrow;
use parcel_contracts::property_token::{mint_payload, PropertyRegistry};
use parcel_flow::asset::{Asset, UserHolding};
use parcel_flow::backend::{
    CardConfirmation, ExecuteRequest, InitiateRequest, PaymentDescriptor, ValidateOutcome,
    ValidateRequest,
};
use parcel_flow::payment::PaymentMethod;
use parcel_flow::session::{FlowSession, SessionStatus, StatusSnapshot};

use crate::metrics::SharedMetrics;

/// Platform fee charged on every purchase, in basis points.
pub const FEE_BPS: u64 = 250;

/// Gas limit quoted for on-chain purchase transactions.
const PURCHASE_GAS_LIMIT: u64 = 120_000;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Server-side record of one flow session.
///
/// Tracks what the client reported (payment) and what the settlement
/// worker has done (minting progress) for a single purchase attempt.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    /// The session as issued to the client.
    pub flow: FlowSession,
    /// The buying account.
    pub account: String,
    /// Whole units this purchase buys.
    pub units: u64,
    /// Whether the client has reported a completed payment.
    pub paid: bool,
    /// Rail-specific payment proof, once reported.
    pub payment_reference: Option<String>,
    /// Checkout reference issued for card payments, if that rail was picked.
    pub checkout_ref: Option<String>,
    /// Current settlement progress, as reported to status polls.
    pub snapshot: StatusSnapshot,
    /// When the payment was reported, for settlement latency accounting.
    pub executed_at: Option<Instant>,
}

/// Shared application state available to all request handlers and the
/// settlement worker.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The gateway's reported version string.
    pub version: String,
    /// Static listing data for the investable catalog. Live availability
    /// comes from the registry, not from these records.
    pub listings: Arc<Vec<Asset>>,
    /// Live sessions keyed by session id.
    pub sessions: Arc<DashMap<String, GatewaySession>>,
    /// Escrows keyed by session id.
    pub escrows: Arc<DashMap<String, PurchaseEscrow>>,
    /// Property-token registry — supply and holdings ground truth.
    pub registry: Arc<RwLock<PropertyRegistry>>,
    /// Ed25519 key that authorizes mints.
    pub issuer: Arc<SigningKey>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// How long an unpaid session lives before the sweep expires it.
    pub session_ttl: Duration,
}

impl AppState {
    /// Builds gateway state and registers every listing's property in the
    /// registry under the gateway's issuer key.
    pub fn new(
        listings: Vec<Asset>,
        issuer: SigningKey,
        session_ttl: Duration,
        metrics: SharedMetrics,
        version: String,
    ) -> anyhow::Result<Self> {
        let issuer_hex = hex::encode(issuer.verifying_key().as_bytes());
        let mut registry = PropertyRegistry::new();
        for listing in &listings {
            registry.register(
                listing.contract_address.clone(),
                listing.unit_symbol.clone(),
                listing.total_units,
                issuer_hex.clone(),
            )?;
        }

        Ok(Self {
            version,
            listings: Arc::new(listings),
            sessions: Arc::new(DashMap::new()),
            escrows: Arc::new(DashMap::new()),
            registry: Arc::new(RwLock::new(registry)),
            issuer: Arc::new(issuer),
            metrics,
            session_ttl,
        })
    }

    /// Looks up a listing by asset id.
    fn listing(&self, asset_id: &str) -> Option<&Asset> {
        self.listings.iter().find(|a| a.id == asset_id)
    }

    /// Looks up a listing by contract address.
    fn listing_by_contract(&self, contract_address: &str) -> Option<&Asset> {
        self.listings
            .iter()
            .find(|a| a.contract_address == contract_address)
    }

    /// A listing with its `available_units` replaced by the registry's
    /// live count.
    fn live_asset(&self, listing: &Asset) -> Asset {
        let available = self
            .registry
            .read()
            .property(&listing.contract_address)
            .map(|info| info.available_units())
            .unwrap_or(0);
        Asset {
            available_units: available,
            ..listing.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/v1/assets", get(assets_handler))
        .route("/v1/validate", post(validate_handler))
        .route("/v1/sessions", post(initiate_handler))
        .route("/v1/sessions/:id/execute", post(execute_handler))
        .route("/v1/sessions/:id/status", get(session_status_handler))
        .route("/v1/sessions/:id/confirm-card", post(confirm_card_handler))
        .route("/v1/holdings/:account", get(holdings_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayStatus {
    /// Gateway software version.
    pub version: String,
    /// Number of listed properties.
    pub assets_listed: u64,
    /// Sessions currently live (not terminal, not expired).
    pub active_sessions: u64,
    /// Units minted across all properties since startup.
    pub units_minted: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Body for `POST /v1/sessions/:id/confirm-card`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmCardRequest {
    /// The checkout reference from the payment descriptor.
    pub checkout_ref: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the gateway is alive.
///
/// This is the liveness probe for orchestrators. It intentionally does not
/// check subsystem health — that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a gateway status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.read();
    let units_minted = state
        .listings
        .iter()
        .filter_map(|l| registry.property(&l.contract_address))
        .map(|info| info.minted_units)
        .sum();
    drop(registry);

    let active = state
        .sessions
        .iter()
        .filter(|entry| !entry.snapshot.status.is_terminal())
        .count() as u64;

    Json(GatewayStatus {
        version: state.version.clone(),
        assets_listed: state.listings.len() as u64,
        active_sessions: active,
        units_minted,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `GET /v1/assets` — returns the investable catalog.
///
/// `available_units` is computed from live registry supply, so a listing
/// that sold out since startup shows zero here.
async fn assets_handler(State(state): State<AppState>) -> impl IntoResponse {
    let catalog: Vec<Asset> = state
        .listings
        .iter()
        .map(|listing| state.live_asset(listing))
        .collect();
    Json(catalog)
}

/// `POST /v1/validate` — authoritative validation of a candidate
/// investment.
///
/// Checks the asset exists, the amount sits inside the listing's bounds,
/// the amount divides into whole units, and live supply covers the
/// purchase. Acceptance issues the session — fee quote included — in the
/// same round trip. Rejections are 200 responses carrying reasons; only
/// malformed requests get error statuses.
async fn validate_handler(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> impl IntoResponse {
    state.metrics.validations_total.inc();

    let Some(listing) = state.listing(&request.asset_id) else {
        state.metrics.validations_rejected_total.inc();
        return Json(ValidateOutcome::Rejected {
            reasons: vec![format!("unknown asset: {}", request.asset_id)],
        });
    };

    let mut reasons = Vec::new();
    if request.amount < listing.minimum_investment {
        reasons.push(format!(
            "amount below minimum investment of {} cents",
            listing.minimum_investment
        ));
    }
    if request.amount > listing.maximum_investment {
        reasons.push(format!(
            "amount above maximum investment of {} cents",
            listing.maximum_investment
        ));
    }
    if listing.price_per_unit == 0 || request.amount % listing.price_per_unit != 0 {
        reasons.push(format!(
            "amount must be a whole multiple of the unit price ({} cents)",
            listing.price_per_unit
        ));
    }
    if request.account.trim().is_empty() {
        reasons.push("account must not be empty".into());
    }

    let units = listing.units_for_amount(request.amount);
    if reasons.is_empty() {
        let available = state
            .registry
            .read()
            .property(&listing.contract_address)
            .map(|info| info.available_units())
            .unwrap_or(0);
        if units > available {
            reasons.push(format!(
                "insufficient supply: {} units requested, {} available",
                units, available
            ));
        }
    }

    if !reasons.is_empty() {
        state.metrics.validations_rejected_total.inc();
        tracing::info!(
            asset_id = %request.asset_id,
            amount = request.amount,
            ?reasons,
            "validation rejected"
        );
        return Json(ValidateOutcome::Rejected { reasons });
    }

    let estimated_fees = request.amount * FEE_BPS / 10_000;
    let session = FlowSession {
        id: format!("sess-{}", Uuid::new_v4()),
        asset_id: listing.id.clone(),
        amount: request.amount,
        estimated_fees,
        total_cost: request.amount + estimated_fees,
        payment_method: None,
        expires_at: Utc::now()
            + chrono::Duration::from_std(state.session_ttl).unwrap_or(chrono::Duration::zero()),
    };

    state.sessions.insert(
        session.id.clone(),
        GatewaySession {
            flow: session.clone(),
            account: request.account,
            units,
            paid: false,
            payment_reference: None,
            checkout_ref: None,
            snapshot: StatusSnapshot::initial(),
            executed_at: None,
        },
    );
    state.metrics.sessions_created_total.inc();
    state.metrics.active_sessions.inc();
    tracing::info!(session_id = %session.id, asset_id = %session.asset_id, units, "session created");

    Json(ValidateOutcome::Accepted { session })
}

/// `POST /v1/sessions` — returns rail-specific payment instructions for
/// an existing session. 404 for unknown or expired sessions.
async fn initiate_handler(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> impl IntoResponse {
    let Some(mut entry) = state.sessions.get_mut(&request.session_id) else {
        return not_found(format!("unknown session: {}", request.session_id));
    };
    if !entry.paid && entry.flow.is_expired() {
        return not_found(format!("unknown session: {}", request.session_id));
    }

    let Some(listing) = state.listing(&entry.flow.asset_id) else {
        return bad_request(format!("listing vanished for session {}", request.session_id));
    };

    entry.flow.payment_method = Some(request.method);
    let descriptor = match request.method {
        PaymentMethod::Wallet => PaymentDescriptor::Chain {
            to: listing.contract_address.clone(),
            data: format!(
                "0x{}",
                hex::encode(format!("purchase:{}:{}", entry.flow.id, entry.units))
            ),
            value: entry.flow.total_cost,
            gas_limit: PURCHASE_GAS_LIMIT,
        },
        PaymentMethod::Card => {
            let checkout_ref = format!("chk-{}", Uuid::new_v4());
            entry.checkout_ref = Some(checkout_ref.clone());
            PaymentDescriptor::Card {
                checkout_ref,
                amount: entry.flow.total_cost,
            }
        }
    };

    Json(descriptor).into_response()
}

/// `POST /v1/sessions/:id/execute` — reports a completed payment and
/// queues the session for settlement.
///
/// Idempotent: re-reporting the same payment reference is a no-op, so a
/// client retrying after a dropped response does not double-fund the
/// escrow.
async fn execute_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> impl IntoResponse {
    if request.session_id != session_id {
        return bad_request("session id in path and body disagree");
    }

    let Some(mut entry) = state.sessions.get_mut(&session_id) else {
        return not_found(format!("unknown session: {}", session_id));
    };

    if entry.paid {
        if entry.payment_reference.as_deref() == Some(request.payment_reference.as_str()) {
            return Json(serde_json::json!({})).into_response();
        }
        return bad_request("session already paid with a different reference");
    }
    if entry.flow.is_expired() {
        return not_found(format!("unknown session: {}", session_id));
    }
    if request.payment_reference.trim().is_empty() {
        return bad_request("payment reference must not be empty");
    }

    let issuer_hex = hex::encode(state.issuer.verifying_key().as_bytes());
    let escrow = match PurchaseEscrow::create(
        session_id.clone(),
        entry.account.clone(),
        issuer_hex,
        entry.flow.total_cost,
    )
    .and_then(|mut escrow| {
        escrow.fund(entry.flow.total_cost)?;
        Ok(escrow)
    }) {
        Ok(escrow) => escrow,
        Err(e) => return bad_request(format!("escrow error: {e}")),
    };
    state.escrows.insert(session_id.clone(), escrow);

    entry.paid = true;
    entry.payment_reference = Some(request.payment_reference);
    entry.executed_at = Some(Instant::now());
    tracing::info!(session_id = %session_id, method = %request.method, "payment reported, settlement queued");

    Json(serde_json::json!({})).into_response()
}

/// `GET /v1/sessions/:id/status` — the current progress snapshot for a
/// session. 404 for unknown or expired sessions.
async fn session_status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&session_id) else {
        return not_found(format!("unknown session: {}", session_id));
    };
    if !entry.paid && entry.flow.is_expired() {
        return not_found(format!("unknown session: {}", session_id));
    }
    Json(entry.snapshot.clone()).into_response()
}

/// `POST /v1/sessions/:id/confirm-card` — confirms a card checkout,
/// yielding the confirmation id the client reports at execution.
async fn confirm_card_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ConfirmCardRequest>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&session_id) else {
        return not_found(format!("unknown session: {}", session_id));
    };
    if entry.checkout_ref.as_deref() != Some(request.checkout_ref.as_str()) {
        return bad_request("checkout reference does not match this session");
    }

    Json(CardConfirmation {
        confirmation_id: format!("card-{}", Uuid::new_v4()),
    })
    .into_response()
}

/// `GET /v1/holdings/:account` — settled positions of an account, valued
/// at the listed unit price.
async fn holdings_handler(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> impl IntoResponse {
    let positions = state.registry.read().positions(&account);
    let now = Utc::now();

    let holdings: Vec<UserHolding> = positions
        .into_iter()
        .filter_map(|(contract, units)| {
            state.listing_by_contract(&contract).map(|listing| UserHolding {
                asset_id: listing.id.clone(),
                unit_symbol: listing.unit_symbol.clone(),
                units,
                value: units.saturating_mul(listing.price_per_unit),
                valued_at: now,
            })
        })
        .collect();

    Json(holdings)
}

// ---------------------------------------------------------------------------
// Settlement Worker
// ---------------------------------------------------------------------------

/// One settlement tick: advance every paid session one step and expire
/// unpaid sessions past their TTL.
///
/// Paid sessions move `Pending -> Minting` on the first tick and settle
/// on the second: the issuer signs the mint payload, the registry mints,
/// and the escrow releases. A mint failure refunds the escrow and marks
/// the session failed. Called on an interval from the serve loop; safe to
/// call from tests directly.
pub fn settle_tick(state: &AppState) {
    // Expire unpaid sessions first. Collect ids before removing so the
    // map is not mutated mid-iteration.
    let expired: Vec<String> = state
        .sessions
        .iter()
        .filter(|entry| !entry.paid && entry.flow.is_expired())
        .map(|entry| entry.key().clone())
        .collect();
    for session_id in expired {
        state.sessions.remove(&session_id);
        state.metrics.sessions_expired_total.inc();
        state.metrics.active_sessions.dec();
        tracing::info!(session_id = %session_id, "unpaid session expired");
    }

    let pending: Vec<String> = state
        .sessions
        .iter()
        .filter(|entry| entry.paid && !entry.snapshot.status.is_terminal())
        .map(|entry| entry.key().clone())
        .collect();

    for session_id in pending {
        let Some(mut entry) = state.sessions.get_mut(&session_id) else {
            continue;
        };

        match entry.snapshot.status {
            SessionStatus::Pending => {
                entry.snapshot = StatusSnapshot {
                    progress: 55,
                    status: SessionStatus::Minting,
                    tx_hash: None,
                    message: Some("minting units on the property-token contract".into()),
                };
            }
            SessionStatus::Minting => settle_session(state, &session_id, &mut entry),
            SessionStatus::Completed | SessionStatus::Failed => {}
        }
    }
}

/// Mints the session's units and closes its escrow, writing the terminal
/// snapshot either way.
fn settle_session(state: &AppState, session_id: &str, entry: &mut GatewaySession) {
    let contract = state
        .listing(&entry.flow.asset_id)
        .map(|listing| listing.contract_address.clone());
    let Some(contract) = contract else {
        fail_session(state, session_id, entry, "listing vanished during settlement");
        return;
    };

    let signature = state
        .issuer
        .sign(&mint_payload(&contract, &entry.account, entry.units));
    let mint_result = state.registry.write().mint(
        &contract,
        &entry.account,
        entry.units,
        &hex::encode(signature.to_bytes()),
    );

    match mint_result {
        Ok(()) => {
            if let Some(mut escrow) = state.escrows.get_mut(session_id) {
                if let Err(e) = escrow.release() {
                    tracing::error!(session_id, "escrow release failed: {}", e);
                }
            }

            let tx_hash = format!("0x{}", hex::encode(Sha256::digest(session_id.as_bytes())));
            entry.snapshot = StatusSnapshot {
                progress: 100,
                status: SessionStatus::Completed,
                tx_hash: Some(tx_hash),
                message: Some(format!("{} units minted", entry.units)),
            };
            state.metrics.mints_settled_total.inc();
            state.metrics.active_sessions.dec();
            if let Some(executed_at) = entry.executed_at {
                state
                    .metrics
                    .settlement_latency_seconds
                    .observe(executed_at.elapsed().as_secs_f64());
            }
            tracing::info!(session_id, units = entry.units, "purchase settled");
        }
        Err(e) => fail_session(state, session_id, entry, &format!("mint failed: {e}")),
    }
}

/// Marks a session terminally failed and refunds its escrow.
fn fail_session(state: &AppState, session_id: &str, entry: &mut GatewaySession, message: &str) {
    if let Some(mut escrow) = state.escrows.get_mut(session_id) {
        if let Err(e) = escrow.refund() {
            tracing::error!(session_id, "escrow refund failed: {}", e);
        }
    }
    entry.snapshot = StatusSnapshot {
        progress: entry.snapshot.progress,
        status: SessionStatus::Failed,
        tx_hash: None,
        message: Some(message.to_string()),
    };
    state.metrics.settlements_failed_total.inc();
    state.metrics.active_sessions.dec();
    tracing::warn!(session_id, message, "settlement failed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use parcel_contracts::escrow::EscrowStatus;
    use rand::rngs::OsRng;
    use tower::ServiceExt;

    fn demo_listing() -> Asset {
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
        }
    }

    fn test_state() -> AppState {
        AppState::new(
            vec![demo_listing()],
            SigningKey::generate(&mut OsRng),
            Duration::from_secs(900),
            Arc::new(crate::metrics::GatewayMetrics::new()),
            "0.1.0-test".into(),
        )
        .expect("state")
    }

    /// Sends a GET request and returns (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body)
    }

    /// Runs validate for 1,000,000 cents and returns the issued session.
    async fn accepted_session(router: &Router) -> FlowSession {
        let (status, body) = post_json(
            router,
            "/v1/validate",
            serde_json::json!({
                "asset_id": "prop-marina-b",
                "amount": 1_000_000,
                "account": "0xalice"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        match serde_json::from_slice(&body).unwrap() {
            ValidateOutcome::Accepted { session } => session,
            ValidateOutcome::Rejected { reasons } => panic!("rejected: {reasons:?}"),
        }
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn catalog_reports_live_availability() {
        let state = test_state();
        let router = create_router(state.clone());

        let (status, body) = get(&router, "/v1/assets").await;
        assert_eq!(status, StatusCode::OK);
        let catalog: Vec<Asset> = serde_json::from_slice(&body).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].available_units, 25_000);

        // Mint some units directly; the catalog must reflect it.
        let listing = demo_listing();
        let signature = state
            .issuer
            .sign(&mint_payload(&listing.contract_address, "0xbob", 500));
        state
            .registry
            .write()
            .mint(
                &listing.contract_address,
                "0xbob",
                500,
                &hex::encode(signature.to_bytes()),
            )
            .expect("mint");

        let (_, body) = get(&router, "/v1/assets").await;
        let catalog: Vec<Asset> = serde_json::from_slice(&body).unwrap();
        assert_eq!(catalog[0].available_units, 24_500);
    }

    #[tokio::test]
    async fn validate_accepts_and_quotes_fees() {
        let router = create_router(test_state());
        let session = accepted_session(&router).await;

        assert!(session.id.starts_with("sess-"));
        assert_eq!(session.amount, 1_000_000);
        assert_eq!(session.estimated_fees, 25_000); // 250 bps
        assert_eq!(session.total_cost, 1_025_000);
        assert!(session.payment_method.is_none());

        // The session is immediately pollable, still pending.
        let (status, body) = get(&router, &format!("/v1/sessions/{}/status", session.id)).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Pending);
        assert_eq!(snapshot.progress, 0);
    }

    #[tokio::test]
    async fn validate_rejects_with_all_applicable_reasons() {
        let router = create_router(test_state());

        // Below minimum AND not a whole unit multiple.
        let (status, body) = post_json(
            &router,
            "/v1/validate",
            serde_json::json!({
                "asset_id": "prop-marina-b",
                "amount": 15_500,
                "account": "0xalice"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let outcome: ValidateOutcome = serde_json::from_slice(&body).unwrap();
        match outcome {
            ValidateOutcome::Rejected { reasons } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("minimum investment"));
                assert!(reasons[1].contains("whole multiple"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_rejects_unknown_asset() {
        let router = create_router(test_state());
        let (status, body) = post_json(
            &router,
            "/v1/validate",
            serde_json::json!({
                "asset_id": "prop-nowhere",
                "amount": 1_000_000,
                "account": "0xalice"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let outcome: ValidateOutcome = serde_json::from_slice(&body).unwrap();
        assert!(matches!(outcome, ValidateOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn wallet_purchase_settles_and_updates_holdings() {
        let state = test_state();
        let router = create_router(state.clone());
        let session = accepted_session(&router).await;

        // Initiate: wallet rail yields a chain descriptor.
        let (status, body) = post_json(
            &router,
            "/v1/sessions",
            serde_json::json!({ "session_id": session.id, "method": "wallet" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let descriptor: PaymentDescriptor = serde_json::from_slice(&body).unwrap();
        match &descriptor {
            PaymentDescriptor::Chain { to, value, gas_limit, .. } => {
                assert_eq!(to, &demo_listing().contract_address);
                assert_eq!(*value, session.total_cost);
                assert_eq!(*gas_limit, PURCHASE_GAS_LIMIT);
            }
            other => panic!("expected chain descriptor, got {other:?}"),
        }

        // Execute with a fake tx hash.
        let (status, _) = post_json(
            &router,
            &format!("/v1/sessions/{}/execute", session.id),
            serde_json::json!({
                "session_id": session.id,
                "method": "wallet",
                "payment_reference": "0xdeadbeef"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Two ticks: pending -> minting -> completed.
        settle_tick(&state);
        let (_, body) = get(&router, &format!("/v1/sessions/{}/status", session.id)).await;
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Minting);

        settle_tick(&state);
        let (_, body) = get(&router, &format!("/v1/sessions/{}/status", session.id)).await;
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.tx_hash.is_some());

        // 1,000,000 cents at 10,000/unit = 100 units.
        let (status, body) = get(&router, "/v1/holdings/0xalice").await;
        assert_eq!(status, StatusCode::OK);
        let holdings: Vec<UserHolding> = serde_json::from_slice(&body).unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].units, 100);
        assert_eq!(holdings[0].value, 1_000_000);
        assert_eq!(holdings[0].unit_symbol, "MRNA-B");

        // Escrow released to the issuer.
        let escrow = state.escrows.get(&session.id).expect("escrow");
        assert_eq!(escrow.status, EscrowStatus::Released);
    }

    #[tokio::test]
    async fn card_purchase_requires_matching_checkout_ref() {
        let state = test_state();
        let router = create_router(state.clone());
        let session = accepted_session(&router).await;

        let (status, body) = post_json(
            &router,
            "/v1/sessions",
            serde_json::json!({ "session_id": session.id, "method": "card" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let descriptor: PaymentDescriptor = serde_json::from_slice(&body).unwrap();
        let checkout_ref = match descriptor {
            PaymentDescriptor::Card { checkout_ref, amount } => {
                assert_eq!(amount, session.total_cost);
                checkout_ref
            }
            other => panic!("expected card descriptor, got {other:?}"),
        };

        // Wrong reference is refused.
        let (status, _) = post_json(
            &router,
            &format!("/v1/sessions/{}/confirm-card", session.id),
            serde_json::json!({ "checkout_ref": "chk-bogus" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Right reference yields a confirmation id usable at execute.
        let (status, body) = post_json(
            &router,
            &format!("/v1/sessions/{}/confirm-card", session.id),
            serde_json::json!({ "checkout_ref": checkout_ref }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let confirmation: CardConfirmation = serde_json::from_slice(&body).unwrap();
        assert!(confirmation.confirmation_id.starts_with("card-"));

        let (status, _) = post_json(
            &router,
            &format!("/v1/sessions/{}/execute", session.id),
            serde_json::json!({
                "session_id": session.id,
                "method": "card",
                "payment_reference": confirmation.confirmation_id
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn execute_is_idempotent_for_the_same_reference() {
        let state = test_state();
        let router = create_router(state.clone());
        let session = accepted_session(&router).await;

        let execute_body = serde_json::json!({
            "session_id": session.id,
            "method": "wallet",
            "payment_reference": "0xdeadbeef"
        });
        let path = format!("/v1/sessions/{}/execute", session.id);

        let (status, _) = post_json(&router, &path, execute_body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(&router, &path, execute_body).await;
        assert_eq!(status, StatusCode::OK);

        // A different reference after payment is a client bug, not a retry.
        let (status, _) = post_json(
            &router,
            &path,
            serde_json::json!({
                "session_id": session.id,
                "method": "wallet",
                "payment_reference": "0xother"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Only one escrow was funded.
        let escrow = state.escrows.get(&session.id).expect("escrow");
        assert_eq!(escrow.status, EscrowStatus::Funded);
        assert_eq!(escrow.total_cost, session.total_cost);
    }

    #[tokio::test]
    async fn unknown_session_is_404_everywhere() {
        let router = create_router(test_state());

        let (status, _) = get(&router, "/v1/sessions/sess-nope/status").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = post_json(
            &router,
            "/v1/sessions",
            serde_json::json!({ "session_id": "sess-nope", "method": "wallet" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = post_json(
            &router,
            "/v1/sessions/sess-nope/execute",
            serde_json::json!({
                "session_id": "sess-nope",
                "method": "wallet",
                "payment_reference": "0x0"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn expired_unpaid_session_is_swept() {
        let state = test_state();
        let router = create_router(state.clone());
        let session = accepted_session(&router).await;

        // Force expiry.
        state
            .sessions
            .get_mut(&session.id)
            .expect("session")
            .flow
            .expires_at = Utc::now() - chrono::Duration::seconds(1);

        settle_tick(&state);

        let (status, _) = get(&router, &format!("/v1/sessions/{}/status", session.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.metrics.sessions_expired_total.get(), 1);
    }

    #[tokio::test]
    async fn oversubscribed_settlement_fails_and_refunds() {
        let state = test_state();
        let router = create_router(state.clone());
        let session = accepted_session(&router).await;

        let (status, _) = post_json(
            &router,
            &format!("/v1/sessions/{}/execute", session.id),
            serde_json::json!({
                "session_id": session.id,
                "method": "wallet",
                "payment_reference": "0xdeadbeef"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Drain the supply behind the session's back so the mint fails.
        let listing = demo_listing();
        let drained = listing.total_units;
        let signature = state
            .issuer
            .sign(&mint_payload(&listing.contract_address, "0xwhale", drained));
        state
            .registry
            .write()
            .mint(
                &listing.contract_address,
                "0xwhale",
                drained,
                &hex::encode(signature.to_bytes()),
            )
            .expect("drain supply");

        settle_tick(&state); // pending -> minting
        settle_tick(&state); // minting -> failed

        let (_, body) = get(&router, &format!("/v1/sessions/{}/status", session.id)).await;
        let snapshot: StatusSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot.message.expect("message").contains("mint failed"));

        let escrow = state.escrows.get(&session.id).expect("escrow");
        assert_eq!(escrow.status, EscrowStatus::Refunded);
        assert_eq!(state.metrics.settlements_failed_total.get(), 1);
    }
}
