//! # Flow Controller
//!
//! The purchase flow's state machine. Owns every piece of mutable flow
//! state — current state, selected asset, requested amount, session,
//! latest snapshot — exclusively. No other component mutates flow state;
//! the clients are stateless and the poller reports back through this
//! controller.
//!
//! ## States
//!
//! ```text
//!   asset-selection ──validate()──► validation ──accept──► payment
//!         ▲                             │
//!         └─────────────reject──────────┘
//!
//!   payment ──choose_payment(rail)──► processing ──completed──► complete
//!
//!   any state ──reset()──► asset-selection
//! ```
//!
//! Strictly linear. The only backwards edge is a user-initiated `reset`.
//! A failed settlement stays in `processing` with the error recorded —
//! there is no automatic reset, because "your payment went through but
//! minting failed" is exactly the state a user must see, not one to
//! silently paper over.
//!
//! ## Invariants
//!
//! - A session exists if and only if the state is `payment`, `processing`,
//!   or `complete`.
//! - The poller runs only while the state is exactly `processing`.
//! - Holdings are refreshed exactly once per transition into `complete`.

use std::sync::Arc;

use serde_json::json;

use crate::analytics::{AnalyticsSink, TracingSink};
use crate::asset::{Asset, UserHolding};
use crate::backend::{ExecuteRequest, InitiateRequest, TokenizationBackend, ValidateOutcome, ValidateRequest};
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::payment::PaymentRail;
use crate::poller::StatusPoller;
use crate::session::{FlowSession, SessionStatus, StatusSnapshot};

// ---------------------------------------------------------------------------
// Flow State
// ---------------------------------------------------------------------------

/// The flow's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowState {
    /// Browsing the catalog, choosing an asset and amount.
    AssetSelection,
    /// A validation request is in flight. Transient.
    Validation,
    /// Validation accepted; a session exists; awaiting rail choice.
    Payment,
    /// Payment executed; settlement in progress (or failed — see
    /// [`FlowController::processing_error`]).
    Processing,
    /// Terminal: units minted, holdings refreshed.
    Complete,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowState::AssetSelection => write!(f, "asset-selection"),
            FlowState::Validation => write!(f, "validation"),
            FlowState::Payment => write!(f, "payment"),
            FlowState::Processing => write!(f, "processing"),
            FlowState::Complete => write!(f, "complete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Sequences one purchase from catalog browse to settled units.
///
/// Single-owner, single-task: `&mut self` on every transition makes
/// concurrent mutation unrepresentable. Cancelling an in-flight `observe`
/// is done by dropping its future (e.g. racing it against a UI reset in
/// `select!`), after which `reset` puts the flow back into asset selection.
pub struct FlowController {
    backend: Arc<dyn TokenizationBackend>,
    analytics: Arc<dyn AnalyticsSink>,
    config: FlowConfig,
    /// The purchasing account, fixed at construction.
    account: String,

    state: FlowState,
    asset: Option<Asset>,
    amount: u64,
    session: Option<FlowSession>,
    snapshot: Option<StatusSnapshot>,
    processing_error: Option<String>,
    holdings: Vec<UserHolding>,
}

impl FlowController {
    /// Creates a controller for `account` over the given backend, with the
    /// default config and the tracing analytics sink.
    pub fn new(backend: Arc<dyn TokenizationBackend>, account: impl Into<String>) -> Self {
        Self {
            backend,
            analytics: Arc::new(TracingSink),
            config: FlowConfig::default(),
            account: account.into(),
            state: FlowState::AssetSelection,
            asset: None,
            amount: 0,
            session: None,
            snapshot: None,
            processing_error: None,
            holdings: Vec::new(),
        }
    }

    /// Replaces the flow config (timings).
    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the analytics sink.
    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = sink;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The current flow state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// The currently selected asset, if any.
    pub fn selected_asset(&self) -> Option<&Asset> {
        self.asset.as_ref()
    }

    /// The requested investment amount, in cents.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// The active session, present iff the state is payment, processing,
    /// or complete.
    pub fn session(&self) -> Option<&FlowSession> {
        self.session.as_ref()
    }

    /// The latest status snapshot, if any poll has landed.
    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        self.snapshot.as_ref()
    }

    /// The recorded settlement error while in the processing failed
    /// sub-state.
    pub fn processing_error(&self) -> Option<&str> {
        self.processing_error.as_deref()
    }

    /// Holdings as of the last refresh (after the last completion).
    pub fn holdings(&self) -> &[UserHolding] {
        &self.holdings
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Select the asset to invest in. Legal only in asset selection.
    ///
    /// Defaults the amount to the asset's minimum investment.
    pub fn select_asset(&mut self, asset: Asset) -> Result<(), FlowError> {
        if self.state != FlowState::AssetSelection {
            return Err(FlowError::invalid_state(
                self.state.to_string(),
                "select an asset",
            ));
        }
        self.amount = asset.minimum_investment;
        self.analytics.record(
            "asset_selected",
            json!({ "asset_id": asset.id, "default_amount": self.amount }),
        );
        self.asset = Some(asset);
        Ok(())
    }

    /// Set the requested amount. Legal only in asset selection, after an
    /// asset is selected.
    ///
    /// Bounds are advisory here — out-of-range amounts are accepted and
    /// left for the backend to reject at validation.
    pub fn set_amount(&mut self, amount: u64) -> Result<(), FlowError> {
        if self.state != FlowState::AssetSelection {
            return Err(FlowError::invalid_state(
                self.state.to_string(),
                "set the amount",
            ));
        }
        let Some(asset) = &self.asset else {
            return Err(FlowError::invalid_state(
                "asset-selection (no asset selected)".to_string(),
                "set the amount",
            ));
        };
        if !asset.amount_within_bounds(amount) {
            tracing::debug!(
                amount,
                min = asset.minimum_investment,
                max = asset.maximum_investment,
                "amount outside advisory bounds, deferring to backend validation"
            );
        }
        self.amount = amount;
        Ok(())
    }

    /// Submit the candidate (asset, amount, account) for authoritative
    /// validation.
    ///
    /// On acceptance the backend issues the flow session and the state
    /// moves to payment. On rejection the state returns to asset selection
    /// and the backend's reasons are surfaced verbatim.
    pub async fn validate(&mut self) -> Result<(), FlowError> {
        if self.state != FlowState::AssetSelection {
            return Err(FlowError::invalid_state(self.state.to_string(), "validate"));
        }
        let Some(asset) = self.asset.clone() else {
            return Err(FlowError::invalid_state(
                "asset-selection (no asset selected)".to_string(),
                "validate",
            ));
        };

        self.state = FlowState::Validation;
        let outcome = self
            .backend
            .validate_investment(ValidateRequest {
                asset_id: asset.id.clone(),
                amount: self.amount,
                account: self.account.clone(),
            })
            .await;

        match outcome {
            Ok(ValidateOutcome::Accepted { session }) => {
                tracing::info!(
                    session_id = %session.id,
                    asset_id = %asset.id,
                    amount = self.amount,
                    total_cost = session.total_cost,
                    "validation accepted"
                );
                self.analytics.record(
                    "validation_accepted",
                    json!({
                        "session_id": session.id,
                        "asset_id": asset.id,
                        "amount": self.amount,
                        "total_cost": session.total_cost,
                    }),
                );
                self.session = Some(session);
                self.state = FlowState::Payment;
                Ok(())
            }
            Ok(ValidateOutcome::Rejected { reasons }) => {
                self.state = FlowState::AssetSelection;
                self.analytics.record(
                    "validation_rejected",
                    json!({ "asset_id": asset.id, "reasons": reasons }),
                );
                Err(FlowError::ValidationRejected { reasons })
            }
            Err(e) => {
                // Fire-and-report: no automatic retry, the user re-triggers.
                self.state = FlowState::AssetSelection;
                Err(e.into())
            }
        }
    }

    /// Pay for the session on the given rail and start settlement.
    ///
    /// Legal only in the payment state. On initiation failure (no money
    /// has moved) the state stays in payment so the user can re-trigger;
    /// from the moment the rail is asked to submit, any failure is
    /// terminal for the attempt — the flow enters the processing failed
    /// sub-state and polling never starts for it.
    pub async fn choose_payment(&mut self, rail: &dyn PaymentRail) -> Result<(), FlowError> {
        if self.state != FlowState::Payment {
            return Err(FlowError::invalid_state(
                self.state.to_string(),
                "choose a payment method",
            ));
        }
        let Some(session) = self.session.clone() else {
            // Unreachable by the session invariant; reported rather than
            // panicked on because money is involved.
            return Err(FlowError::invalid_state(
                self.state.to_string(),
                "choose a payment method without a session",
            ));
        };
        if session.is_expired() {
            return Err(FlowError::SessionExpired {
                session_id: session.id,
            });
        }

        let method = rail.method();
        let descriptor = self
            .backend
            .initiate_payment(InitiateRequest {
                session_id: session.id.clone(),
                method,
            })
            .await
            .map_err(|e| FlowError::PaymentInitiationFailed(e.to_string()))?;

        if let Some(s) = self.session.as_mut() {
            s.payment_method = Some(method);
        }

        // Rail errors (wallet rejection, RPC failure, card decline) are
        // terminal for this attempt: the session was never executed, so
        // there is nothing to poll for.
        let receipt = match rail.submit(&session, &descriptor).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let message = e.to_string();
                self.state = FlowState::Processing;
                self.processing_error = Some(message.clone());
                self.analytics.record(
                    "flow_failed",
                    json!({ "session_id": session.id, "message": message }),
                );
                return Err(e);
            }
        };

        match self
            .backend
            .execute_tokenization(ExecuteRequest {
                session_id: session.id.clone(),
                method,
                payment_reference: receipt.reference.clone(),
            })
            .await
        {
            Ok(()) => {
                tracing::info!(
                    session_id = %session.id,
                    method = %method,
                    reference = %receipt.reference,
                    "payment executed, settlement started"
                );
                self.analytics.record(
                    "payment_submitted",
                    json!({
                        "session_id": session.id,
                        "method": method.to_string(),
                        "reference": receipt.reference,
                    }),
                );
                self.snapshot = Some(StatusSnapshot::initial());
                self.state = FlowState::Processing;
                Ok(())
            }
            Err(e) => {
                // The rail already took payment: this attempt is in
                // processing, failed, until the user resets.
                let message = format!("payment taken but execution failed: {}", e);
                self.state = FlowState::Processing;
                self.processing_error = Some(message.clone());
                self.analytics.record(
                    "flow_failed",
                    json!({ "session_id": session.id, "message": message }),
                );
                Err(FlowError::ProcessingFailed { message })
            }
        }
    }

    /// Drive polling until the session settles.
    ///
    /// Legal in processing (polls to terminal) and complete (immediate
    /// no-op — completed flows issue no further polls). Returns the final
    /// flow state, or the terminal error for failed settlements and
    /// unreachable backends.
    pub async fn observe(&mut self) -> Result<FlowState, FlowError> {
        match self.state {
            FlowState::Processing => {}
            FlowState::Complete => return Ok(FlowState::Complete),
            other => {
                return Err(FlowError::invalid_state(other.to_string(), "observe settlement"));
            }
        }
        let Some(session_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            return Err(FlowError::invalid_state(
                self.state.to_string(),
                "observe settlement without a session",
            ));
        };

        let poller = StatusPoller::new(Arc::clone(&self.backend), self.config.clone());
        let result = {
            let slot = &mut self.snapshot;
            poller
                .poll_until_terminal(&session_id, |s| *slot = Some(s.clone()))
                .await
        };

        match result {
            Ok(terminal) => self.apply_snapshot(terminal).await,
            Err(FlowError::BackendUnreachable { attempts, elapsed_ms }) => {
                let message = format!(
                    "backend unreachable after {} consecutive poll failures",
                    attempts
                );
                self.processing_error = Some(message);
                self.analytics.record(
                    "flow_unreachable",
                    json!({ "session_id": session_id, "attempts": attempts }),
                );
                Err(FlowError::BackendUnreachable { attempts, elapsed_ms })
            }
            Err(e) => Err(e),
        }
    }

    /// Apply one status snapshot to the flow.
    ///
    /// Idempotent: re-applying the snapshot the flow already holds changes
    /// nothing observable. Completion side effects (holdings refresh,
    /// analytics) fire exactly once per transition into complete, and the
    /// failure event fires exactly once per entry into the failed
    /// sub-state — keyed on the recorded error, not snapshot equality,
    /// because the poller has already written the terminal snapshot by
    /// the time it is applied.
    pub async fn apply_snapshot(
        &mut self,
        snapshot: StatusSnapshot,
    ) -> Result<FlowState, FlowError> {
        match self.state {
            // Terminal states are immutable; late or duplicate snapshots
            // are absorbed.
            FlowState::Complete => Ok(FlowState::Complete),
            FlowState::Processing => {
                self.snapshot = Some(snapshot.clone());
                match snapshot.status {
                    SessionStatus::Completed => {
                        self.state = FlowState::Complete;
                        self.processing_error = None;
                        self.refresh_holdings().await;
                        self.analytics.record(
                            "flow_completed",
                            json!({
                                "session_id": self.session.as_ref().map(|s| s.id.clone()),
                                "tx_hash": snapshot.tx_hash,
                            }),
                        );
                        Ok(FlowState::Complete)
                    }
                    SessionStatus::Failed => {
                        let message = snapshot
                            .message
                            .unwrap_or_else(|| "tokenization failed".to_string());
                        let entered_failed = self.processing_error.is_none();
                        self.processing_error = Some(message.clone());
                        if entered_failed {
                            self.analytics.record(
                                "flow_failed",
                                json!({
                                    "session_id": self.session.as_ref().map(|s| s.id.clone()),
                                    "message": message,
                                }),
                            );
                        }
                        Err(FlowError::ProcessingFailed { message })
                    }
                    SessionStatus::Pending | SessionStatus::Minting => Ok(FlowState::Processing),
                }
            }
            other => Err(FlowError::invalid_state(
                other.to_string(),
                "apply a status snapshot",
            )),
        }
    }

    /// Abandon the current attempt and return to asset selection.
    ///
    /// Legal from any state. Discards the session, snapshot, and any
    /// recorded error; the selected asset and amount are kept so the user
    /// can immediately retry.
    pub fn reset(&mut self) {
        tracing::debug!(from = %self.state, "flow reset");
        self.analytics
            .record("flow_reset", json!({ "from": self.state.to_string() }));
        self.state = FlowState::AssetSelection;
        self.session = None;
        self.snapshot = None;
        self.processing_error = None;
    }

    // -----------------------------------------------------------------------
    // Holdings
    // -----------------------------------------------------------------------

    /// Refresh holdings from the backend. Completion must not fail on a
    /// stale-holdings read, so errors are logged and swallowed here.
    async fn refresh_holdings(&mut self) {
        match self.backend.user_holdings(&self.account).await {
            Ok(holdings) => {
                tracing::debug!(count = holdings.len(), "holdings refreshed");
                self.holdings = holdings;
            }
            Err(e) => {
                tracing::warn!(error = %e, "holdings refresh failed; keeping stale view");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    fn sample_asset() -> Asset {
        Asset {
            id: "asset-1".into(),
            title: "Marina Heights, Tower B".into(),
            location: "Dubai Marina".into(),
            total_price: 250_000_000,
            price_per_unit: 10_000,
            total_units: 25_000,
            available_units: 18_000,
            minimum_investment: 100_000,
            maximum_investment: 5_000_000,
            contract_address: "0x00000000000000000000000000000000000a55e7".into(),
            unit_symbol: "MRNA-B".into(),
        }
    }

    fn controller(backend: Arc<MockBackend>) -> FlowController {
        FlowController::new(backend, "0xbuyer")
    }

    #[test]
    fn select_asset_defaults_amount_to_minimum() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        flow.select_asset(sample_asset()).expect("select");
        assert_eq!(flow.amount(), 100_000);
        assert_eq!(flow.state(), FlowState::AssetSelection);
    }

    #[test]
    fn set_amount_is_advisory_about_bounds() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        flow.select_asset(sample_asset()).expect("select");
        // Below minimum: accepted locally, backend decides later.
        flow.set_amount(1).expect("set");
        assert_eq!(flow.amount(), 1);
    }

    #[test]
    fn set_amount_requires_an_asset() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        let err = flow.set_amount(200_000).expect_err("no asset yet");
        assert!(matches!(err, FlowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn accepted_validation_moves_to_payment_with_session() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        flow.select_asset(sample_asset()).expect("select");
        flow.set_amount(200_000).expect("set");

        flow.validate().await.expect("validate");
        assert_eq!(flow.state(), FlowState::Payment);
        let session = flow.session().expect("session present in payment");
        assert_eq!(session.amount, 200_000);
        assert_eq!(session.total_cost, 205_000);
    }

    #[tokio::test]
    async fn rejected_validation_stays_in_asset_selection() {
        let backend = Arc::new(MockBackend::new());
        backend.reject_validation(vec![
            "amount below minimum".into(),
            "asset unavailable".into(),
        ]);
        let mut flow = controller(backend);
        flow.select_asset(sample_asset()).expect("select");

        let err = flow.validate().await.expect_err("rejected");
        assert_eq!(flow.state(), FlowState::AssetSelection);
        assert!(flow.session().is_none());
        match err {
            FlowError::ValidationRejected { reasons } => {
                assert_eq!(reasons, vec![
                    "amount below minimum".to_string(),
                    "asset unavailable".to_string(),
                ]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn validate_is_rejected_outside_asset_selection() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        flow.select_asset(sample_asset()).expect("select");
        flow.validate().await.expect("validate");

        // Now in payment; a second validate must be rejected by construction.
        let err = flow.validate().await.expect_err("wrong state");
        assert!(matches!(err, FlowError::InvalidState { .. }));
        assert_eq!(flow.state(), FlowState::Payment);
    }

    #[tokio::test]
    async fn reset_clears_session_and_snapshot_from_any_state() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        flow.select_asset(sample_asset()).expect("select");
        flow.validate().await.expect("validate");
        assert!(flow.session().is_some());

        flow.reset();
        assert_eq!(flow.state(), FlowState::AssetSelection);
        assert!(flow.session().is_none());
        assert!(flow.snapshot().is_none());
        assert!(flow.processing_error().is_none());
        // Asset and amount survive for an immediate retry.
        assert!(flow.selected_asset().is_some());
        assert_eq!(flow.amount(), 100_000);
    }

    #[tokio::test]
    async fn session_invariant_holds_across_states() {
        let mut flow = controller(Arc::new(MockBackend::new()));
        assert!(flow.session().is_none()); // asset-selection
        flow.select_asset(sample_asset()).expect("select");
        assert!(flow.session().is_none()); // still asset-selection
        flow.validate().await.expect("validate");
        assert!(flow.session().is_some()); // payment
    }
}
