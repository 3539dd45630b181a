//! # Scripted Mock Backend
//!
//! An in-memory [`TokenizationBackend`] double for tests and local
//! development. Responses are scripted up front; every operation records a
//! call count so tests can assert *how often* the flow talked to the
//! backend, not just what it got back.
//!
//! The mock accepts any validation request by default, applying a flat
//! 2.5% fee schedule. Tests opt into rejections and transport failures via
//! the scripting methods.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::asset::{Asset, UserHolding};
use crate::backend::{
    BackendError, CardConfirmation, ExecuteRequest, InitiateRequest, PaymentDescriptor,
    TokenizationBackend, ValidateOutcome, ValidateRequest,
};
use crate::payment::PaymentMethod;
use crate::session::{FlowSession, SessionStatus, StatusSnapshot};

/// Flat fee in basis points applied by the mock's accept path.
const MOCK_FEE_BPS: u64 = 250;

/// Per-operation call counters. Copied out via [`MockBackend::calls`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub list_assets: u32,
    pub validate: u32,
    pub initiate: u32,
    pub execute: u32,
    pub status: u32,
    pub holdings: u32,
    pub confirm_card: u32,
}

/// One scripted answer for a `session_status` poll.
type StatusStep = Result<StatusSnapshot, BackendError>;

#[derive(Default)]
struct MockState {
    assets: Vec<Asset>,
    rejection: Option<Vec<String>>,
    status_script: VecDeque<StatusStep>,
    last_status: Option<StatusSnapshot>,
    holdings: HashMap<String, Vec<UserHolding>>,
    sessions: HashMap<String, FlowSession>,
    session_seq: u64,
}

/// Scripted in-memory backend.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    calls: Mutex<CallCounters>,
}

impl MockBackend {
    /// An empty mock: no assets, accepts all validations.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock pre-seeded with a catalog.
    pub fn with_assets(assets: Vec<Asset>) -> Self {
        let mock = Self::new();
        mock.state.lock().assets = assets;
        mock
    }

    /// Script all subsequent validations to reject with these reasons.
    pub fn reject_validation(&self, reasons: Vec<String>) {
        self.state.lock().rejection = Some(reasons);
    }

    /// Clear a scripted rejection; validations accept again.
    pub fn accept_validation(&self) {
        self.state.lock().rejection = None;
    }

    /// Append a snapshot to the status script. Polls consume the script in
    /// order; once exhausted, the last snapshot repeats.
    pub fn queue_status(&self, snapshot: StatusSnapshot) {
        self.state.lock().status_script.push_back(Ok(snapshot));
    }

    /// Append a transient transport failure to the status script.
    pub fn queue_status_transport_error(&self, message: &str) {
        self.state
            .lock()
            .status_script
            .push_back(Err(BackendError::Transport(message.to_string())));
    }

    /// Replace the holdings returned for an account.
    pub fn set_holdings(&self, account: &str, holdings: Vec<UserHolding>) {
        self.state.lock().holdings.insert(account.to_string(), holdings);
    }

    /// Snapshot of the per-operation call counters.
    pub fn calls(&self) -> CallCounters {
        *self.calls.lock()
    }

    fn contract_for(state: &MockState, asset_id: &str) -> String {
        state
            .assets
            .iter()
            .find(|a| a.id == asset_id)
            .map(|a| a.contract_address.clone())
            .unwrap_or_else(|| "0x0000000000000000000000000000000000000000".into())
    }
}

#[async_trait]
impl TokenizationBackend for MockBackend {
    async fn list_assets(&self) -> Result<Vec<Asset>, BackendError> {
        self.calls.lock().list_assets += 1;
        Ok(self.state.lock().assets.clone())
    }

    async fn validate_investment(
        &self,
        request: ValidateRequest,
    ) -> Result<ValidateOutcome, BackendError> {
        self.calls.lock().validate += 1;
        let mut state = self.state.lock();

        if let Some(reasons) = state.rejection.clone() {
            return Ok(ValidateOutcome::Rejected { reasons });
        }

        state.session_seq += 1;
        let estimated_fees = request.amount * MOCK_FEE_BPS / 10_000;
        let session = FlowSession {
            id: format!("sess-{}", state.session_seq),
            asset_id: request.asset_id,
            amount: request.amount,
            estimated_fees,
            total_cost: request.amount + estimated_fees,
            payment_method: None,
            expires_at: Utc::now() + Duration::minutes(15),
        };
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(ValidateOutcome::Accepted { session })
    }

    async fn initiate_payment(
        &self,
        request: InitiateRequest,
    ) -> Result<PaymentDescriptor, BackendError> {
        self.calls.lock().initiate += 1;
        let state = self.state.lock();
        let session = state
            .sessions
            .get(&request.session_id)
            .ok_or_else(|| BackendError::UnknownSession(request.session_id.clone()))?;

        Ok(match request.method {
            PaymentMethod::Wallet => PaymentDescriptor::Chain {
                to: Self::contract_for(&state, &session.asset_id),
                data: format!("0x{}", hex::encode(session.id.as_bytes())),
                value: session.total_cost,
                gas_limit: 120_000,
            },
            PaymentMethod::Card => PaymentDescriptor::Card {
                checkout_ref: format!("chk_{}", session.id),
                amount: session.total_cost,
            },
        })
    }

    async fn execute_tokenization(&self, request: ExecuteRequest) -> Result<(), BackendError> {
        self.calls.lock().execute += 1;
        let state = self.state.lock();
        if !state.sessions.contains_key(&request.session_id) {
            return Err(BackendError::UnknownSession(request.session_id));
        }
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> Result<StatusSnapshot, BackendError> {
        self.calls.lock().status += 1;
        let mut state = self.state.lock();
        if !state.sessions.contains_key(session_id) {
            return Err(BackendError::UnknownSession(session_id.to_string()));
        }

        match state.status_script.pop_front() {
            Some(Ok(snapshot)) => {
                state.last_status = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => Ok(state
                .last_status
                .clone()
                .unwrap_or_else(StatusSnapshot::initial)),
        }
    }

    async fn user_holdings(&self, account: &str) -> Result<Vec<UserHolding>, BackendError> {
        self.calls.lock().holdings += 1;
        Ok(self
            .state
            .lock()
            .holdings
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    async fn confirm_card_payment(
        &self,
        session_id: &str,
        checkout_ref: &str,
    ) -> Result<CardConfirmation, BackendError> {
        self.calls.lock().confirm_card += 1;
        let state = self.state.lock();
        if !state.sessions.contains_key(session_id) {
            return Err(BackendError::UnknownSession(session_id.to_string()));
        }
        Ok(CardConfirmation {
            confirmation_id: format!("conf_{}", checkout_ref),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_by_default_with_flat_fee() {
        let mock = MockBackend::new();
        let outcome = mock
            .validate_investment(ValidateRequest {
                asset_id: "asset-1".into(),
                amount: 200_000,
                account: "0xabc".into(),
            })
            .await
            .expect("validate");

        match outcome {
            ValidateOutcome::Accepted { session } => {
                assert_eq!(session.estimated_fees, 5_000);
                assert_eq!(session.total_cost, 205_000);
            }
            ValidateOutcome::Rejected { .. } => panic!("default mock must accept"),
        }
    }

    #[tokio::test]
    async fn status_script_repeats_last_snapshot() {
        let mock = MockBackend::new();
        let session = match mock
            .validate_investment(ValidateRequest {
                asset_id: "asset-1".into(),
                amount: 100_000,
                account: "0xabc".into(),
            })
            .await
            .expect("validate")
        {
            ValidateOutcome::Accepted { session } => session,
            _ => unreachable!(),
        };

        mock.queue_status(StatusSnapshot {
            progress: 100,
            status: SessionStatus::Completed,
            tx_hash: Some("0xfeed".into()),
            message: None,
        });

        let first = mock.session_status(&session.id).await.expect("status");
        let second = mock.session_status(&session.id).await.expect("status");
        assert_eq!(first, second);
        assert_eq!(mock.calls().status, 2);
    }

    #[tokio::test]
    async fn unknown_session_is_an_error() {
        let mock = MockBackend::new();
        let err = mock.session_status("sess-404").await.expect_err("unknown");
        assert!(matches!(err, BackendError::UnknownSession(_)));
    }
}
