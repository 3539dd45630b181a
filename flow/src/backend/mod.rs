//! # Tokenization Backend Interface
//!
//! Type-safe definitions of the backend operations the purchase flow
//! consumes. The backend owns all business rules — investment bounds, fee
//! schedules, supply accounting, settlement. This module only shapes the
//! requests and responses; no validation logic lives client-side.
//!
//! ## Operation Index
//!
//! | Operation              | Description                                  |
//! |------------------------|----------------------------------------------|
//! | `list_assets`          | Fetch the investable catalog                 |
//! | `validate_investment`  | Submit a candidate (asset, amount, account)  |
//! | `initiate_payment`     | Obtain a payment descriptor for a session    |
//! | `execute_tokenization` | Report payment and start settlement          |
//! | `session_status`       | Poll progress for an in-flight session       |
//! | `user_holdings`        | Fetch settled positions for an account       |
//! | `confirm_card_payment` | Confirm a card checkout for a session        |
//!
//! Implementations: [`http::HttpBackend`] speaks to a live PARCEL gateway;
//! [`mock::MockBackend`] is a scripted in-memory double for tests and local
//! development.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::{Asset, UserHolding};
use crate::payment::PaymentMethod;
use crate::session::{FlowSession, StatusSnapshot};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by backend operations.
///
/// The split between [`Transport`](BackendError::Transport) and
/// [`Service`](BackendError::Service) matters: transport errors are
/// transient (network hiccup, gateway restart) and the poller retries them
/// with backoff; service errors are definitive answers from a reachable
/// backend and are never retried.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached or the connection failed mid-call.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a definitive failure.
    #[error("service error: {message}")]
    Service {
        /// Backend-supplied failure message.
        message: String,
    },

    /// The backend's response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The referenced session is unknown to the backend (expired or never
    /// created).
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

impl BackendError {
    /// Whether the error is transient and safe to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transport(_))
    }
}

// ---------------------------------------------------------------------------
// Request / Response Payloads
// ---------------------------------------------------------------------------

/// A candidate investment submitted for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// The asset to invest in.
    pub asset_id: String,
    /// Requested amount, in cents.
    pub amount: u64,
    /// The purchasing account (wallet address or platform account id).
    pub account: String,
}

/// The backend's answer to a validation request.
///
/// On acceptance the backend issues the [`FlowSession`] — fee estimate and
/// total cost included — in the same round trip. There is no separate
/// "create session" call to race against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidateOutcome {
    /// The candidate is valid; a session was created.
    Accepted {
        /// The newly issued session.
        session: FlowSession,
    },
    /// The candidate was declined.
    Rejected {
        /// Reason list, surfaced to the user verbatim.
        reasons: Vec<String>,
    },
}

/// Request for a payment descriptor for an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    /// The session to pay for.
    pub session_id: String,
    /// The rail the user picked.
    pub method: PaymentMethod,
}

/// Rail-specific instructions for completing payment.
///
/// Produced by `initiate_payment`; consumed by exactly one
/// [`PaymentRail`](crate::payment::PaymentRail) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rail", rename_all = "snake_case")]
pub enum PaymentDescriptor {
    /// Pay by submitting a transaction to the property-token contract.
    Chain {
        /// Contract address to send the transaction to.
        to: String,
        /// ABI-encoded calldata, hex.
        data: String,
        /// Value to attach, in cents-equivalent on-chain denomination.
        value: u64,
        /// Gas limit the backend estimated for the call.
        gas_limit: u64,
    },
    /// Pay through the card processor.
    Card {
        /// Opaque checkout reference for the card provider.
        checkout_ref: String,
        /// Amount to charge, in cents.
        amount: u64,
    },
}

/// Report of a completed payment, starting settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// The paid session.
    pub session_id: String,
    /// The rail the payment went through.
    pub method: PaymentMethod,
    /// Rail-specific payment proof: transaction hash for chain payments,
    /// confirmation id for card payments.
    pub payment_reference: String,
}

/// Backend acknowledgement of a confirmed card checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfirmation {
    /// Confirmation id to pass as the payment reference at execution.
    pub confirmation_id: String,
}

// ---------------------------------------------------------------------------
// The Backend Trait
// ---------------------------------------------------------------------------

/// The backend query/command interface consumed by the purchase flow.
///
/// Every method is a stateless request/response call: structured input in,
/// structured output or [`BackendError`] out. Implementations must be safe
/// to share across tasks (`Send + Sync`) — the flow holds one behind an
/// `Arc` and the poller calls it from its own loop.
#[async_trait]
pub trait TokenizationBackend: Send + Sync {
    /// Fetch the current investable catalog.
    async fn list_assets(&self) -> Result<Vec<Asset>, BackendError>;

    /// Submit a candidate investment for authoritative validation.
    async fn validate_investment(
        &self,
        request: ValidateRequest,
    ) -> Result<ValidateOutcome, BackendError>;

    /// Obtain rail-specific payment instructions for a session.
    async fn initiate_payment(
        &self,
        request: InitiateRequest,
    ) -> Result<PaymentDescriptor, BackendError>;

    /// Report a completed payment and start settlement.
    async fn execute_tokenization(&self, request: ExecuteRequest) -> Result<(), BackendError>;

    /// Poll progress for an in-flight session.
    async fn session_status(&self, session_id: &str) -> Result<StatusSnapshot, BackendError>;

    /// Fetch settled positions for an account.
    async fn user_holdings(&self, account: &str) -> Result<Vec<UserHolding>, BackendError>;

    /// Confirm a card checkout, yielding the payment reference.
    async fn confirm_card_payment(
        &self,
        session_id: &str,
        checkout_ref: &str,
    ) -> Result<CardConfirmation, BackendError>;
}
