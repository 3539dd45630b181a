//! # Payment Rails
//!
//! One trait, one implementation per rail. The flow controller hands a
//! [`PaymentDescriptor`] to a [`PaymentRail`] and gets back a
//! [`PaymentReceipt`] — it never inspects which rail it is talking to.
//! Adding a new rail (bank transfer, stablecoin, whatever finance dreams
//! up next quarter) means writing one new impl, not editing the controller.
//!
//! - [`chain::ChainRail`] pays by signing and submitting a transaction
//!   through an injected wallet provider.
//! - [`card::CardRail`] pays through the backend's card-processor
//!   integration.

pub mod card;
pub mod chain;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::PaymentDescriptor;
use crate::error::FlowError;
use crate::session::FlowSession;

pub use card::CardRail;
pub use chain::ChainRail;

// ---------------------------------------------------------------------------
// Method Tag
// ---------------------------------------------------------------------------

/// The payment rail chosen for a session.
///
/// A wire-level tag only. Dispatch happens through [`PaymentRail`] trait
/// objects; nothing in the flow branches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// On-chain wallet transaction.
    Wallet,
    /// Card payment through the external processor.
    Card,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Wallet => write!(f, "wallet"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// Proof that a payment went through on some rail.
///
/// The `reference` is rail-specific — a transaction hash for chain
/// payments, a processor confirmation id for card payments — and is what
/// the backend receives at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// The rail the payment went through.
    pub method: PaymentMethod,
    /// Rail-specific payment reference.
    pub reference: String,
    /// When the rail confirmed the payment.
    pub paid_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// The Rail Trait
// ---------------------------------------------------------------------------

/// A payment rail: takes a session and its payment descriptor, returns a
/// receipt or a failure.
///
/// Implementations own the entire mechanics of their rail — signing,
/// confirmation waits, third-party round trips. The controller's only
/// obligations are to call `submit` exactly once per attempt and to pass a
/// descriptor produced for this rail's [`method`](PaymentRail::method).
#[async_trait]
pub trait PaymentRail: Send + Sync {
    /// The method tag this rail serves.
    fn method(&self) -> PaymentMethod;

    /// Execute payment for the session.
    async fn submit(
        &self,
        session: &FlowSession,
        descriptor: &PaymentDescriptor,
    ) -> Result<PaymentReceipt, FlowError>;
}
