//! # Purchase Escrow
//!
//! Custody of buyer funds between payment and mint. The lifecycle is:
//!
//! 1. **Create** — opened when a paid session enters settlement, bound to
//!    the session, the buyer, and the issuer.
//! 2. **Fund** — credited with the session's total cost (amount + fees)
//!    in one deposit.
//! 3. **Release** — on successful mint, the escrowed funds go to the
//!    issuer.
//! 4. **Refund** — on settlement failure or session expiry, the escrowed
//!    funds go back to the buyer.
//!
//! Release and refund are mutually exclusive and final. There is no
//! partial release: a tokenization purchase settles whole or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// The escrow is not in a state that allows this operation.
    #[error("cannot {operation}: escrow is {current}, expected {expected}")]
    InvalidState {
        /// The operation that was attempted.
        operation: String,
        /// The escrow's current status.
        current: String,
        /// The status required for this operation.
        expected: String,
    },

    /// The deposit does not match the escrow's expected total cost.
    #[error("deposit mismatch: expected {expected}, got {got}")]
    DepositMismatch {
        /// The total cost the escrow was opened for.
        expected: u64,
        /// The amount that was deposited.
        got: u64,
    },

    /// Zero-amount escrows indicate a bug in the caller.
    #[error("zero-amount escrows are not permitted")]
    ZeroAmount,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The current status of a purchase escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Created but not yet funded.
    Pending,
    /// Funds are held; awaiting mint outcome.
    Funded,
    /// Terminal: funds went to the issuer after a successful mint.
    Released,
    /// Terminal: funds went back to the buyer.
    Refunded,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowStatus::Pending => write!(f, "Pending"),
            EscrowStatus::Funded => write!(f, "Funded"),
            EscrowStatus::Released => write!(f, "Released"),
            EscrowStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

/// One purchase's funds custody.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseEscrow {
    /// Unique escrow identifier.
    pub id: String,
    /// The flow session this escrow settles.
    pub session_id: String,
    /// The buying account.
    pub buyer: String,
    /// The issuing entity that receives funds on release.
    pub issuer: String,
    /// Total cost held in escrow, in cents.
    pub total_cost: u64,
    /// Current status.
    pub status: EscrowStatus,
    /// When the escrow was opened.
    pub created_at: DateTime<Utc>,
    /// When the escrow reached a terminal status, if it has.
    pub closed_at: Option<DateTime<Utc>>,
}

impl PurchaseEscrow {
    /// Opens a pending escrow for a session.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::ZeroAmount`] if `total_cost` is 0.
    pub fn create(
        session_id: String,
        buyer: String,
        issuer: String,
        total_cost: u64,
    ) -> Result<Self, EscrowError> {
        if total_cost == 0 {
            return Err(EscrowError::ZeroAmount);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            buyer,
            issuer,
            total_cost,
            status: EscrowStatus::Pending,
            created_at: Utc::now(),
            closed_at: None,
        })
    }

    /// Deposits the session's total cost.
    ///
    /// The deposit must match exactly — the payment rail charged the
    /// backend-quoted total, so anything else is a bookkeeping bug
    /// upstream, not something to absorb silently.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidState`] unless the escrow is
    /// `Pending`, and [`EscrowError::DepositMismatch`] on a wrong amount.
    pub fn fund(&mut self, amount: u64) -> Result<(), EscrowError> {
        self.require(EscrowStatus::Pending, "fund")?;
        if amount != self.total_cost {
            return Err(EscrowError::DepositMismatch {
                expected: self.total_cost,
                got: amount,
            });
        }
        self.status = EscrowStatus::Funded;
        Ok(())
    }

    /// Releases the escrowed funds to the issuer after a successful mint.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidState`] unless the escrow is `Funded`.
    pub fn release(&mut self) -> Result<(), EscrowError> {
        self.require(EscrowStatus::Funded, "release")?;
        self.status = EscrowStatus::Released;
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// Refunds the escrowed funds to the buyer after a failed settlement.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidState`] unless the escrow is `Funded`.
    pub fn refund(&mut self) -> Result<(), EscrowError> {
        self.require(EscrowStatus::Funded, "refund")?;
        self.status = EscrowStatus::Refunded;
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// Returns `true` once the escrow is released or refunded.
    pub fn is_closed(&self) -> bool {
        matches!(self.status, EscrowStatus::Released | EscrowStatus::Refunded)
    }

    fn require(&self, expected: EscrowStatus, operation: &str) -> Result<(), EscrowError> {
        if self.status != expected {
            return Err(EscrowError::InvalidState {
                operation: operation.to_string(),
                current: self.status.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escrow() -> PurchaseEscrow {
        PurchaseEscrow::create("sess-1".into(), "0xbuyer".into(), "issuer".into(), 205_000)
            .expect("create")
    }

    #[test]
    fn happy_path_fund_then_release() {
        let mut e = escrow();
        assert_eq!(e.status, EscrowStatus::Pending);
        e.fund(205_000).expect("fund");
        assert_eq!(e.status, EscrowStatus::Funded);
        e.release().expect("release");
        assert_eq!(e.status, EscrowStatus::Released);
        assert!(e.is_closed());
        assert!(e.closed_at.is_some());
    }

    #[test]
    fn failed_settlement_refunds() {
        let mut e = escrow();
        e.fund(205_000).expect("fund");
        e.refund().expect("refund");
        assert_eq!(e.status, EscrowStatus::Refunded);
    }

    #[test]
    fn deposit_must_match_total_cost_exactly() {
        let mut e = escrow();
        let err = e.fund(200_000).expect_err("short deposit");
        match err {
            EscrowError::DepositMismatch { expected, got } => {
                assert_eq!(expected, 205_000);
                assert_eq!(got, 200_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(e.status, EscrowStatus::Pending);
    }

    #[test]
    fn release_and_refund_are_mutually_exclusive() {
        let mut e = escrow();
        e.fund(205_000).expect("fund");
        e.release().expect("release");

        let err = e.refund().expect_err("already released");
        assert!(matches!(err, EscrowError::InvalidState { .. }));
        assert_eq!(e.status, EscrowStatus::Released);
    }

    #[test]
    fn cannot_release_unfunded_escrow() {
        let mut e = escrow();
        let err = e.release().expect_err("not funded");
        match err {
            EscrowError::InvalidState {
                operation,
                current,
                expected,
            } => {
                assert_eq!(operation, "release");
                assert_eq!(current, "Pending");
                assert_eq!(expected, "Funded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_cost_escrow_is_rejected() {
        let err = PurchaseEscrow::create("s".into(), "b".into(), "i".into(), 0)
            .expect_err("zero amount");
        assert!(matches!(err, EscrowError::ZeroAmount));
    }
}
