//! Error types for the purchase flow.
//!
//! Every flow operation that can fail returns a [`FlowError`]. This enum is
//! exhaustive over the failure modes of the flow: each variant maps to one
//! stage of the purchase and tells the caller which state the flow was left
//! in (validation rejections leave the flow in asset selection, processing
//! failures leave it in processing, and so on).

use thiserror::Error;

use crate::backend::BackendError;
use crate::wallet::WalletError;

/// Errors that can occur during a purchase flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The backend declined the candidate investment (amount out of bounds,
    /// asset sold out, account not eligible). The reasons are surfaced
    /// verbatim from the backend, joined for display. The flow stays in
    /// asset selection.
    #[error("validation rejected: {}", reasons.join("; "))]
    ValidationRejected {
        /// The backend's reason list, unmodified.
        reasons: Vec<String>,
    },

    /// Creating a payment descriptor for the session failed. The flow stays
    /// in the payment state so the user can re-trigger.
    #[error("payment initiation failed: {0}")]
    PaymentInitiationFailed(String),

    /// The wallet rejected the transaction or RPC submission failed.
    /// Terminal for this attempt; polling never starts.
    #[error("chain submission failed: {0}")]
    ChainSubmissionFailed(String),

    /// The backend reported terminal failure for the session. The message
    /// is backend-supplied. The flow stays in processing with the error
    /// recorded; only a reset leaves it.
    #[error("tokenization failed: {message}")]
    ProcessingFailed {
        /// Backend-supplied failure message.
        message: String,
    },

    /// Too many consecutive transient errors while polling — the backend is
    /// treated as unreachable and the flow stops retrying.
    #[error("backend unreachable: {attempts} consecutive poll failures over {elapsed_ms}ms")]
    BackendUnreachable {
        /// Consecutive failed poll attempts before giving up.
        attempts: u32,
        /// Milliseconds elapsed since the last successful poll.
        elapsed_ms: u64,
    },

    /// An operation was attempted in a state where it is not legal
    /// (e.g. `choose_payment` while still selecting an asset).
    #[error("invalid operation: cannot {operation} while in {current_state}")]
    InvalidState {
        /// The flow's current state.
        current_state: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// The flow session expired before the purchase completed.
    #[error("session expired: {session_id}")]
    SessionExpired {
        /// The expired session's identifier.
        session_id: String,
    },

    /// A backend call failed outside the specific stages above
    /// (catalog load, holdings refresh).
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// A wallet operation failed outside chain submission proper
    /// (e.g. no active account).
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
}

impl FlowError {
    /// Convenience constructor for [`FlowError::InvalidState`].
    pub(crate) fn invalid_state(current: impl Into<String>, operation: impl Into<String>) -> Self {
        FlowError::InvalidState {
            current_state: current.into(),
            operation: operation.into(),
        }
    }
}
