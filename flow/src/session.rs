//! # Flow Sessions & Status Snapshots
//!
//! A [`FlowSession`] is a backend-issued handle for one attempted purchase.
//! It is created when validation accepts a candidate investment and carries
//! the backend's fee estimate, the derived total cost, and an expiry. The
//! client never fabricates a session id — if there is no session, there was
//! no accepted validation.
//!
//! A [`StatusSnapshot`] is a point-in-time progress report for an in-flight
//! session. Snapshots are idempotent overwrites: each poll replaces the
//! previous snapshot wholesale, and applying the same snapshot twice is
//! observably a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::AssetId;
use crate::payment::PaymentMethod;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One attempted purchase, as acknowledged by the backend.
///
/// Exists if and only if the flow has passed validation — the controller
/// enforces that a session is present exactly in the payment, processing,
/// and complete states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSession {
    /// Opaque session identifier issued by the backend.
    pub id: String,
    /// The asset being purchased.
    pub asset_id: AssetId,
    /// Requested investment amount, in cents.
    pub amount: u64,
    /// Backend's fee estimate for this purchase, in cents.
    pub estimated_fees: u64,
    /// Total cost (amount + fees), in cents. Computed by the backend;
    /// echoed here, never recomputed client-side.
    pub total_cost: u64,
    /// Payment rail chosen for this session, once the user picks one.
    pub payment_method: Option<PaymentMethod>,
    /// When the backend will garbage-collect this session if unpaid.
    pub expires_at: DateTime<Utc>,
}

impl FlowSession {
    /// Whether the session has passed its backend-defined TTL.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Coarse progress tag reported by the backend for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Payment received, settlement not yet started.
    Pending,
    /// Units are being minted on the property-token contract.
    Minting,
    /// Terminal: units minted and recorded.
    Completed,
    /// Terminal: settlement failed; see the snapshot message.
    Failed,
}

impl SessionStatus {
    /// Returns `true` for the two terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Minting => write!(f, "minting"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A point-in-time progress report for an in-flight session.
///
/// Ephemeral by design: each poll overwrites the previous snapshot and
/// nothing is persisted locally. Equality is derived so the controller can
/// cheaply detect and skip no-op updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Progress in percent, 0–100. Monotonicity is not guaranteed by the
    /// backend and not assumed by the client.
    pub progress: u8,
    /// Coarse status tag.
    pub status: SessionStatus,
    /// Transaction hash of the settlement, once known.
    pub tx_hash: Option<String>,
    /// Human-readable progress or failure message from the backend.
    pub message: Option<String>,
}

impl StatusSnapshot {
    /// Snapshot representing a session that has not been polled yet.
    pub fn initial() -> Self {
        Self {
            progress: 0,
            status: SessionStatus::Pending,
            tx_hash: None,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn terminal_statuses() {
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Minting.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn session_expiry() {
        let mut session = FlowSession {
            id: "sess-1".into(),
            asset_id: "asset-1".into(),
            amount: 200_000,
            estimated_fees: 5_000,
            total_cost: 205_000,
            payment_method: None,
            expires_at: Utc::now() + Duration::minutes(10),
        };
        assert!(!session.is_expired());
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Minting).expect("serialize");
        assert_eq!(json, "\"minting\"");
        let back: SessionStatus = serde_json::from_str("\"completed\"").expect("deserialize");
        assert_eq!(back, SessionStatus::Completed);
    }
}
