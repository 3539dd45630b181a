//! # Chain Rail — Wallet-Based Payment
//!
//! The chain submitter: turns a chain payment descriptor into a signed,
//! submitted, confirmed transaction via the injected wallet provider. The
//! wallet's own retry/nonce/gas behavior is inherited as-is — a rejected
//! signature or an RPC failure is surfaced as a terminal
//! [`FlowError::ChainSubmissionFailed`], never retried here.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::PaymentDescriptor;
use crate::error::FlowError;
use crate::payment::{PaymentMethod, PaymentRail, PaymentReceipt};
use crate::session::FlowSession;
use crate::wallet::{TransactionRequest, WalletProvider};

/// Pays for a session by submitting a transaction through a wallet.
pub struct ChainRail {
    wallet: Arc<dyn WalletProvider>,
}

impl ChainRail {
    /// Creates a chain rail over the given wallet provider.
    pub fn new(wallet: Arc<dyn WalletProvider>) -> Self {
        Self { wallet }
    }
}

#[async_trait]
impl PaymentRail for ChainRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wallet
    }

    async fn submit(
        &self,
        session: &FlowSession,
        descriptor: &PaymentDescriptor,
    ) -> Result<PaymentReceipt, FlowError> {
        let (to, data, value, gas_limit) = match descriptor {
            PaymentDescriptor::Chain {
                to,
                data,
                value,
                gas_limit,
            } => (to.clone(), data.clone(), *value, *gas_limit),
            other => {
                return Err(FlowError::PaymentInitiationFailed(format!(
                    "chain rail received a non-chain descriptor: {:?}",
                    other
                )));
            }
        };

        let pending = self
            .wallet
            .sign_and_send(TransactionRequest {
                to,
                data,
                value,
                gas_limit,
            })
            .await
            .map_err(|e| FlowError::ChainSubmissionFailed(e.to_string()))?;

        tracing::info!(
            session_id = %session.id,
            tx_hash = %pending.hash(),
            "transaction submitted, awaiting confirmation"
        );

        let confirmation = pending
            .wait_for_confirmation()
            .await
            .map_err(|e| FlowError::ChainSubmissionFailed(e.to_string()))?;

        Ok(PaymentReceipt {
            method: PaymentMethod::Wallet,
            reference: confirmation.tx_hash,
            paid_at: Utc::now(),
        })
    }
}
