//! # Card Rail — Processor-Based Payment
//!
//! Pays for a session through the backend's card-processor integration:
//! the payment descriptor carries a checkout reference, the rail confirms
//! it with the backend, and the processor's confirmation id becomes the
//! payment reference reported at execution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::{PaymentDescriptor, TokenizationBackend};
use crate::error::FlowError;
use crate::payment::{PaymentMethod, PaymentRail, PaymentReceipt};
use crate::session::FlowSession;

/// Pays for a session by confirming a card checkout with the backend.
pub struct CardRail {
    backend: Arc<dyn TokenizationBackend>,
}

impl CardRail {
    /// Creates a card rail over the given backend.
    pub fn new(backend: Arc<dyn TokenizationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PaymentRail for CardRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    async fn submit(
        &self,
        session: &FlowSession,
        descriptor: &PaymentDescriptor,
    ) -> Result<PaymentReceipt, FlowError> {
        let checkout_ref = match descriptor {
            PaymentDescriptor::Card { checkout_ref, .. } => checkout_ref.clone(),
            other => {
                return Err(FlowError::PaymentInitiationFailed(format!(
                    "card rail received a non-card descriptor: {:?}",
                    other
                )));
            }
        };

        let confirmation = self
            .backend
            .confirm_card_payment(&session.id, &checkout_ref)
            .await?;

        tracing::info!(
            session_id = %session.id,
            confirmation_id = %confirmation.confirmation_id,
            "card payment confirmed"
        );

        Ok(PaymentReceipt {
            method: PaymentMethod::Card,
            reference: confirmation.confirmation_id,
            paid_at: Utc::now(),
        })
    }
}
