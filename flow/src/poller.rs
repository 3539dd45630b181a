//! # Status Poller
//!
//! Fixed-interval polling of a session's status until it reaches a
//! terminal state. The loop is strictly sequential: a new poll is issued
//! only after the previous request has resolved, so overlapping polls
//! cannot happen no matter how slow the backend gets.
//!
//! ## Failure policy
//!
//! Transient transport errors are retried with exponential backoff (poll
//! interval doubling per consecutive failure, capped), up to a configured
//! consecutive-failure bound. A successful poll resets the counter. When
//! the bound is exhausted the poller stops with
//! [`FlowError::BackendUnreachable`] — a backend that is genuinely down
//! should surface as a terminal condition, not an infinite silent loop.
//!
//! Definitive backend answers ([`BackendError::Service`],
//! [`BackendError::UnknownSession`]) are never retried.
//!
//! ## Cancellation
//!
//! `poll_until_terminal` holds no timers or tasks beyond its own future.
//! Dropping the future (e.g. losing a `select!` against a reset) cancels
//! the poll cleanly; nothing leaks.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::sleep;

use crate::backend::TokenizationBackend;
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::session::StatusSnapshot;

/// Polls a session's status until terminal.
pub struct StatusPoller {
    backend: Arc<dyn TokenizationBackend>,
    config: FlowConfig,
}

impl StatusPoller {
    /// Creates a poller over the given backend.
    pub fn new(backend: Arc<dyn TokenizationBackend>, config: FlowConfig) -> Self {
        Self { backend, config }
    }

    /// Poll until the session reaches `completed` or `failed`.
    ///
    /// `observe` is invoked with every successfully fetched snapshot,
    /// including the terminal one, in order. Returns the terminal snapshot,
    /// or [`FlowError::BackendUnreachable`] once the consecutive transient
    /// failure bound is exhausted, or [`FlowError::Backend`] on a
    /// definitive backend error.
    pub async fn poll_until_terminal<F>(
        &self,
        session_id: &str,
        mut observe: F,
    ) -> Result<StatusSnapshot, FlowError>
    where
        F: FnMut(&StatusSnapshot) + Send,
    {
        let mut consecutive_failures: u32 = 0;
        let mut last_success = Instant::now();

        loop {
            let delay = if consecutive_failures == 0 {
                self.config.poll_interval
            } else {
                self.config.backoff_for(consecutive_failures)
            };
            sleep(delay).await;

            match self.backend.session_status(session_id).await {
                Ok(snapshot) => {
                    consecutive_failures = 0;
                    last_success = Instant::now();
                    observe(&snapshot);

                    if snapshot.status.is_terminal() {
                        tracing::debug!(
                            session_id,
                            status = %snapshot.status,
                            "session reached terminal status"
                        );
                        return Ok(snapshot);
                    }
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        session_id,
                        consecutive_failures,
                        error = %e,
                        "transient poll failure"
                    );
                    if consecutive_failures >= self.config.max_transient_poll_failures {
                        return Err(FlowError::BackendUnreachable {
                            attempts: consecutive_failures,
                            elapsed_ms: last_success.elapsed().as_millis() as u64,
                        });
                    }
                }
                Err(e) => return Err(FlowError::Backend(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::backend::{TokenizationBackend, ValidateOutcome, ValidateRequest};
    use crate::session::SessionStatus;
    use std::time::Duration;

    fn snapshot(progress: u8, status: SessionStatus) -> StatusSnapshot {
        StatusSnapshot {
            progress,
            status,
            tx_hash: None,
            message: None,
        }
    }

    async fn open_session(mock: &MockBackend) -> String {
        match mock
            .validate_investment(ValidateRequest {
                asset_id: "asset-1".into(),
                amount: 100_000,
                account: "0xabc".into(),
            })
            .await
            .expect("validate")
        {
            ValidateOutcome::Accepted { session } => session.id,
            _ => unreachable!(),
        }
    }

    fn fast_config() -> FlowConfig {
        FlowConfig::default()
            .with_poll_interval(Duration::from_millis(100))
            .with_max_transient_poll_failures(3)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_completed() {
        let mock = Arc::new(MockBackend::new());
        let session_id = open_session(&mock).await;
        mock.queue_status(snapshot(20, SessionStatus::Pending));
        mock.queue_status(snapshot(60, SessionStatus::Minting));
        mock.queue_status(snapshot(100, SessionStatus::Completed));

        let poller = StatusPoller::new(mock.clone(), fast_config());
        let mut seen = Vec::new();
        let terminal = poller
            .poll_until_terminal(&session_id, |s| seen.push(s.progress))
            .await
            .expect("terminal");

        assert_eq!(terminal.status, SessionStatus::Completed);
        assert_eq!(seen, vec![20, 60, 100]);
        assert_eq!(mock.calls().status, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_bounded() {
        let mock = Arc::new(MockBackend::new());
        let session_id = open_session(&mock).await;
        mock.queue_status_transport_error("connection refused");
        mock.queue_status_transport_error("connection refused");
        mock.queue_status_transport_error("connection refused");

        let poller = StatusPoller::new(mock.clone(), fast_config());
        let err = poller
            .poll_until_terminal(&session_id, |_| {})
            .await
            .expect_err("must give up");

        match err {
            FlowError::BackendUnreachable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.calls().status, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_counter() {
        let mock = Arc::new(MockBackend::new());
        let session_id = open_session(&mock).await;
        // Two failures, a success, two more failures, then completion:
        // never three consecutive, so the bound (3) must not trip.
        mock.queue_status_transport_error("hiccup");
        mock.queue_status_transport_error("hiccup");
        mock.queue_status(snapshot(40, SessionStatus::Minting));
        mock.queue_status_transport_error("hiccup");
        mock.queue_status_transport_error("hiccup");
        mock.queue_status(snapshot(100, SessionStatus::Completed));

        let poller = StatusPoller::new(mock.clone(), fast_config());
        let terminal = poller
            .poll_until_terminal(&session_id, |_| {})
            .await
            .expect("terminal");
        assert_eq!(terminal.status, SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn definitive_errors_are_not_retried() {
        let mock = Arc::new(MockBackend::new());
        let poller = StatusPoller::new(mock.clone(), fast_config());

        let err = poller
            .poll_until_terminal("sess-404", |_| {})
            .await
            .expect_err("unknown session");
        assert!(matches!(err, FlowError::Backend(_)));
        assert_eq!(mock.calls().status, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_is_terminal() {
        let mock = Arc::new(MockBackend::new());
        let session_id = open_session(&mock).await;
        mock.queue_status(StatusSnapshot {
            progress: 45,
            status: SessionStatus::Failed,
            tx_hash: None,
            message: Some("mint reverted".into()),
        });

        let poller = StatusPoller::new(mock.clone(), fast_config());
        let terminal = poller
            .poll_until_terminal(&session_id, |_| {})
            .await
            .expect("terminal");
        assert_eq!(terminal.status, SessionStatus::Failed);
        assert_eq!(terminal.message.as_deref(), Some("mint reverted"));
    }
}
