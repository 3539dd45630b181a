//! # HTTP Backend Client
//!
//! [`HttpBackend`] speaks the PARCEL gateway's REST surface over reqwest.
//! Wire format is plain JSON bodies of the types in
//! [`backend`](crate::backend); error bodies are `{"error": "..."}`.
//!
//! Error mapping is the contract the poller relies on: connection-level
//! failures become [`BackendError::Transport`] (transient, retried with
//! backoff), HTTP 404 on a session endpoint becomes
//! [`BackendError::UnknownSession`], and any other non-success status
//! becomes [`BackendError::Service`] (definitive, never retried).

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, UserHolding};
use crate::backend::{
    BackendError, CardConfirmation, ExecuteRequest, InitiateRequest, PaymentDescriptor,
    TokenizationBackend, ValidateOutcome, ValidateRequest,
};
use crate::session::StatusSnapshot;

use async_trait::async_trait;

/// Error body shape returned by the gateway on failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Body for the card-confirmation endpoint.
#[derive(Debug, Serialize)]
struct ConfirmCardBody<'a> {
    checkout_ref: &'a str,
}

/// A [`TokenizationBackend`] over the gateway's REST API.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Creates a client for the gateway at `base_url`
    /// (e.g. `http://127.0.0.1:8742`). A trailing slash is tolerated.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        session_scoped: bool,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response, session_scoped).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        session_scoped: bool,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response, session_scoped).await
    }

    /// `session_scoped` marks requests addressed to a specific session,
    /// where a 404 means the session is unknown or expired. Elsewhere a
    /// 404 is just another definitive service failure.
    async fn decode<T: DeserializeOwned>(
        response: Response,
        session_scoped: bool,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()));
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("http status {}", status),
        };

        if session_scoped && status == StatusCode::NOT_FOUND {
            Err(BackendError::UnknownSession(message))
        } else {
            Err(BackendError::Service { message })
        }
    }
}

#[async_trait]
impl TokenizationBackend for HttpBackend {
    async fn list_assets(&self) -> Result<Vec<Asset>, BackendError> {
        self.get_json("/v1/assets", false).await
    }

    async fn validate_investment(
        &self,
        request: ValidateRequest,
    ) -> Result<ValidateOutcome, BackendError> {
        self.post_json("/v1/validate", &request, false).await
    }

    async fn initiate_payment(
        &self,
        request: InitiateRequest,
    ) -> Result<PaymentDescriptor, BackendError> {
        // The request is addressed to the session named in the body; the
        // gateway 404s it when that session is unknown or expired.
        self.post_json("/v1/sessions", &request, true).await
    }

    async fn execute_tokenization(&self, request: ExecuteRequest) -> Result<(), BackendError> {
        let path = format!("/v1/sessions/{}/execute", request.session_id);
        // The gateway returns an empty JSON object on success.
        let _: serde_json::Value = self.post_json(&path, &request, true).await?;
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> Result<StatusSnapshot, BackendError> {
        self.get_json(&format!("/v1/sessions/{}/status", session_id), true)
            .await
    }

    async fn user_holdings(&self, account: &str) -> Result<Vec<UserHolding>, BackendError> {
        self.get_json(&format!("/v1/holdings/{}", account), false)
            .await
    }

    async fn confirm_card_payment(
        &self,
        session_id: &str,
        checkout_ref: &str,
    ) -> Result<CardConfirmation, BackendError> {
        let path = format!("/v1/sessions/{}/confirm-card", session_id);
        self.post_json(&path, &ConfirmCardBody { checkout_ref }, true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let backend = HttpBackend::new("http://127.0.0.1:8742/");
        assert_eq!(backend.url("/v1/assets"), "http://127.0.0.1:8742/v1/assets");
    }

    fn not_found(body: &'static str) -> Response {
        http::Response::builder()
            .status(404)
            .body(body)
            .expect("response")
            .into()
    }

    #[tokio::test]
    async fn not_found_is_unknown_session_only_on_session_endpoints() {
        let body = r#"{"error":"session not found"}"#;

        let err = HttpBackend::decode::<StatusSnapshot>(not_found(body), true)
            .await
            .expect_err("session endpoint 404");
        assert!(matches!(err, BackendError::UnknownSession(_)));

        // A 404 off the session routes (wrong path, missing asset) is a
        // plain definitive failure.
        let err = HttpBackend::decode::<Vec<Asset>>(not_found(body), false)
            .await
            .expect_err("non-session 404");
        assert!(matches!(err, BackendError::Service { .. }));
    }
}
