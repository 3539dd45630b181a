//! # Wallet Provider Interface
//!
//! The wallet is an externally injected capability, treated as a black-box
//! collaborator: it can report its active account and it can sign-and-send
//! a transaction. Nonce management, gas estimation, and retry behavior are
//! the wallet's business — this crate neither duplicates nor second-guesses
//! them. A user mashing "reject" in their wallet surfaces here as
//! [`WalletError::Rejected`], nothing more.
//!
//! [`DevWallet`] is the in-process implementation used by tests and the
//! CLI's local mode: it holds a real Ed25519 keypair, signs the payload,
//! derives the transaction hash from the signed bytes, and confirms
//! immediately. Good enough to exercise every code path that touches a
//! wallet; obviously not a custody solution.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a wallet provider.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The user declined to sign the transaction.
    #[error("signature rejected by user")]
    Rejected,

    /// The wallet holds no account (locked, or never connected).
    #[error("no active account")]
    NoActiveAccount,

    /// The account cannot cover gas for the transaction.
    #[error("insufficient funds for gas: need {required}, have {available}")]
    InsufficientGasFunds {
        /// Gas cost the RPC node quoted.
        required: u64,
        /// Balance available for gas.
        available: u64,
    },

    /// The RPC endpoint rejected the submission or the confirmation wait
    /// failed.
    #[error("rpc error: {0}")]
    Rpc(String),
}

// ---------------------------------------------------------------------------
// Transaction Types
// ---------------------------------------------------------------------------

/// A transaction the flow asks the wallet to sign and send.
///
/// Mirrors the fields a backend payment descriptor provides for the chain
/// rail. Everything beyond these four fields (nonce, gas price, chain id)
/// is filled in by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Destination contract address.
    pub to: String,
    /// ABI-encoded calldata, hex.
    pub data: String,
    /// Value to attach.
    pub value: u64,
    /// Gas limit for the call.
    pub gas_limit: u64,
}

/// Final confirmation of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfirmation {
    /// Hex-encoded transaction hash, `0x`-prefixed.
    pub tx_hash: String,
}

// ---------------------------------------------------------------------------
// Provider Traits
// ---------------------------------------------------------------------------

/// A submitted-but-not-necessarily-final transaction handle.
#[async_trait]
pub trait PendingTransaction: Send + Sync {
    /// The transaction hash as known at submission time.
    fn hash(&self) -> &str;

    /// Wait until the transaction is confirmed, yielding the final hash.
    async fn wait_for_confirmation(&self) -> Result<TxConfirmation, WalletError>;
}

/// The injected wallet capability.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// The currently active account address.
    async fn active_account(&self) -> Result<String, WalletError>;

    /// Sign the transaction and submit it, returning a pending handle.
    async fn sign_and_send(
        &self,
        request: TransactionRequest,
    ) -> Result<Box<dyn PendingTransaction>, WalletError>;
}

// ---------------------------------------------------------------------------
// Dev Wallet
// ---------------------------------------------------------------------------

/// In-process Ed25519 wallet for tests and local development.
pub struct DevWallet {
    signing_key: SigningKey,
    address: String,
}

impl DevWallet {
    /// Generates a wallet with a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = Self::derive_address(&signing_key);
        Self {
            signing_key,
            address,
        }
    }

    /// Restores a wallet from a 32-byte seed. Deterministic, for tests.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let address = Self::derive_address(&signing_key);
        Self {
            signing_key,
            address,
        }
    }

    /// The wallet's account address: `0x` + first 20 bytes of the SHA-256
    /// of the public key, hex-encoded.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn derive_address(key: &SigningKey) -> String {
        let digest = Sha256::digest(key.verifying_key().as_bytes());
        format!("0x{}", hex::encode(&digest[..20]))
    }
}

#[async_trait]
impl WalletProvider for DevWallet {
    async fn active_account(&self) -> Result<String, WalletError> {
        Ok(self.address.clone())
    }

    async fn sign_and_send(
        &self,
        request: TransactionRequest,
    ) -> Result<Box<dyn PendingTransaction>, WalletError> {
        // Sign over (to || data || value || gas_limit); the hash of the
        // signature doubles as the tx hash, which makes submissions
        // deterministic for a fixed seed and request.
        let mut payload = Vec::new();
        payload.extend_from_slice(request.to.as_bytes());
        payload.extend_from_slice(request.data.as_bytes());
        payload.extend_from_slice(&request.value.to_be_bytes());
        payload.extend_from_slice(&request.gas_limit.to_be_bytes());

        let signature = self.signing_key.sign(&payload);
        let tx_hash = format!("0x{}", hex::encode(Sha256::digest(signature.to_bytes())));

        tracing::debug!(to = %request.to, tx_hash = %tx_hash, "dev wallet submitted transaction");
        Ok(Box::new(DevPendingTransaction { tx_hash }))
    }
}

/// Pending handle produced by [`DevWallet`]; confirms immediately.
struct DevPendingTransaction {
    tx_hash: String,
}

#[async_trait]
impl PendingTransaction for DevPendingTransaction {
    fn hash(&self) -> &str {
        &self.tx_hash
    }

    async fn wait_for_confirmation(&self) -> Result<TxConfirmation, WalletError> {
        Ok(TxConfirmation {
            tx_hash: self.tx_hash.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransactionRequest {
        TransactionRequest {
            to: "0x00000000000000000000000000000000000a55e7".into(),
            data: "0xdeadbeef".into(),
            value: 205_000,
            gas_limit: 120_000,
        }
    }

    #[tokio::test]
    async fn dev_wallet_reports_its_address() {
        let wallet = DevWallet::from_seed(&[7u8; 32]);
        let account = wallet.active_account().await.expect("account");
        assert_eq!(account, wallet.address());
        assert!(account.starts_with("0x"));
        assert_eq!(account.len(), 42);
    }

    #[tokio::test]
    async fn dev_wallet_is_deterministic_per_seed() {
        let a = DevWallet::from_seed(&[1u8; 32]);
        let b = DevWallet::from_seed(&[1u8; 32]);
        let c = DevWallet::from_seed(&[2u8; 32]);
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());

        let pending_a = a.sign_and_send(request()).await.expect("send");
        let pending_b = b.sign_and_send(request()).await.expect("send");
        assert_eq!(pending_a.hash(), pending_b.hash());
    }

    #[tokio::test]
    async fn confirmation_echoes_submission_hash() {
        let wallet = DevWallet::generate();
        let pending = wallet.sign_and_send(request()).await.expect("send");
        let confirmation = pending.wait_for_confirmation().await.expect("confirm");
        assert_eq!(confirmation.tx_hash, pending.hash());
    }
}
