//! # Property Token Registry
//!
//! Manages the unit registries of tokenized properties. Each property is
//! registered once with its contract address, unit symbol, and total unit
//! supply; units are then minted to buyer accounts as purchases settle.
//!
//! ## Security Model
//!
//! - **Mint gating**: every `mint()` call requires the issuer's Ed25519
//!   signature over the payload `(contract_address || account || units)`.
//!   The registry verifies the signature against the issuer key recorded
//!   at registration before touching supply.
//! - **Supply tracking**: minted units can never exceed the registered
//!   total. Available units and per-account holdings are maintained
//!   atomically; overflow is checked on every operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The referenced property is not registered.
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// A property with this contract address is already registered.
    #[error("duplicate contract address: {0}")]
    DuplicateContract(String),

    /// The issuer key recorded at registration is not a valid Ed25519
    /// public key, or the provided signature is malformed.
    #[error("invalid signature material: {0}")]
    InvalidSignature(String),

    /// The signature does not verify against the issuer's key.
    #[error("unauthorized: issuer signature verification failed")]
    UnauthorizedMint,

    /// Minting `requested` units would exceed the remaining supply.
    #[error("supply exhausted: requested {requested}, available {available}")]
    SupplyExhausted {
        /// Units the caller tried to mint.
        requested: u64,
        /// Units still mintable.
        available: u64,
    },

    /// A balance update would overflow.
    #[error("holding overflow: minting {units} would exceed u64::MAX")]
    HoldingOverflow {
        /// The amount that was attempted.
        units: u64,
    },

    /// Zero-unit mints indicate a bug in the caller.
    #[error("zero-unit operations are not permitted")]
    ZeroUnits,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata and supply state for one registered property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Contract address of the property token, the registry key.
    pub contract_address: String,
    /// Ticker-style unit symbol (e.g. "MRNA-B"). Uppercased at
    /// registration.
    pub unit_symbol: String,
    /// Total units the property was tokenized into. Immutable.
    pub total_units: u64,
    /// Units minted so far.
    pub minted_units: u64,
    /// Hex-encoded Ed25519 public key of the issuing entity.
    pub issuer: String,
    /// When the property was registered.
    pub registered_at: DateTime<Utc>,
}

impl PropertyInfo {
    /// Units still mintable.
    pub fn available_units(&self) -> u64 {
        self.total_units.saturating_sub(self.minted_units)
    }
}

/// Builds the canonical mint payload the issuer signs:
/// `contract_address || account || units (big-endian)`.
///
/// Signer (gateway) and verifier (registry) must agree on this byte
/// layout, so it lives here and nowhere else.
pub fn mint_payload(contract_address: &str, account: &str, units: u64) -> Vec<u8> {
    let mut payload =
        Vec::with_capacity(contract_address.len() + account.len() + std::mem::size_of::<u64>());
    payload.extend_from_slice(contract_address.as_bytes());
    payload.extend_from_slice(account.as_bytes());
    payload.extend_from_slice(&units.to_be_bytes());
    payload
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The property-token registry — registration, minting, and holdings.
///
/// An in-process mirror of the on-chain contract state, used by the
/// gateway's settlement path and by tests. Not persistent; the chain is
/// the durable record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyRegistry {
    /// Registered properties keyed by contract address.
    properties: HashMap<String, PropertyInfo>,
    /// Per-property, per-account holdings:
    /// `contract_address -> (account -> units)`.
    holdings: HashMap<String, HashMap<String, u64>>,
}

impl PropertyRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tokenized property.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateContract`] if the contract
    /// address is already registered.
    pub fn register(
        &mut self,
        contract_address: String,
        unit_symbol: String,
        total_units: u64,
        issuer: String,
    ) -> Result<(), RegistryError> {
        if self.properties.contains_key(&contract_address) {
            return Err(RegistryError::DuplicateContract(contract_address));
        }

        let info = PropertyInfo {
            contract_address: contract_address.clone(),
            unit_symbol: unit_symbol.to_uppercase(),
            total_units,
            minted_units: 0,
            issuer,
            registered_at: Utc::now(),
        };
        self.properties.insert(contract_address.clone(), info);
        self.holdings.insert(contract_address, HashMap::new());
        Ok(())
    }

    /// Mints units to an account.
    ///
    /// Requires the issuer's Ed25519 signature (hex) over
    /// [`mint_payload`]. Supply and holdings are updated atomically: if
    /// any check fails, nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PropertyNotFound`] for unknown contracts,
    /// [`RegistryError::InvalidSignature`] for malformed key/signature
    /// material, [`RegistryError::UnauthorizedMint`] when verification
    /// fails, and [`RegistryError::SupplyExhausted`] when the property
    /// cannot cover the mint.
    pub fn mint(
        &mut self,
        contract_address: &str,
        account: &str,
        units: u64,
        issuer_signature: &str,
    ) -> Result<(), RegistryError> {
        if units == 0 {
            return Err(RegistryError::ZeroUnits);
        }

        let info = self
            .properties
            .get(contract_address)
            .ok_or_else(|| RegistryError::PropertyNotFound(contract_address.to_string()))?;

        Self::verify_issuer_signature(
            &info.issuer,
            issuer_signature,
            &mint_payload(contract_address, account, units),
        )?;

        let available = info.available_units();
        if units > available {
            return Err(RegistryError::SupplyExhausted {
                requested: units,
                available,
            });
        }

        let current_holding = self
            .holdings
            .get(contract_address)
            .and_then(|h| h.get(account))
            .copied()
            .unwrap_or(0);
        let new_holding = current_holding
            .checked_add(units)
            .ok_or(RegistryError::HoldingOverflow { units })?;

        // All checks passed; apply both updates.
        let info_mut = self.properties.get_mut(contract_address).expect("checked above");
        info_mut.minted_units += units;
        self.holdings
            .get_mut(contract_address)
            .expect("registered with property")
            .insert(account.to_string(), new_holding);

        Ok(())
    }

    /// Returns metadata for a property, or `None` if unregistered.
    pub fn property(&self, contract_address: &str) -> Option<&PropertyInfo> {
        self.properties.get(contract_address)
    }

    /// Units an account holds in a property. 0 for unknown pairs.
    pub fn holding(&self, contract_address: &str, account: &str) -> u64 {
        self.holdings
            .get(contract_address)
            .and_then(|h| h.get(account))
            .copied()
            .unwrap_or(0)
    }

    /// All non-zero positions of an account across properties, as
    /// `(contract_address, units)` pairs. Order is unspecified.
    pub fn positions(&self, account: &str) -> Vec<(String, u64)> {
        self.holdings
            .iter()
            .filter_map(|(contract, holders)| {
                holders
                    .get(account)
                    .filter(|units| **units > 0)
                    .map(|units| (contract.clone(), *units))
            })
            .collect()
    }

    fn verify_issuer_signature(
        issuer_hex: &str,
        signature_hex: &str,
        payload: &[u8],
    ) -> Result<(), RegistryError> {
        let key_bytes: [u8; 32] = hex::decode(issuer_hex)
            .map_err(|e| RegistryError::InvalidSignature(format!("issuer key: {e}")))?
            .try_into()
            .map_err(|_| RegistryError::InvalidSignature("issuer key: wrong length".into()))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| RegistryError::InvalidSignature(format!("issuer key: {e}")))?;

        let sig_bytes: [u8; 64] = hex::decode(signature_hex)
            .map_err(|e| RegistryError::InvalidSignature(format!("signature: {e}")))?
            .try_into()
            .map_err(|_| RegistryError::InvalidSignature("signature: wrong length".into()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(payload, &signature)
            .map_err(|_| RegistryError::UnauthorizedMint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    const CONTRACT: &str = "0x00000000000000000000000000000000000a55e7";

    fn issuer() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn registry_with(issuer: &SigningKey) -> PropertyRegistry {
        let mut registry = PropertyRegistry::new();
        registry
            .register(
                CONTRACT.into(),
                "mrna-b".into(),
                25_000,
                hex::encode(issuer.verifying_key().as_bytes()),
            )
            .expect("register");
        registry
    }

    fn signed_mint(issuer: &SigningKey, account: &str, units: u64) -> String {
        let signature = issuer.sign(&mint_payload(CONTRACT, account, units));
        hex::encode(signature.to_bytes())
    }

    #[test]
    fn register_uppercases_symbol_and_rejects_duplicates() {
        let key = issuer();
        let mut registry = registry_with(&key);
        assert_eq!(registry.property(CONTRACT).expect("info").unit_symbol, "MRNA-B");

        let err = registry
            .register(CONTRACT.into(), "x".into(), 1, "aa".into())
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::DuplicateContract(_)));
    }

    #[test]
    fn signed_mint_updates_supply_and_holding() {
        let key = issuer();
        let mut registry = registry_with(&key);

        registry
            .mint(CONTRACT, "0xbuyer", 20, &signed_mint(&key, "0xbuyer", 20))
            .expect("mint");

        let info = registry.property(CONTRACT).expect("info");
        assert_eq!(info.minted_units, 20);
        assert_eq!(info.available_units(), 24_980);
        assert_eq!(registry.holding(CONTRACT, "0xbuyer"), 20);
        assert_eq!(registry.positions("0xbuyer"), vec![(CONTRACT.to_string(), 20)]);
    }

    #[test]
    fn mint_with_wrong_key_is_unauthorized() {
        let key = issuer();
        let interloper = issuer();
        let mut registry = registry_with(&key);

        let forged = hex::encode(
            interloper
                .sign(&mint_payload(CONTRACT, "0xbuyer", 20))
                .to_bytes(),
        );
        let err = registry
            .mint(CONTRACT, "0xbuyer", 20, &forged)
            .expect_err("forged");
        assert!(matches!(err, RegistryError::UnauthorizedMint));
        assert_eq!(registry.holding(CONTRACT, "0xbuyer"), 0);
    }

    #[test]
    fn mint_signature_does_not_transfer_between_accounts() {
        let key = issuer();
        let mut registry = registry_with(&key);

        // Signature over buyer A's payload must not mint to buyer B.
        let sig_for_a = signed_mint(&key, "0xalice", 20);
        let err = registry
            .mint(CONTRACT, "0xbob", 20, &sig_for_a)
            .expect_err("replayed onto other account");
        assert!(matches!(err, RegistryError::UnauthorizedMint));
    }

    #[test]
    fn mint_cannot_exceed_total_supply() {
        let key = issuer();
        let mut registry = registry_with(&key);

        let err = registry
            .mint(CONTRACT, "0xwhale", 25_001, &signed_mint(&key, "0xwhale", 25_001))
            .expect_err("over supply");
        match err {
            RegistryError::SupplyExhausted { requested, available } => {
                assert_eq!(requested, 25_001);
                assert_eq!(available, 25_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing changed.
        assert_eq!(registry.property(CONTRACT).expect("info").minted_units, 0);
    }

    #[test]
    fn zero_unit_mint_is_rejected() {
        let key = issuer();
        let mut registry = registry_with(&key);
        let err = registry
            .mint(CONTRACT, "0xbuyer", 0, &signed_mint(&key, "0xbuyer", 0))
            .expect_err("zero units");
        assert!(matches!(err, RegistryError::ZeroUnits));
    }
}
