//! # Asset Catalog
//!
//! Types for investable properties and the read-only catalog accessor.
//!
//! An [`Asset`] is immutable for the duration of a flow: the catalog is the
//! backend's snapshot of a listing, and every number in it (price, supply,
//! bounds) is advisory on the client. The authoritative check happens
//! server-side at validation — by the time a purchase settles, the backend
//! has re-verified everything against live supply.
//!
//! ## Money
//!
//! All monetary amounts are `u64` minor units (cents). No floats touch
//! balances anywhere in this crate.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, TokenizationBackend};
use crate::config::FlowConfig;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Unique identifier for a listed asset, assigned by the backend.
pub type AssetId = String;

/// A tokenized property available for fractional investment.
///
/// Fetched from the backend catalog and held immutable for the duration of
/// a flow. The backend remains the source of truth; a stale `Asset` can at
/// worst produce a validation rejection, never a wrong settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Backend-assigned asset identifier.
    pub id: AssetId,
    /// Display title of the property (e.g. "Marina Heights, Tower B").
    pub title: String,
    /// Human-readable location string.
    pub location: String,
    /// Total valuation of the property, in cents.
    pub total_price: u64,
    /// Price of a single unit, in cents.
    pub price_per_unit: u64,
    /// Total number of units the property was tokenized into.
    pub total_units: u64,
    /// Units still available for purchase.
    pub available_units: u64,
    /// Minimum investable amount per purchase, in cents.
    pub minimum_investment: u64,
    /// Maximum investable amount per purchase, in cents.
    pub maximum_investment: u64,
    /// Address of the property-token contract that records ownership.
    pub contract_address: String,
    /// Ticker-style symbol for the property's units (e.g. "MRNA-B").
    pub unit_symbol: String,
}

impl Asset {
    /// Number of whole units a given amount buys at the listed unit price.
    ///
    /// Returns 0 if the unit price is 0, which only happens on malformed
    /// catalog data — the backend rejects such listings at validation.
    pub fn units_for_amount(&self, amount: u64) -> u64 {
        if self.price_per_unit == 0 {
            return 0;
        }
        amount / self.price_per_unit
    }

    /// Whether `amount` sits inside the advisory min/max investment bounds.
    ///
    /// UI-level hinting only. The backend's validation is authoritative and
    /// may reject amounts this method accepts (e.g. sold-out supply).
    pub fn amount_within_bounds(&self, amount: u64) -> bool {
        amount >= self.minimum_investment && amount <= self.maximum_investment
    }
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// A settled record of units owned in one asset.
///
/// Read-only from the flow's perspective — refreshed from the backend after
/// a successful completion, never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHolding {
    /// The asset these units belong to.
    pub asset_id: AssetId,
    /// Unit symbol, denormalized for display.
    pub unit_symbol: String,
    /// Number of units owned.
    pub units: u64,
    /// Value of the position at the last backend valuation, in cents.
    pub value: u64,
    /// When the backend last revalued this position.
    pub valued_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Catalog Accessor
// ---------------------------------------------------------------------------

/// Read-only accessor over the backend's asset catalog with a TTL'd cache.
///
/// A pure read component: no state beyond the cache, no mutation of flow
/// state. The cache exists so a flow that re-renders the catalog ten times
/// does not issue ten backend calls; `refresh` bypasses it.
pub struct AssetCatalog {
    backend: Arc<dyn TokenizationBackend>,
    cache: RwLock<Option<CatalogCache>>,
    ttl: std::time::Duration,
}

struct CatalogCache {
    fetched_at: Instant,
    assets: Vec<Asset>,
}

impl AssetCatalog {
    /// Creates a catalog accessor over the given backend.
    pub fn new(backend: Arc<dyn TokenizationBackend>, config: &FlowConfig) -> Self {
        Self {
            backend,
            cache: RwLock::new(None),
            ttl: config.catalog_cache_ttl,
        }
    }

    /// Returns the catalog, from cache when fresh.
    pub async fn load(&self) -> Result<Vec<Asset>, BackendError> {
        if let Some(cached) = self.cache.read().as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.assets.clone());
            }
        }
        self.refresh().await
    }

    /// Fetches the catalog from the backend, bypassing and repopulating
    /// the cache.
    pub async fn refresh(&self) -> Result<Vec<Asset>, BackendError> {
        let assets = self.backend.list_assets().await?;
        tracing::debug!(count = assets.len(), "asset catalog refreshed");
        *self.cache.write() = Some(CatalogCache {
            fetched_at: Instant::now(),
            assets: assets.clone(),
        });
        Ok(assets)
    }

    /// Looks up a single asset by id, loading the catalog if needed.
    pub async fn get(&self, asset_id: &str) -> Result<Option<Asset>, BackendError> {
        let assets = self.load().await?;
        Ok(assets.into_iter().find(|a| a.id == asset_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    fn sample_asset() -> Asset {
        Asset {
            id: "asset-1".into(),
            title: "Marina Heights, Tower B".into(),
            location: "Dubai Marina".into(),
            total_price: 250_000_000,
            price_per_unit: 10_000,
            total_units: 25_000,
            available_units: 18_000,
            minimum_investment: 100_000,
            maximum_investment: 5_000_000,
            contract_address: "0x00000000000000000000000000000000000a55e7".into(),
            unit_symbol: "MRNA-B".into(),
        }
    }

    #[test]
    fn units_for_amount_truncates() {
        let asset = sample_asset();
        assert_eq!(asset.units_for_amount(200_000), 20);
        assert_eq!(asset.units_for_amount(205_000), 20);
        assert_eq!(asset.units_for_amount(9_999), 0);
    }

    #[test]
    fn bounds_are_inclusive() {
        let asset = sample_asset();
        assert!(asset.amount_within_bounds(100_000));
        assert!(asset.amount_within_bounds(5_000_000));
        assert!(!asset.amount_within_bounds(99_999));
        assert!(!asset.amount_within_bounds(5_000_001));
    }

    #[tokio::test]
    async fn load_caches_until_ttl() {
        let backend = Arc::new(MockBackend::with_assets(vec![sample_asset()]));
        let catalog = AssetCatalog::new(backend.clone(), &FlowConfig::default());

        let first = catalog.load().await.expect("load");
        let second = catalog.load().await.expect("load");
        assert_eq!(first, second);
        // Second load must have been served from cache.
        assert_eq!(backend.calls().list_assets, 1);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let backend = Arc::new(MockBackend::with_assets(vec![sample_asset()]));
        let catalog = AssetCatalog::new(backend.clone(), &FlowConfig::default());

        catalog.load().await.expect("load");
        catalog.refresh().await.expect("refresh");
        assert_eq!(backend.calls().list_assets, 2);
    }
}
