//! Auxiliary HTTP collaborators
//!
//! Pair listings and swap quotes come pre-computed from external services.
//! Only their decoded JSON shapes enter the core.

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::errors::ValidationError;
use crate::tokens::TokenInfo;

/// Timeout for pair-list requests
const API_TIMEOUT_SECS: u64 = 10;

fn default_decimals() -> u8 {
    18
}

// ============================================
// RESPONSE TYPES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairListing {
    pub address: Address,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    pub stable: bool,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    /// Gauge hint, used when no voter is configured
    #[serde(default)]
    pub gauge: Option<Address>,
}

/// One hop of a swap route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from: Address,
    pub to: Address,
    pub stable: bool,
}

/// Quote from the routing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub amount_in: U256,
    pub amount_out: U256,
    pub routes: Vec<RouteLeg>,
}

impl Quote {
    /// Route must be non-empty, contiguous, and go from `from` to `to`
    pub fn validate(&self, from: Address, to: Address) -> Result<(), ValidationError> {
        let (Some(first), Some(last)) = (self.routes.first(), self.routes.last()) else {
            return Err(ValidationError::Route("quote has no route".to_string()));
        };
        if first.from != from || last.to != to {
            return Err(ValidationError::Route("route does not match the selected tokens".to_string()));
        }
        if self.routes.windows(2).any(|w| w[0].to != w[1].from) {
            return Err(ValidationError::Route("route legs are not contiguous".to_string()));
        }
        if self.amount_in.is_zero() {
            return Err(ValidationError::ZeroAmount { field: "amount" });
        }
        if self.amount_out.is_zero() {
            return Err(ValidationError::Route("quote returns nothing".to_string()));
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .wrap_err_with(|| format!("reading quote {}", path.as_ref().display()))?;
        serde_json::from_str(&content).map_err(|e| eyre!("Invalid quote JSON: {}", e))
    }
}

// ============================================
// PAIR LIST CLIENT
// ============================================

pub struct PairListClient {
    http_client: Client,
}

impl PairListClient {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
        Ok(Self { http_client })
    }

    /// GET a JSON array of pairs
    pub async fn fetch(&self, url: &str) -> Result<Vec<PairListing>> {
        let start = Instant::now();
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| eyre!("Pair list request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(eyre!("Pair list returned HTTP {}", response.status()));
        }

        let pairs: Vec<PairListing> = response
            .json()
            .await
            .map_err(|e| eyre!("Invalid pair list JSON: {}", e))?;

        info!("📥 {} pair(s) from {} in {:?}", pairs.len(), url, start.elapsed());
        Ok(pairs)
    }

    /// Local file takes precedence over the URL; neither means no pairs
    pub async fn load(&self, url: Option<&str>, path: Option<&str>) -> Result<Vec<PairListing>> {
        match (path, url) {
            (Some(path), _) => load_pairs_file(path),
            (None, Some(url)) => self.fetch(url).await,
            (None, None) => {
                debug!("No pair list configured");
                Ok(Vec::new())
            }
        }
    }
}

pub fn load_pairs_file<P: AsRef<Path>>(path: P) -> Result<Vec<PairListing>> {
    let content = std::fs::read_to_string(path.as_ref())
        .wrap_err_with(|| format!("reading pair list {}", path.as_ref().display()))?;
    let pairs: Vec<PairListing> =
        serde_json::from_str(&content).map_err(|e| eyre!("Invalid pair list JSON: {}", e))?;
    info!("📂 {} pair(s) from {}", pairs.len(), path.as_ref().display());
    Ok(pairs)
}
