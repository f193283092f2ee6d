//! Decoded, strongly-typed chain state

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::tokens::TokenInfo;

/// A token balance of the connected account. `None` means the read failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAsset {
    pub token: TokenInfo,
    pub balance: Option<U256>,
}

impl BaseAsset {
    pub fn balance_or_zero(&self) -> U256 {
        self.balance.unwrap_or(U256::ZERO)
    }
}

/// A liquidity pair the account may hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub stable: bool,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
    pub reserve0: U256,
    pub reserve1: U256,
    pub total_supply: U256,
    /// Unstaked LP balance
    pub balance: U256,
    pub gauge: Option<Gauge>,
}

impl Position {
    /// The pair's own LP token
    pub fn lp_token(&self) -> TokenInfo {
        TokenInfo::new(self.address, self.symbol.clone(), self.decimals)
    }

    pub fn staked(&self) -> U256 {
        self.gauge.as_ref().map(|g| g.balance).unwrap_or(U256::ZERO)
    }

    /// Underlying token amounts for `liquidity` LP tokens at current reserves
    pub fn underlying(&self, liquidity: U256) -> (U256, U256) {
        if self.total_supply.is_zero() {
            return (U256::ZERO, U256::ZERO);
        }
        (
            liquidity * self.reserve0 / self.total_supply,
            liquidity * self.reserve1 / self.total_supply,
        )
    }
}

/// Emissions contract attached to a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gauge {
    pub address: Address,
    /// Fee/bribe contract voters on this gauge are paid from
    pub bribe: Option<Address>,
    /// Staked LP balance of the account
    pub balance: U256,
    pub total_supply: U256,
    /// Votes the pair currently carries
    pub weight: U256,
    pub bribes: Vec<Bribe>,
    /// Emissions earned by the account
    pub reward_earned: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bribe {
    pub token: TokenInfo,
    pub reward_rate: U256,
}

/// Vote-escrow position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeNft {
    pub id: U256,
    pub locked: U256,
    /// Unix timestamp the lock expires at
    pub lock_end: u64,
    pub voting_power: U256,
    /// Has votes cast (or is attached) and must be reset before withdraw/merge
    pub voted: bool,
}

impl VeNft {
    pub fn is_expired(&self, now: u64) -> bool {
        self.lock_end <= now
    }
}
