//! Token metadata and human-decimal amount handling
//!
//! Amounts travel through the core as raw `U256` base units. Conversion to and
//! from the human-decimal strings users type happens only here.

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{ConfigError, ValidationError};

/// A fungible token known to the front end
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Placeholder metadata for a token whose `symbol()`/`decimals()` could not be read
    pub fn unknown(address: Address) -> Self {
        let hex = format!("{:?}", address);
        Self {
            address,
            symbol: format!("{}...", &hex[..8]),
            decimals: 18,
        }
    }

    pub fn format(&self, amount: U256) -> String {
        format_amount(amount, self.decimals)
    }

    pub fn parse(&self, field: &'static str, input: &str) -> Result<U256, ValidationError> {
        parse_amount(field, input, self.decimals)
    }
}

impl FromStr for TokenInfo {
    type Err = ConfigError;

    /// `address:symbol:decimals`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(ConfigError::InvalidToken(s.to_string()));
        }
        let address = Address::from_str(parts[0])
            .map_err(|_| ConfigError::InvalidToken(s.to_string()))?;
        let decimals = parts[2]
            .parse::<u8>()
            .map_err(|_| ConfigError::InvalidToken(s.to_string()))?;
        Ok(Self::new(address, parts[1], decimals))
    }
}

/// Parse a comma-separated `address:symbol:decimals` list
pub fn parse_token_list(s: &str) -> Result<Vec<TokenInfo>, ConfigError> {
    s.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(TokenInfo::from_str)
        .collect()
}

/// Human-decimal string -> base units. Rejects negatives, garbage and zero.
pub fn parse_amount(field: &'static str, input: &str, decimals: u8) -> Result<U256, ValidationError> {
    let trimmed = input.trim();
    let invalid = || ValidationError::InvalidAmount {
        field,
        input: input.to_string(),
    };

    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
        return Err(invalid());
    }

    let amount = parse_units(trimmed, decimals)
        .map_err(|_| invalid())?
        .get_absolute();

    if amount.is_zero() {
        return Err(ValidationError::ZeroAmount { field });
    }
    Ok(amount)
}

/// Base units -> human-decimal string, trailing zeros trimmed
pub fn format_amount(amount: U256, decimals: u8) -> String {
    match format_units(amount, decimals) {
        Ok(s) if s.contains('.') => {
            let s = s.trim_end_matches('0').trim_end_matches('.');
            s.to_string()
        }
        Ok(s) => s,
        Err(_) => amount.to_string(),
    }
}
