//! Allowance Resolver
//!
//! Answers "does `spender` already hold enough allowance over `owner`'s
//! `token`?" A failed or malformed read never becomes a number: it comes back
//! as `Allowance::Unknown`, which never covers anything, so the caller asks for
//! an approval instead of silently skipping it.

use alloy_primitives::{Address, U256};
use tracing::{debug, warn};

use super::abi::IERC20;
use super::multicall::{decode, MulticallReader, ReadCall, ReadMode};
use crate::tokens::format_amount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowance {
    Known {
        raw: U256,
        /// Human-decimal rendering in the token's units
        amount: String,
    },
    Unknown,
}

impl Allowance {
    pub fn known(raw: U256, decimals: u8) -> Self {
        Allowance::Known {
            raw,
            amount: format_amount(raw, decimals),
        }
    }

    /// True only when the allowance is known and at least `required`
    pub fn covers(&self, required: U256) -> bool {
        match self {
            Allowance::Known { raw, .. } => *raw >= required,
            Allowance::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceRequest {
    pub token: Address,
    pub decimals: u8,
    pub owner: Address,
    pub spender: Address,
}

#[derive(Clone)]
pub struct AllowanceResolver {
    reader: MulticallReader,
}

impl AllowanceResolver {
    pub fn new(reader: MulticallReader) -> Self {
        Self { reader }
    }

    /// Single allowance read
    pub async fn allowance(&self, request: AllowanceRequest) -> Allowance {
        self.allowances(&[request])
            .await
            .pop()
            .unwrap_or(Allowance::Unknown)
    }

    /// Several allowances in one batched read; output order matches `requests`
    pub async fn allowances(&self, requests: &[AllowanceRequest]) -> Vec<Allowance> {
        let calls = requests
            .iter()
            .map(|r| {
                ReadCall::new(
                    r.token,
                    IERC20::allowanceCall {
                        owner: r.owner,
                        spender: r.spender,
                    },
                )
            })
            .collect();

        let results = match self.reader.read(calls, ReadMode::Lenient).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Allowance read failed: {}", e);
                return vec![Allowance::Unknown; requests.len()];
            }
        };

        requests
            .iter()
            .zip(results.iter())
            .map(|(request, slot)| match decode::<IERC20::allowanceCall>(slot) {
                Some(raw) => Allowance::known(raw, request.decimals),
                None => {
                    debug!(
                        "Allowance of {:?} for spender {:?} unknown",
                        request.token, request.spender
                    );
                    Allowance::Unknown
                }
            })
            .collect()
    }
}
