//! Typed errors at the boundaries of the state layer
//!
//! Internal plumbing uses `eyre::Result`. These enums exist where a caller
//! needs to branch on *what* went wrong: malformed chain data, user input
//! rejected before any chain call, and missing configuration.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Chain return data that could not be turned into a typed value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("call to {target} failed")]
    CallFailed { target: Address },

    #[error("call to {target} returned malformed data: {reason}")]
    Malformed { target: Address, reason: String },

    #[error("multicall returned {got} results for {expected} calls")]
    LengthMismatch { expected: usize, got: usize },
}

/// Pre-check failures. These never reach the sequencer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field}: '{input}' is not a valid amount")]
    InvalidAmount { field: &'static str, input: String },

    #[error("{field}: amount must be greater than zero")]
    ZeroAmount { field: &'static str },

    #[error("{field}: amount {requested} exceeds balance {available}")]
    ExceedsBalance {
        field: &'static str,
        requested: String,
        available: String,
    },

    #[error("unknown pair {0}")]
    UnknownPair(Address),

    #[error("pair {0} has no gauge")]
    NoGauge(Address),

    #[error("veNFT #{0} is not owned by this account")]
    UnknownNft(U256),

    #[error("veNFT #{0} is still locked")]
    LockNotExpired(U256),

    #[error("veNFT #{0} lock has already expired")]
    LockExpired(U256),

    #[error("vote: {0}")]
    VoteWeights(String),

    #[error("lock duration: {0}")]
    LockDuration(String),

    #[error("cannot merge veNFT #{0} into itself")]
    SelfMerge(U256),

    #[error("swap: {0}")]
    Route(String),

    #[error("nothing to claim")]
    NothingToClaim,
}

impl ValidationError {
    /// Form field the error belongs to, for field-level display
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidAmount { field, .. }
            | ValidationError::ZeroAmount { field }
            | ValidationError::ExceedsBalance { field, .. } => field,
            ValidationError::UnknownPair(_) | ValidationError::NoGauge(_) => "pair",
            ValidationError::UnknownNft(_)
            | ValidationError::LockNotExpired(_)
            | ValidationError::LockExpired(_)
            | ValidationError::SelfMerge(_) => "nft",
            ValidationError::LockDuration(_) => "duration",
            ValidationError::VoteWeights(_) => "votes",
            ValidationError::Route(_) => "route",
            ValidationError::NothingToClaim => "rewards",
        }
    }
}

/// Missing or invalid configuration. Blocks the dependent workflow entirely.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing contract address: {0}")]
    MissingAddress(&'static str),

    #[error("invalid address for {key}: {value}")]
    InvalidAddress { key: &'static str, value: String },

    #[error("invalid token entry '{0}' (expected address:symbol:decimals)")]
    InvalidToken(String),

    #[error("multicall chunk size must be at least 1")]
    ZeroChunkSize,

    #[error("no signer configured; set PRIVATE_KEY to send transactions")]
    NoSigner,

    #[error("no account configured; set PRIVATE_KEY or ACCOUNT")]
    NoAccount,

    #[error("RPC serves chain {got}, configured CHAIN_ID is {expected}")]
    ChainMismatch { expected: u64, got: u64 },
}
