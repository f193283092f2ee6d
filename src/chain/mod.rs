//! Chain access: the injected client, contract surfaces, and the read helpers
//! built on top of it (chunked multicall, allowance resolution).

pub mod abi;
pub mod allowance;
pub mod multicall;
mod rpc;

pub use allowance::{Allowance, AllowanceRequest, AllowanceResolver};
pub use multicall::{chunk, decode, MulticallReader, ReadCall, ReadMode};
pub use rpc::RpcChainClient;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::Result;

use abi::IMulticall3;

/// A single state-changing contract call, not yet priced or signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl WriteCall {
    pub fn new<C: SolCall>(to: Address, call: C) -> Self {
        Self {
            to,
            data: call.abi_encode().into(),
            value: U256::ZERO,
        }
    }

    /// 4-byte function selector of the encoded call
    pub fn selector(&self) -> [u8; 4] {
        let mut sel = [0u8; 4];
        if self.data.len() >= 4 {
            sel.copy_from_slice(&self.data[..4]);
        }
        sel
    }

    /// Decode the call back into its typed form (None if the selector differs)
    pub fn decode_as<C: SolCall>(&self) -> Option<C> {
        if self.selector() != C::SELECTOR {
            return None;
        }
        C::abi_decode(&self.data).ok()
    }
}

/// EIP-1559 fee quote for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// What the chain said about an included transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Read/write access to the chain, provided by the wallet/RPC layer.
///
/// Every method is a suspension point. Implementations own their transport's
/// timeout and retry behaviour; callers never add deadlines of their own.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Connected wallet address
    fn account(&self) -> Address;

    /// Execute one Multicall3 `aggregate3` batch
    async fn aggregate(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>>;

    async fn estimate_gas(&self, call: &WriteCall) -> Result<u64>;

    async fn fee_quote(&self) -> Result<FeeQuote>;

    /// Sign and broadcast; returns as soon as the hash is known
    async fn submit(&self, call: &WriteCall, gas_limit: u64, fees: FeeQuote) -> Result<TxHash>;

    /// Wait until the transaction is included
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt>;
}

/// Flatten an eyre report into one line, causes included.
/// Classification matches against this text.
pub fn error_text(err: &eyre::Report) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
