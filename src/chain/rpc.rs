//! HTTP JSON-RPC chain client
//!
//! Reads go through Multicall3 `aggregate3`. Writes are signed locally with a
//! private key and submitted as EIP-1559 transactions; inclusion is detected by
//! polling for the receipt.

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{Address, TxHash};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::abi::IMulticall3;
use super::{ChainClient, FeeQuote, TxReceipt, WriteCall};
use crate::config::Config;
use crate::errors::ConfigError;

pub struct RpcChainClient {
    rpc_url: String,
    multicall: Address,
    account: Address,
    wallet: Option<EthereumWallet>,
    receipt_poll_interval: Duration,
    receipt_max_polls: u32,
}

impl RpcChainClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let signer = match &config.private_key {
            Some(key) => {
                let signer = PrivateKeySigner::from_str(key.trim_start_matches("0x"))
                    .map_err(|e| eyre!("Failed to parse PRIVATE_KEY: {}", e))?;
                info!("✓ Signer loaded: {:?}", signer.address());
                Some(signer)
            }
            None => None,
        };

        let account = match (&signer, config.account) {
            (Some(s), _) => s.address(),
            (None, Some(account)) => {
                debug!("No signer configured, read-only account {:?}", account);
                account
            }
            (None, None) => return Err(ConfigError::NoAccount.into()),
        };

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            multicall: config.contracts.multicall,
            account,
            wallet: signer.map(EthereumWallet::from),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_ms),
            receipt_max_polls: config.receipt_max_polls,
        })
    }

    /// Chain id the endpoint reports
    pub async fn chain_id(&self) -> Result<u64> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let id = provider
            .get_chain_id()
            .await
            .map_err(|e| eyre!("Failed to read chain id: {}", e))?;
        Ok(id)
    }

    fn request(&self, call: &WriteCall) -> TransactionRequest {
        TransactionRequest::default()
            .from(self.account)
            .to(call.to)
            .value(call.value)
            .input(call.data.clone().into())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn account(&self) -> Address {
        self.account
    }

    async fn aggregate(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(self.multicall)
            .input(calldata.into());

        let result = provider.call(tx).await
            .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| eyre!("Failed to decode multicall result: {}", e))?;

        Ok(decoded)
    }

    async fn estimate_gas(&self, call: &WriteCall) -> Result<u64> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let gas = provider.estimate_gas(self.request(call)).await?;
        trace!("Gas estimate for {:?}: {}", call.to, gas);
        Ok(gas)
    }

    async fn fee_quote(&self) -> Result<FeeQuote> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        let fees = provider.estimate_eip1559_fees().await?;
        Ok(FeeQuote {
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn submit(&self, call: &WriteCall, gas_limit: u64, fees: FeeQuote) -> Result<TxHash> {
        let wallet = self.wallet.clone().ok_or(ConfigError::NoSigner)?;

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.parse()?);

        let tx = self
            .request(call)
            .gas_limit(gas_limit)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        let pending = provider.send_transaction(tx).await?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt> {
        let provider = ProviderBuilder::new()
            .connect_http(self.rpc_url.parse()?);

        for attempt in 0..self.receipt_max_polls {
            if let Some(receipt) = provider.get_transaction_receipt(hash).await? {
                debug!("Receipt for {} after {} poll(s)", hash, attempt + 1);
                return Ok(TxReceipt {
                    hash,
                    success: receipt.status(),
                    block_number: receipt.block_number(),
                });
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }

        Err(eyre!(
            "timeout: transaction {} not included after {} polls",
            hash,
            self.receipt_max_polls
        ))
    }
}
