//! Scripted chain client for unit tests

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::chain::abi::IMulticall3;
use crate::chain::{ChainClient, FeeQuote, TxReceipt, WriteCall};

type Hook = Box<dyn FnOnce(&MockChain) + Send>;

/// Answers `aggregate3` from a (target, calldata) table and records writes.
pub(crate) struct MockChain {
    account: Address,
    reads: Mutex<HashMap<(Address, Vec<u8>), Bytes>>,
    fail_aggregates: AtomicBool,
    aggregate_calls: AtomicUsize,
    short_aggregate: Mutex<Option<usize>>,
    submit_count: AtomicUsize,
    after_submit: Mutex<Vec<(usize, Hook)>>,
    reject_submission: Mutex<Option<usize>>,
    estimate_reverts: Mutex<HashMap<[u8; 4], String>>,
    receipt_reverts: Mutex<Vec<[u8; 4]>>,
    submissions: Mutex<Vec<WriteCall>>,
    log: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new(account: Address) -> Arc<Self> {
        Arc::new(Self {
            account,
            reads: Mutex::new(HashMap::new()),
            fail_aggregates: AtomicBool::new(false),
            aggregate_calls: AtomicUsize::new(0),
            short_aggregate: Mutex::new(None),
            submit_count: AtomicUsize::new(0),
            after_submit: Mutex::new(Vec::new()),
            reject_submission: Mutex::new(None),
            estimate_reverts: Mutex::new(HashMap::new()),
            receipt_reverts: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn client(self: &Arc<Self>) -> Arc<dyn ChainClient> {
        self.clone()
    }

    /// Register the return value of a view call
    pub fn on_read<C: SolCall>(&self, target: Address, call: C, ret: C::Return) {
        let key = (target, call.abi_encode());
        let value: Bytes = C::abi_encode_returns(&ret).into();
        self.reads.lock().unwrap().insert(key, value);
    }

    /// Make a previously registered view call fail
    pub fn forget_read<C: SolCall>(&self, target: Address, call: C) {
        self.reads.lock().unwrap().remove(&(target, call.abi_encode()));
    }

    pub fn fail_aggregates(&self, fail: bool) {
        self.fail_aggregates.store(fail, Ordering::SeqCst);
    }

    /// The n-th `aggregate3` (1-based) answers with its last result missing
    pub fn short_aggregate(&self, n: usize) {
        *self.short_aggregate.lock().unwrap() = Some(n);
    }

    /// Run `hook` once the n-th submission (1-based) is accepted, so later
    /// reads see the state that transaction produced
    pub fn after_submission(&self, n: usize, hook: impl FnOnce(&MockChain) + Send + 'static) {
        self.after_submit.lock().unwrap().push((n, Box::new(hook)));
    }

    /// The n-th submission (1-based) is declined by the "wallet"
    pub fn reject_submission(&self, n: usize) {
        *self.reject_submission.lock().unwrap() = Some(n);
    }

    /// Gas estimation for calls with this selector reverts with `reason`
    pub fn revert_estimate(&self, selector: [u8; 4], reason: &str) {
        self.estimate_reverts
            .lock()
            .unwrap()
            .insert(selector, reason.to_string());
    }

    /// Calls with this selector are included but revert
    pub fn revert_receipt(&self, selector: [u8; 4]) {
        self.receipt_reverts.lock().unwrap().push(selector);
    }

    pub fn submissions(&self) -> Vec<WriteCall> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push_log(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn account(&self) -> Address {
        self.account
    }

    async fn aggregate(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>> {
        let n = self.aggregate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_aggregates.load(Ordering::SeqCst) {
            return Err(eyre!("error sending request: connection reset"));
        }

        let reads = self.reads.lock().unwrap();
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            match reads.get(&(call.target, call.callData.to_vec())) {
                Some(data) => out.push(IMulticall3::Result {
                    success: true,
                    returnData: data.clone(),
                }),
                None if call.allowFailure => out.push(IMulticall3::Result {
                    success: false,
                    returnData: Bytes::new(),
                }),
                None => return Err(eyre!("execution reverted: Multicall3: call failed")),
            }
        }
        if *self.short_aggregate.lock().unwrap() == Some(n) {
            out.pop();
        }
        Ok(out)
    }

    async fn estimate_gas(&self, call: &WriteCall) -> Result<u64> {
        self.push_log(format!("estimate {}", Bytes::from(call.selector().to_vec())));
        if let Some(reason) = self.estimate_reverts.lock().unwrap().get(&call.selector()) {
            return Err(eyre!("execution reverted: {}", reason));
        }
        Ok(100_000)
    }

    async fn fee_quote(&self) -> Result<FeeQuote> {
        Ok(FeeQuote {
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
        })
    }

    async fn submit(&self, call: &WriteCall, _gas_limit: u64, _fees: FeeQuote) -> Result<TxHash> {
        let n = self.submit_count.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.reject_submission.lock().unwrap() == Some(n) {
            self.push_log("rejected".to_string());
            return Err(eyre!("user rejected transaction"));
        }
        self.submissions.lock().unwrap().push(call.clone());
        self.push_log("submit".to_string());

        let (due, rest): (Vec<_>, Vec<_>) = self
            .after_submit
            .lock()
            .unwrap()
            .drain(..)
            .partition(|(at, _)| *at == n);
        *self.after_submit.lock().unwrap() = rest;
        for (_, hook) in due {
            hook(self);
        }

        let mut hash = [0u8; 32];
        hash[..4].copy_from_slice(&call.selector());
        hash[31] = n as u8;
        Ok(TxHash::from(hash))
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt> {
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&hash[..4]);
        let success = !self.receipt_reverts.lock().unwrap().contains(&selector);
        self.push_log("receipt".to_string());
        Ok(TxReceipt {
            hash,
            success,
            block_number: Some(1),
        })
    }
}

/// 1 token with 18 decimals
pub(crate) fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}
