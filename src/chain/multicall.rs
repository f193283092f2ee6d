//! Chunked Multicall3 reader
//!
//! Batches any number of independent view calls into `aggregate3` calls of at
//! most `chunk_size` entries, runs the chunks concurrently, and hands results
//! back in exactly the order the calls were given.
//!
//! Two failure modes:
//! - `Strict`: `allowFailure = false`, any failing call (or transport error)
//!   fails the whole read.
//! - `Lenient`: each failing call comes back as `None`. A transport error
//!   for one chunk turns that chunk's slots into `None` and is logged.

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use eyre::{eyre, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

use super::abi::IMulticall3;
use super::ChainClient;
use crate::errors::DecodeError;

/// Default calls per `aggregate3` batch (to stay under node call-size limits)
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default number of chunks in flight at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// One view call: target contract + ABI-encoded calldata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    pub target: Address,
    pub call_data: Bytes,
}

impl ReadCall {
    pub fn new<C: SolCall>(target: Address, call: C) -> Self {
        Self {
            target,
            call_data: call.abi_encode().into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Strict,
    Lenient,
}

/// Split `calls` into consecutive chunks of at most `max_chunk_size`.
/// Order is preserved; a size of 0 is treated as 1.
pub fn chunk(calls: Vec<ReadCall>, max_chunk_size: usize) -> Vec<Vec<ReadCall>> {
    let size = max_chunk_size.max(1);
    let mut chunks = Vec::with_capacity(calls.len().div_ceil(size));
    let mut iter = calls.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Decode one result slot, `None` if the call failed or the data is malformed
pub fn decode<C: SolCall>(slot: &Option<Bytes>) -> Option<C::Return> {
    slot.as_ref()
        .and_then(|data| C::abi_decode_returns(data).ok())
}

/// Decode one result slot, failing with a typed error
pub fn decode_strict<C: SolCall>(target: Address, slot: &Option<Bytes>) -> Result<C::Return, DecodeError> {
    let data = slot.as_ref().ok_or(DecodeError::CallFailed { target })?;
    C::abi_decode_returns(data).map_err(|e| DecodeError::Malformed {
        target,
        reason: e.to_string(),
    })
}

#[derive(Clone)]
pub struct MulticallReader {
    chain: Arc<dyn ChainClient>,
    chunk_size: usize,
    max_in_flight: usize,
}

impl MulticallReader {
    pub fn new(chain: Arc<dyn ChainClient>, chunk_size: usize, max_in_flight: usize) -> Self {
        Self {
            chain,
            chunk_size: chunk_size.max(1),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Chunk and execute in one go
    pub async fn read(&self, calls: Vec<ReadCall>, mode: ReadMode) -> Result<Vec<Option<Bytes>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        self.execute_chunks(chunk(calls, self.chunk_size), mode).await
    }

    /// Execute pre-built chunks and concatenate results in call order
    pub async fn execute_chunks(
        &self,
        chunks: Vec<Vec<ReadCall>>,
        mode: ReadMode,
    ) -> Result<Vec<Option<Bytes>>> {
        let start = Instant::now();
        let chunk_count = chunks.len();
        let total: usize = chunks.iter().map(Vec::len).sum();

        // `buffered` keeps output order equal to input order
        let results: Vec<Result<Vec<Option<Bytes>>>> = stream::iter(
            chunks.into_iter().map(|c| self.execute_chunk(c, mode)),
        )
        .buffered(self.max_in_flight)
        .collect()
        .await;

        let mut out = Vec::with_capacity(total);
        for result in results {
            out.extend(result?);
        }

        debug!(
            "⚡ Multicall3: {} calls in {} chunk(s) in {:?}",
            total,
            chunk_count,
            start.elapsed()
        );

        Ok(out)
    }

    async fn execute_chunk(&self, calls: Vec<ReadCall>, mode: ReadMode) -> Result<Vec<Option<Bytes>>> {
        let expected = calls.len();
        let allow_failure = mode == ReadMode::Lenient;

        let batch: Vec<IMulticall3::Call3> = calls
            .iter()
            .map(|c| IMulticall3::Call3 {
                target: c.target,
                allowFailure: allow_failure,
                callData: c.call_data.clone(),
            })
            .collect();

        let results = match self.chain.aggregate(batch).await {
            Ok(results) => results,
            Err(e) if mode == ReadMode::Lenient => {
                warn!("Multicall chunk of {} calls failed, using placeholders: {}", expected, e);
                return Ok(vec![None; expected]);
            }
            Err(e) => return Err(e.wrap_err("multicall chunk failed")),
        };

        if results.len() != expected {
            let err = DecodeError::LengthMismatch {
                expected,
                got: results.len(),
            };
            if mode == ReadMode::Lenient {
                warn!("{}", err);
                return Ok(vec![None; expected]);
            }
            return Err(err.into());
        }

        let mut out = Vec::with_capacity(expected);
        for (call, result) in calls.iter().zip(results) {
            if result.success {
                out.push(Some(result.returnData));
            } else if mode == ReadMode::Strict {
                return Err(eyre!(DecodeError::CallFailed { target: call.target }));
            } else {
                trace!("Call to {:?} failed inside multicall", call.target);
                out.push(None);
            }
        }

        Ok(out)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::abi::IERC20;
    use crate::testing::MockChain;
    use alloy_primitives::U256;
    use tokio_test::{assert_err, assert_ok};

    fn token(i: u8) -> Address {
        Address::repeat_byte(i)
    }

    fn balance_calls(owner: Address, n: u8) -> Vec<ReadCall> {
        (1..=n)
            .map(|i| ReadCall::new(token(i), IERC20::balanceOfCall { account: owner }))
            .collect()
    }

    #[test]
    fn test_chunk_preserves_order_and_sizes() {
        let calls = balance_calls(Address::ZERO, 7);
        let chunks = chunk(calls.clone(), 3);

        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        let flat: Vec<ReadCall> = chunks.into_iter().flatten().collect();
        assert_eq!(flat, calls);
    }

    #[test]
    fn test_chunk_edge_sizes() {
        assert!(chunk(Vec::new(), 5).is_empty());
        assert_eq!(chunk(balance_calls(Address::ZERO, 4), 0).len(), 4);
        assert_eq!(chunk(balance_calls(Address::ZERO, 4), 100).len(), 1);
    }

    #[tokio::test]
    async fn test_results_in_call_order_for_every_chunk_size() {
        let owner = Address::repeat_byte(0xaa);
        let mock = MockChain::new(owner);
        for i in 1..=9u8 {
            mock.on_read(token(i), IERC20::balanceOfCall { account: owner }, U256::from(i as u64 * 10));
        }
        let chain = mock.client();

        let expected: Vec<U256> = (1..=9u64).map(|i| U256::from(i * 10)).collect();

        for n in 1..=11 {
            let reader = MulticallReader::new(chain.clone(), n, 3);
            let calls = balance_calls(owner, 9);
            let results = assert_ok!(reader.execute_chunks(chunk(calls, n), ReadMode::Strict).await);
            let decoded: Vec<U256> = results
                .iter()
                .map(|slot| decode::<IERC20::balanceOfCall>(slot).unwrap())
                .collect();
            assert_eq!(decoded, expected, "chunk size {}", n);
        }
    }

    #[tokio::test]
    async fn test_lenient_mode_keeps_slot_for_failed_call() {
        let owner = Address::repeat_byte(0xaa);
        let mock = MockChain::new(owner);
        mock.on_read(token(1), IERC20::balanceOfCall { account: owner }, U256::from(1));
        // token(2) not registered -> call fails
        mock.on_read(token(3), IERC20::balanceOfCall { account: owner }, U256::from(3));
        let reader = MulticallReader::new(mock.client(), 2, 2);

        let results = assert_ok!(reader.read(balance_calls(owner, 3), ReadMode::Lenient).await);

        assert_eq!(results.len(), 3);
        assert_eq!(decode::<IERC20::balanceOfCall>(&results[0]), Some(U256::from(1)));
        assert!(results[1].is_none());
        assert_eq!(decode::<IERC20::balanceOfCall>(&results[2]), Some(U256::from(3)));
    }

    #[tokio::test]
    async fn test_strict_mode_fails_whole_read() {
        let owner = Address::repeat_byte(0xaa);
        let mock = MockChain::new(owner);
        mock.on_read(token(1), IERC20::balanceOfCall { account: owner }, U256::from(1));
        let reader = MulticallReader::new(mock.client(), 10, 1);

        assert_err!(reader.read(balance_calls(owner, 2), ReadMode::Strict).await);
    }

    #[tokio::test]
    async fn test_lenient_transport_failure_yields_placeholders() {
        let owner = Address::repeat_byte(0xaa);
        let mock = MockChain::new(owner);
        mock.on_read(token(1), IERC20::balanceOfCall { account: owner }, U256::from(1));
        mock.fail_aggregates(true);
        let reader = MulticallReader::new(mock.client(), 10, 1);

        let results = assert_ok!(reader.read(balance_calls(owner, 4), ReadMode::Lenient).await);
        assert_eq!(results, vec![None; 4]);
    }

    #[tokio::test]
    async fn test_short_chunk_becomes_placeholders_in_place() {
        let owner = Address::repeat_byte(0xaa);
        let mock = MockChain::new(owner);
        for i in 1..=5u8 {
            mock.on_read(token(i), IERC20::balanceOfCall { account: owner }, U256::from(i));
        }
        // chunks [1, 2] [3, 4] [5]; the middle one comes back one result short
        mock.short_aggregate(2);
        let reader = MulticallReader::new(mock.client(), 2, 1);

        let results = assert_ok!(reader.read(balance_calls(owner, 5), ReadMode::Lenient).await);

        let decoded: Vec<Option<U256>> = results.iter().map(decode::<IERC20::balanceOfCall>).collect();
        assert_eq!(
            decoded,
            vec![Some(U256::from(1)), Some(U256::from(2)), None, None, Some(U256::from(5))]
        );
    }

    #[tokio::test]
    async fn test_short_chunk_fails_strict_read() {
        let owner = Address::repeat_byte(0xaa);
        let mock = MockChain::new(owner);
        for i in 1..=3u8 {
            mock.on_read(token(i), IERC20::balanceOfCall { account: owner }, U256::from(i));
        }
        mock.short_aggregate(1);
        let reader = MulticallReader::new(mock.client(), 10, 1);

        let err = assert_err!(reader.read(balance_calls(owner, 3), ReadMode::Strict).await);
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::LengthMismatch { expected: 3, got: 2 })
        );
    }

    #[test]
    fn test_decode_strict_reports_failed_call() {
        let target = token(9);
        let err = decode_strict::<IERC20::balanceOfCall>(target, &None).unwrap_err();
        assert_eq!(err, DecodeError::CallFailed { target });
    }
}
