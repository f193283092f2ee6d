//! Snapshot reconstruction from chain reads
//!
//! Every phase is one lenient chunked multicall. A failed slot drops the one
//! entity it belongs to (or leaves a balance unknown); it never aborts the
//! refresh.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::model::{BaseAsset, Bribe, Gauge, Position, VeNft};
use super::{AppStore, RefreshScope, SnapshotPatch};
use crate::api::PairListing;
use crate::chain::abi::{IBribe, IGauge, IPair, IVoter, IVotingEscrow, IERC20};
use crate::chain::{decode, MulticallReader, ReadCall, ReadMode};
use crate::config::Config;
use crate::rewards::{RewardAggregator, RewardQuery, RewardRecord};
use crate::tokens::TokenInfo;

/// Bribe reward tokens enumerated per bribe contract
const MAX_BRIBE_TOKENS: u64 = 16;

/// veNFTs enumerated per account
const MAX_VE_NFTS: u64 = 64;

pub struct SnapshotFetcher {
    reader: MulticallReader,
    store: AppStore,
    aggregator: RewardAggregator,
    account: Address,
    voter: Option<Address>,
    voting_escrow: Option<Address>,
    secondary_voter: Option<Address>,
    governance_token: TokenInfo,
    base_assets: Vec<TokenInfo>,
    pairs: Vec<PairListing>,
}

impl SnapshotFetcher {
    pub fn new(reader: MulticallReader, store: AppStore, config: &Config, account: Address, pairs: Vec<PairListing>) -> Self {
        let aggregator = RewardAggregator::new(
            reader.clone(),
            config.governance_token.clone(),
            config.contracts.rewards_distributor,
        )
        .with_secondary_token(config.secondary_token());

        // the governance token balance is always tracked (locks need it)
        let mut base_assets = config.base_assets.clone();
        if !base_assets.iter().any(|t| t.address == config.governance_token.address) {
            base_assets.push(config.governance_token.clone());
        }

        Self {
            reader,
            store,
            aggregator,
            account,
            voter: config.contracts.voter,
            voting_escrow: config.contracts.voting_escrow,
            secondary_voter: config.contracts.secondary_voter,
            governance_token: config.governance_token.clone(),
            base_assets,
            pairs,
        }
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// Re-read the fields named by `scope` and merge them as one patch
    pub async fn refresh(&self, scope: RefreshScope) {
        let start = Instant::now();

        let (base_assets, positions, ve_nfts) = tokio::join!(
            async {
                if scope.base_assets {
                    Some(self.base_assets().await)
                } else {
                    None
                }
            },
            async {
                if scope.positions {
                    Some(self.positions().await)
                } else {
                    None
                }
            },
            async {
                if scope.ve_nfts {
                    Some(self.ve_nfts().await)
                } else {
                    None
                }
            },
        );

        // keep the selection while the NFT is still owned, else first owned
        let current = self.store.get(|s| s.selected_nft).await;
        let selected = match &ve_nfts {
            Some(nfts) => match current {
                Some(id) if nfts.iter().any(|n| n.id == id) => Some(id),
                _ => nfts.first().map(|n| n.id),
            },
            None => current,
        };

        // records of a veNFT that is no longer selected must not linger
        let rewards = if scope.rewards || selected != current {
            let positions = match &positions {
                Some(p) => p.clone(),
                None => self.store.get(|s| s.positions.clone()).await,
            };
            Some(self.rewards(&positions, selected).await)
        } else {
            None
        };

        let patch = SnapshotPatch {
            account: Some(self.account),
            base_assets,
            positions,
            selected_nft: ve_nfts.as_ref().map(|_| selected),
            ve_nfts,
            rewards,
        };
        self.store.merge(patch).await;

        info!("🔄 Refreshed {:?} in {:?}", scope, start.elapsed());
    }

    /// Switch the veNFT rewards are aggregated for and re-read rewards
    pub async fn select_nft(&self, id: U256) {
        let positions = self.store.get(|s| s.positions.clone()).await;
        let rewards = self.rewards(&positions, Some(id)).await;
        self.store
            .merge(SnapshotPatch {
                selected_nft: Some(Some(id)),
                rewards: Some(rewards),
                ..Default::default()
            })
            .await;
    }

    // ============================================
    // BASE ASSETS
    // ============================================

    /// One balance per tracked token, in configuration order
    pub async fn base_assets(&self) -> Vec<BaseAsset> {
        let calls = self
            .base_assets
            .iter()
            .map(|t| ReadCall::new(t.address, IERC20::balanceOfCall { account: self.account }))
            .collect();

        let results = self.read_lenient(calls, "base asset balances").await;

        self.base_assets
            .iter()
            .zip(results.iter())
            .map(|(token, slot)| {
                let balance = decode::<IERC20::balanceOfCall>(slot);
                if balance.is_none() {
                    debug!("Balance of {} unknown", token.symbol);
                }
                BaseAsset {
                    token: token.clone(),
                    balance,
                }
            })
            .collect()
    }

    // ============================================
    // POSITIONS
    // ============================================

    pub async fn positions(&self) -> Vec<Position> {
        let start = Instant::now();

        // Phase 1: pair state + gauge lookup
        let per_pair = if self.voter.is_some() { 4 } else { 3 };
        let mut calls = Vec::with_capacity(self.pairs.len() * per_pair);
        for pair in &self.pairs {
            calls.push(ReadCall::new(pair.address, IPair::getReservesCall {}));
            calls.push(ReadCall::new(pair.address, IERC20::totalSupplyCall {}));
            calls.push(ReadCall::new(pair.address, IERC20::balanceOfCall { account: self.account }));
            if let Some(voter) = self.voter {
                calls.push(ReadCall::new(voter, IVoter::gaugesCall { pool: pair.address }));
            }
        }
        let results = self.read_lenient(calls, "pair state").await;

        let mut positions = Vec::with_capacity(self.pairs.len());
        let mut gauges: Vec<Option<Address>> = Vec::with_capacity(self.pairs.len());
        for (pair, slots) in self.pairs.iter().zip(results.chunks(per_pair)) {
            let reserves = decode::<IPair::getReservesCall>(&slots[0]);
            let total_supply = decode::<IERC20::totalSupplyCall>(&slots[1]);
            let balance = decode::<IERC20::balanceOfCall>(&slots[2]);
            let (Some(reserves), Some(total_supply), Some(balance)) = (reserves, total_supply, balance) else {
                let message = format!("Skipping pair {} ({}): core reads failed", pair.symbol, pair.address);
                warn!("{}", message);
                self.store.warn(message);
                continue;
            };

            let gauge = match self.voter {
                Some(_) => slots.get(3).and_then(decode::<IVoter::gaugesCall>),
                None => pair.gauge,
            };
            gauges.push(gauge.filter(|g| !g.is_zero()));
            positions.push(Position {
                address: pair.address,
                symbol: pair.symbol.clone(),
                decimals: pair.decimals,
                stable: pair.stable,
                token0: pair.token0.clone(),
                token1: pair.token1.clone(),
                reserve0: reserves.reserve0,
                reserve1: reserves.reserve1,
                total_supply,
                balance,
                gauge: None,
            });
        }

        // Phase 2: gauge state
        let gauged: Vec<(usize, Address)> = gauges
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.map(|g| (i, g)))
            .collect();
        let per_gauge = if self.voter.is_some() { 5 } else { 3 };
        let mut calls = Vec::with_capacity(gauged.len() * per_gauge);
        for (index, gauge) in &gauged {
            calls.push(ReadCall::new(*gauge, IGauge::balanceOfCall { account: self.account }));
            calls.push(ReadCall::new(*gauge, IGauge::totalSupplyCall {}));
            calls.push(ReadCall::new(
                *gauge,
                IGauge::earnedCall {
                    token: self.governance_token.address,
                    account: self.account,
                },
            ));
            if let Some(voter) = self.voter {
                calls.push(ReadCall::new(voter, IVoter::weightsCall { pool: positions[*index].address }));
                calls.push(ReadCall::new(voter, IVoter::external_bribesCall { gauge: *gauge }));
            }
        }
        let results = self.read_lenient(calls, "gauge state").await;

        for ((index, address), slots) in gauged.iter().zip(results.chunks(per_gauge)) {
            let balance = decode::<IGauge::balanceOfCall>(&slots[0]);
            let total_supply = decode::<IGauge::totalSupplyCall>(&slots[1]);
            let (Some(balance), Some(total_supply)) = (balance, total_supply) else {
                warn!("Gauge {} of {} unreadable, dropped", address, positions[*index].symbol);
                continue;
            };
            positions[*index].gauge = Some(Gauge {
                address: *address,
                bribe: slots
                    .get(4)
                    .and_then(decode::<IVoter::external_bribesCall>)
                    .filter(|b| !b.is_zero()),
                balance,
                total_supply,
                weight: slots.get(3).and_then(decode::<IVoter::weightsCall>).unwrap_or(U256::ZERO),
                bribes: Vec::new(),
                reward_earned: decode::<IGauge::earnedCall>(&slots[2]).unwrap_or(U256::ZERO),
            });
        }

        self.fill_bribes(&mut positions).await;

        info!(
            "📊 {} position(s) from {} listed pair(s) in {:?}",
            positions.len(),
            self.pairs.len(),
            start.elapsed()
        );
        positions
    }

    /// Phases 3-5: reward tokens and rates of every bribe contract
    async fn fill_bribes(&self, positions: &mut [Position]) {
        let bribes: Vec<(usize, Address)> = positions
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.gauge.as_ref().and_then(|g| g.bribe).map(|b| (i, b)))
            .collect();
        if bribes.is_empty() {
            return;
        }

        // Phase 3: how many reward tokens each bribe pays
        let calls = bribes
            .iter()
            .map(|(_, bribe)| ReadCall::new(*bribe, IBribe::rewardsListLengthCall {}))
            .collect();
        let lengths = self.read_lenient(calls, "bribe reward counts").await;

        // Phase 4: the reward token addresses
        let mut calls = Vec::new();
        let mut owners = Vec::new();
        for ((index, bribe), slot) in bribes.iter().zip(lengths.iter()) {
            let count = decode::<IBribe::rewardsListLengthCall>(slot)
                .map(|n| n.saturating_to::<u64>().min(MAX_BRIBE_TOKENS))
                .unwrap_or(0);
            for i in 0..count {
                calls.push(ReadCall::new(*bribe, IBribe::rewardsCall { index: U256::from(i) }));
                owners.push((*index, *bribe));
            }
        }
        let results = self.read_lenient(calls, "bribe reward tokens").await;
        let entries: Vec<(usize, Address, Address)> = owners
            .into_iter()
            .zip(results.iter())
            .filter_map(|((index, bribe), slot)| decode::<IBribe::rewardsCall>(slot).map(|token| (index, bribe, token)))
            .collect();

        // Phase 5: reward rates, plus metadata for tokens not known yet
        let known = self.known_tokens(positions);
        let mut unknown: Vec<Address> = Vec::new();
        for (_, _, token) in &entries {
            if !known.contains_key(token) && !unknown.contains(token) {
                unknown.push(*token);
            }
        }

        let mut calls: Vec<ReadCall> = entries
            .iter()
            .map(|(_, bribe, token)| ReadCall::new(*bribe, IBribe::rewardRateCall { token: *token }))
            .collect();
        for token in &unknown {
            calls.push(ReadCall::new(*token, IERC20::symbolCall {}));
            calls.push(ReadCall::new(*token, IERC20::decimalsCall {}));
        }
        let results = self.read_lenient(calls, "bribe rates").await;
        let (rates, metadata) = results.split_at(entries.len().min(results.len()));

        let mut tokens = known;
        for (token, slots) in unknown.iter().zip(metadata.chunks(2)) {
            let symbol = decode::<IERC20::symbolCall>(&slots[0]);
            let decimals = slots.get(1).and_then(decode::<IERC20::decimalsCall>);
            let info = match (symbol, decimals) {
                (Some(symbol), Some(decimals)) => TokenInfo::new(*token, symbol, decimals),
                _ => TokenInfo::unknown(*token),
            };
            tokens.insert(*token, info);
        }

        for ((index, _, token), slot) in entries.iter().zip(rates.iter()) {
            let Some(gauge) = positions[*index].gauge.as_mut() else { continue };
            gauge.bribes.push(Bribe {
                token: tokens.get(token).cloned().unwrap_or_else(|| TokenInfo::unknown(*token)),
                reward_rate: decode::<IBribe::rewardRateCall>(slot).unwrap_or(U256::ZERO),
            });
        }
    }

    fn known_tokens(&self, positions: &[Position]) -> HashMap<Address, TokenInfo> {
        let mut known = HashMap::new();
        for token in self.base_assets.iter() {
            known.insert(token.address, token.clone());
        }
        for p in positions {
            known.entry(p.token0.address).or_insert_with(|| p.token0.clone());
            known.entry(p.token1.address).or_insert_with(|| p.token1.clone());
        }
        known
    }

    /// Same pairs, carrying their gauge in the secondary emissions program
    pub async fn secondary_positions(&self, positions: &[Position]) -> Vec<Position> {
        let Some(voter) = self.secondary_voter else {
            return Vec::new();
        };

        let calls = positions
            .iter()
            .map(|p| ReadCall::new(voter, IVoter::gaugesCall { pool: p.address }))
            .collect();
        let results = self.read_lenient(calls, "secondary gauges").await;

        positions
            .iter()
            .zip(results.iter())
            .filter_map(|(p, slot)| {
                let gauge = decode::<IVoter::gaugesCall>(slot).filter(|g| !g.is_zero())?;
                Some(Position {
                    gauge: Some(Gauge {
                        address: gauge,
                        bribe: None,
                        balance: U256::ZERO,
                        total_supply: U256::ZERO,
                        weight: U256::ZERO,
                        bribes: Vec::new(),
                        reward_earned: U256::ZERO,
                    }),
                    ..p.clone()
                })
            })
            .collect()
    }

    // ============================================
    // VOTE ESCROW
    // ============================================

    pub async fn ve_nfts(&self) -> Vec<VeNft> {
        let Some(ve) = self.voting_escrow else {
            debug!("No vote-escrow configured");
            return Vec::new();
        };

        let results = self
            .read_lenient(vec![ReadCall::new(ve, IVotingEscrow::balanceOfCall { owner: self.account })], "veNFT count")
            .await;
        let Some(count) = results.first().and_then(decode::<IVotingEscrow::balanceOfCall>) else {
            warn!("veNFT count unreadable");
            return Vec::new();
        };
        let count = count.saturating_to::<u64>().min(MAX_VE_NFTS);

        let calls = (0..count)
            .map(|i| {
                ReadCall::new(
                    ve,
                    IVotingEscrow::tokenOfOwnerByIndexCall {
                        owner: self.account,
                        index: U256::from(i),
                    },
                )
            })
            .collect();
        let ids: Vec<U256> = self
            .read_lenient(calls, "veNFT ids")
            .await
            .iter()
            .filter_map(decode::<IVotingEscrow::tokenOfOwnerByIndexCall>)
            .filter(|id| !id.is_zero())
            .collect();

        let mut calls = Vec::with_capacity(ids.len() * 3);
        for id in &ids {
            calls.push(ReadCall::new(ve, IVotingEscrow::lockedCall { tokenId: *id }));
            calls.push(ReadCall::new(ve, IVotingEscrow::balanceOfNFTCall { tokenId: *id }));
            calls.push(ReadCall::new(ve, IVotingEscrow::votedCall { tokenId: *id }));
        }
        let results = self.read_lenient(calls, "veNFT locks").await;

        let mut nfts = Vec::with_capacity(ids.len());
        for (id, slots) in ids.iter().zip(results.chunks(3)) {
            let Some(locked) = decode::<IVotingEscrow::lockedCall>(&slots[0]) else {
                let message = format!("Lock of veNFT #{} unreadable, skipped", id);
                warn!("{}", message);
                self.store.warn(message);
                continue;
            };
            nfts.push(VeNft {
                id: *id,
                locked: U256::from(locked.amount.max(0) as u128),
                lock_end: locked.end.saturating_to::<u64>(),
                voting_power: slots.get(1).and_then(decode::<IVotingEscrow::balanceOfNFTCall>).unwrap_or(U256::ZERO),
                voted: slots.get(2).and_then(decode::<IVotingEscrow::votedCall>).unwrap_or(false),
            });
        }
        nfts
    }

    // ============================================
    // REWARDS
    // ============================================

    pub async fn rewards(&self, positions: &[Position], nft: Option<U256>) -> Vec<RewardRecord> {
        let secondary = self.secondary_positions(positions).await;
        self.aggregator
            .aggregate(RewardQuery {
                account: self.account,
                nft_id: nft,
                positions,
                secondary: &secondary,
            })
            .await
    }

    /// Current bribe earnings of `nft` over the cached positions
    pub async fn bribes_for(&self, nft: U256) -> Vec<RewardRecord> {
        let positions = self.store.get(|s| s.positions.clone()).await;
        self.aggregator.bribe_rewards(nft, &positions).await
    }

    async fn read_lenient(&self, calls: Vec<ReadCall>, what: &str) -> Vec<Option<alloy_primitives::Bytes>> {
        let expected = calls.len();
        match self.reader.read(calls, ReadMode::Lenient).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Reading {} failed: {}", what, e);
                vec![None; expected]
            }
        }
    }
}

// ============================================
// TESTS
// ============================================
