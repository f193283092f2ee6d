//! Reward Aggregator
//!
//! Merges three independent reward sources into one claim list:
//! - Bribe: fees/bribes earned by a veNFT on each voted gauge
//! - Gauge: emissions earned by the wallet on each staked position
//! - Distribution: the veNFT's claimable rebase
//!
//! Order: secondary-program emissions, bribes, primary emissions,
//! distribution. Each category reads different contracts so nothing needs
//! de-duplicating. Zero or unreadable amounts never make it into the list.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chain::abi::{IBribe, IGauge, IRewardsDistributor};
use crate::chain::{decode, MulticallReader, ReadCall, ReadMode};
use crate::state::Position;
use crate::tokens::TokenInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardProgram {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    Bribe,
    Gauge,
    Distribution,
}

/// A positive earned amount of one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnedToken {
    pub token: TokenInfo,
    pub earned: U256,
    /// `earned` in human-decimal units
    pub display: String,
}

impl EarnedToken {
    pub fn new(token: TokenInfo, earned: U256) -> Self {
        let display = token.format(earned);
        Self { token, earned, display }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardRecord {
    Bribe {
        pair: Address,
        symbol: String,
        gauge: Address,
        bribe: Address,
        nft_id: U256,
        rewards: Vec<EarnedToken>,
    },
    Gauge {
        pair: Address,
        symbol: String,
        gauge: Address,
        program: RewardProgram,
        reward: EarnedToken,
    },
    Distribution {
        nft_id: U256,
        lock_token: TokenInfo,
        reward: EarnedToken,
    },
}

impl RewardRecord {
    pub fn kind(&self) -> RewardKind {
        match self {
            RewardRecord::Bribe { .. } => RewardKind::Bribe,
            RewardRecord::Gauge { .. } => RewardKind::Gauge,
            RewardRecord::Distribution { .. } => RewardKind::Distribution,
        }
    }

    /// Every earned amount the record carries
    pub fn earned(&self) -> Vec<&EarnedToken> {
        match self {
            RewardRecord::Bribe { rewards, .. } => rewards.iter().collect(),
            RewardRecord::Gauge { reward, .. } | RewardRecord::Distribution { reward, .. } => vec![reward],
        }
    }

    pub fn label(&self) -> String {
        match self {
            RewardRecord::Bribe { symbol, nft_id, .. } => format!("{} bribes (#{})", symbol, nft_id),
            RewardRecord::Gauge {
                symbol,
                program: RewardProgram::Primary,
                ..
            } => format!("{} emissions", symbol),
            RewardRecord::Gauge {
                symbol,
                program: RewardProgram::Secondary,
                ..
            } => format!("{} emissions (secondary)", symbol),
            RewardRecord::Distribution { nft_id, .. } => format!("Rebase (#{})", nft_id),
        }
    }
}

/// Inputs of one aggregation
#[derive(Debug, Clone, Copy)]
pub struct RewardQuery<'a> {
    pub account: Address,
    /// `None` or zero means the account has no veNFT selected
    pub nft_id: Option<U256>,
    pub positions: &'a [Position],
    /// Positions with a gauge in the secondary emissions program
    pub secondary: &'a [Position],
}

#[derive(Clone)]
pub struct RewardAggregator {
    reader: MulticallReader,
    /// Emissions and rebase token (the locked governance token)
    reward_token: TokenInfo,
    /// Token the secondary gauge program pays out
    secondary_token: TokenInfo,
    distributor: Option<Address>,
}

impl RewardAggregator {
    pub fn new(reader: MulticallReader, reward_token: TokenInfo, distributor: Option<Address>) -> Self {
        Self {
            reader,
            secondary_token: reward_token.clone(),
            reward_token,
            distributor,
        }
    }

    pub fn with_secondary_token(mut self, token: TokenInfo) -> Self {
        self.secondary_token = token;
        self
    }

    pub async fn aggregate(&self, query: RewardQuery<'_>) -> Vec<RewardRecord> {
        let nft = query.nft_id.filter(|id| !id.is_zero());

        let secondary = self
            .gauge_rewards(query.account, query.secondary, RewardProgram::Secondary)
            .await;

        let bribes = match nft {
            Some(id) => self.bribe_rewards(id, query.positions).await,
            None => {
                debug!("No veNFT selected, skipping bribes and distribution");
                Vec::new()
            }
        };

        let emissions = self
            .gauge_rewards(query.account, query.positions, RewardProgram::Primary)
            .await;

        let distribution = match nft {
            Some(id) => self.distribution_reward(id).await,
            None => None,
        };

        let mut records = secondary;
        records.extend(bribes);
        records.extend(emissions);
        records.extend(distribution);

        info!("💰 {} reward record(s)", records.len());
        records
    }

    /// Bribe earnings of `nft` on every gauge that has a bribe contract
    pub async fn bribe_rewards(&self, nft: U256, positions: &[Position]) -> Vec<RewardRecord> {
        let mut calls = Vec::new();
        // (position index, reward token) per call
        let mut owners: Vec<(usize, &TokenInfo)> = Vec::new();

        for (index, position) in positions.iter().enumerate() {
            let Some(gauge) = &position.gauge else { continue };
            let Some(bribe) = gauge.bribe else { continue };
            for entry in &gauge.bribes {
                calls.push(ReadCall::new(
                    bribe,
                    IBribe::earnedCall {
                        token: entry.token.address,
                        tokenId: nft,
                    },
                ));
                owners.push((index, &entry.token));
            }
        }

        let results = match self.reader.read(calls, ReadMode::Lenient).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Bribe reward read failed: {}", e);
                return Vec::new();
            }
        };

        let mut earned: Vec<Vec<EarnedToken>> = vec![Vec::new(); positions.len()];
        let mut failed = vec![false; positions.len()];
        for ((index, token), slot) in owners.into_iter().zip(results.iter()) {
            match decode::<IBribe::earnedCall>(slot) {
                Some(amount) if !amount.is_zero() => earned[index].push(EarnedToken::new(token.clone(), amount)),
                Some(_) => {}
                None => failed[index] = true,
            }
        }

        let mut records = Vec::new();
        for (index, position) in positions.iter().enumerate() {
            if failed[index] {
                warn!("Some bribe reads failed for {}", position.symbol);
            }
            let rewards = std::mem::take(&mut earned[index]);
            if rewards.is_empty() {
                continue;
            }
            let (Some(gauge), Some(bribe)) = (&position.gauge, position.gauge.as_ref().and_then(|g| g.bribe)) else {
                continue;
            };
            records.push(RewardRecord::Bribe {
                pair: position.address,
                symbol: position.symbol.clone(),
                gauge: gauge.address,
                bribe,
                nft_id: nft,
                rewards,
            });
        }
        records
    }

    /// Emissions earned by `account` on every gauge-bearing position
    pub async fn gauge_rewards(&self, account: Address, positions: &[Position], program: RewardProgram) -> Vec<RewardRecord> {
        let reward_token = match program {
            RewardProgram::Primary => &self.reward_token,
            RewardProgram::Secondary => &self.secondary_token,
        };
        let staked: Vec<(&Position, Address)> = positions
            .iter()
            .filter_map(|p| p.gauge.as_ref().map(|g| (p, g.address)))
            .collect();

        let calls = staked
            .iter()
            .map(|(_, gauge)| {
                ReadCall::new(
                    *gauge,
                    IGauge::earnedCall {
                        token: reward_token.address,
                        account,
                    },
                )
            })
            .collect();

        let results = match self.reader.read(calls, ReadMode::Lenient).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Gauge reward read failed: {}", e);
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for ((position, gauge), slot) in staked.into_iter().zip(results.iter()) {
            match decode::<IGauge::earnedCall>(slot) {
                Some(amount) if !amount.is_zero() => records.push(RewardRecord::Gauge {
                    pair: position.address,
                    symbol: position.symbol.clone(),
                    gauge,
                    program,
                    reward: EarnedToken::new(reward_token.clone(), amount),
                }),
                Some(_) => {}
                None => warn!("Gauge reward read failed for {}", position.symbol),
            }
        }
        records
    }

    /// Claimable rebase of `nft`, if a distributor is configured and it is positive
    pub async fn distribution_reward(&self, nft: U256) -> Option<RewardRecord> {
        let Some(distributor) = self.distributor else {
            debug!("No rewards distributor configured, skipping rebase");
            return None;
        };

        let results = match self
            .reader
            .read(
                vec![ReadCall::new(distributor, IRewardsDistributor::claimableCall { tokenId: nft })],
                ReadMode::Lenient,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Rebase read failed: {}", e);
                return None;
            }
        };

        match results.first().and_then(decode::<IRewardsDistributor::claimableCall>) {
            Some(amount) if !amount.is_zero() => Some(RewardRecord::Distribution {
                nft_id: nft,
                lock_token: self.reward_token.clone(),
                reward: EarnedToken::new(self.reward_token.clone(), amount),
            }),
            Some(_) => None,
            None => {
                warn!("Rebase read failed for #{}", nft);
                None
            }
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Bribe, Gauge};
    use crate::testing::{ether, MockChain};
    use std::sync::Arc;

    const ACCOUNT: Address = Address::ZERO;

    fn velo() -> TokenInfo {
        TokenInfo::new(Address::repeat_byte(0x70), "VELO", 18)
    }

    fn distributor() -> Address {
        Address::repeat_byte(0xd1)
    }

    fn token(byte: u8, symbol: &str) -> TokenInfo {
        TokenInfo::new(Address::repeat_byte(byte), symbol, 18)
    }

    /// Position `n` with gauge 0x6n and bribe 0x8n paying WETH and USDC
    fn position(n: u8) -> Position {
        Position {
            address: Address::repeat_byte(0x50 + n),
            symbol: format!("PAIR-{}", n),
            decimals: 18,
            stable: false,
            token0: token(0x10, "WETH"),
            token1: token(0x11, "USDC"),
            reserve0: ether(1),
            reserve1: ether(1),
            total_supply: ether(1),
            balance: U256::ZERO,
            gauge: Some(Gauge {
                address: Address::repeat_byte(0x60 + n),
                bribe: Some(Address::repeat_byte(0x80 + n)),
                balance: ether(1),
                total_supply: ether(10),
                weight: U256::ZERO,
                bribes: vec![
                    Bribe { token: token(0x10, "WETH"), reward_rate: U256::from(1) },
                    Bribe { token: token(0x11, "USDC"), reward_rate: U256::from(1) },
                ],
                reward_earned: U256::ZERO,
            }),
        }
    }

    fn gauge_of(p: &Position) -> Address {
        p.gauge.as_ref().unwrap().address
    }

    fn bribe_of(p: &Position) -> Address {
        p.gauge.as_ref().unwrap().bribe.unwrap()
    }

    fn set_emissions(mock: &MockChain, p: &Position, amount: U256) {
        mock.on_read(
            gauge_of(p),
            IGauge::earnedCall { token: velo().address, account: ACCOUNT },
            amount,
        );
    }

    fn set_bribe(mock: &MockChain, p: &Position, token: u8, nft: u64, amount: U256) {
        mock.on_read(
            bribe_of(p),
            IBribe::earnedCall { token: Address::repeat_byte(token), tokenId: U256::from(nft) },
            amount,
        );
    }

    fn aggregator(mock: &Arc<MockChain>, distributor: Option<Address>) -> RewardAggregator {
        RewardAggregator::new(MulticallReader::new(mock.client(), 3, 2), velo(), distributor)
    }

    fn all_positive(records: &[RewardRecord]) -> bool {
        records
            .iter()
            .all(|r| !r.earned().is_empty() && r.earned().iter().all(|e| e.earned > U256::ZERO))
    }

    #[tokio::test]
    async fn test_zero_amounts_never_included() {
        let mock = MockChain::new(ACCOUNT);
        let positions: Vec<Position> = (1..=4).map(position).collect();
        for (i, p) in positions.iter().enumerate() {
            set_emissions(&mock, p, if i % 2 == 0 { U256::ZERO } else { ether(i as u64) });
            set_bribe(&mock, p, 0x10, 9, if i < 2 { U256::ZERO } else { ether(1) });
            set_bribe(&mock, p, 0x11, 9, U256::ZERO);
        }
        mock.on_read(distributor(), IRewardsDistributor::claimableCall { tokenId: U256::from(9) }, U256::ZERO);

        let records = aggregator(&mock, Some(distributor()))
            .aggregate(RewardQuery {
                account: ACCOUNT,
                nft_id: Some(U256::from(9)),
                positions: &positions,
                secondary: &[],
            })
            .await;

        assert!(all_positive(&records));
        let bribes = records.iter().filter(|r| r.kind() == RewardKind::Bribe).count();
        let gauges = records.iter().filter(|r| r.kind() == RewardKind::Gauge).count();
        assert_eq!((bribes, gauges), (2, 2));
        assert!(!records.iter().any(|r| r.kind() == RewardKind::Distribution));

        // a bribe record keeps only its positive tokens
        match &records[0] {
            RewardRecord::Bribe { rewards, .. } => {
                assert_eq!(rewards.len(), 1);
                assert_eq!(rewards[0].token.symbol, "WETH");
                assert_eq!(rewards[0].display, "1");
            }
            other => panic!("expected bribe first, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nft_zero_only_reads_emissions() {
        let mock = MockChain::new(ACCOUNT);
        let p = position(1);
        set_emissions(&mock, &p, ether(2));
        set_bribe(&mock, &p, 0x10, 0, ether(5));
        mock.on_read(distributor(), IRewardsDistributor::claimableCall { tokenId: U256::ZERO }, ether(5));

        for nft_id in [Some(U256::ZERO), None] {
            let records = aggregator(&mock, Some(distributor()))
                .aggregate(RewardQuery {
                    account: ACCOUNT,
                    nft_id,
                    positions: std::slice::from_ref(&p),
                    secondary: &[],
                })
                .await;

            assert_eq!(records.len(), 1);
            assert_eq!(records[0].kind(), RewardKind::Gauge);
        }
    }

    #[tokio::test]
    async fn test_failed_position_is_omitted_not_fatal() {
        let mock = MockChain::new(ACCOUNT);
        let positions: Vec<Position> = (1..=3).map(position).collect();
        set_emissions(&mock, &positions[0], ether(1));
        // positions[1] has no registered read -> call fails
        set_emissions(&mock, &positions[2], ether(3));

        let records = aggregator(&mock, None)
            .gauge_rewards(ACCOUNT, &positions, RewardProgram::Primary)
            .await;

        let pairs: Vec<Address> = records
            .iter()
            .map(|r| match r {
                RewardRecord::Gauge { pair, .. } => *pair,
                _ => Address::ZERO,
            })
            .collect();
        assert_eq!(pairs, vec![positions[0].address, positions[2].address]);
    }

    #[tokio::test]
    async fn test_transport_failure_yields_empty_categories() {
        let mock = MockChain::new(ACCOUNT);
        mock.fail_aggregates(true);
        let positions = vec![position(1)];

        let records = aggregator(&mock, Some(distributor()))
            .aggregate(RewardQuery {
                account: ACCOUNT,
                nft_id: Some(U256::from(9)),
                positions: &positions,
                secondary: &positions,
            })
            .await;

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_category_order() {
        let mock = MockChain::new(ACCOUNT);
        let primary = position(1);
        let mut secondary = position(2);
        secondary.gauge.as_mut().unwrap().bribe = None;

        set_emissions(&mock, &primary, ether(1));
        set_emissions(&mock, &secondary, ether(2));
        set_bribe(&mock, &primary, 0x11, 4, ether(3));
        mock.on_read(distributor(), IRewardsDistributor::claimableCall { tokenId: U256::from(4) }, ether(4));

        let records = aggregator(&mock, Some(distributor()))
            .aggregate(RewardQuery {
                account: ACCOUNT,
                nft_id: Some(U256::from(4)),
                positions: std::slice::from_ref(&primary),
                secondary: std::slice::from_ref(&secondary),
            })
            .await;

        assert_eq!(records.len(), 4);
        assert!(matches!(records[0], RewardRecord::Gauge { program: RewardProgram::Secondary, .. }));
        assert!(matches!(records[1], RewardRecord::Bribe { .. }));
        assert!(matches!(records[2], RewardRecord::Gauge { program: RewardProgram::Primary, .. }));
        assert!(matches!(
            &records[3],
            RewardRecord::Distribution { nft_id, reward, .. } if *nft_id == U256::from(4) && reward.earned == ether(4)
        ));
    }

    #[tokio::test]
    async fn test_secondary_program_pays_its_own_token() {
        let mock = MockChain::new(ACCOUNT);
        let op = token(0x0b, "OP");
        let primary = position(1);
        let secondary = position(2);
        set_emissions(&mock, &primary, ether(1));
        // governance-token earnings on the secondary gauge are not read
        set_emissions(&mock, &secondary, ether(5));
        mock.on_read(
            gauge_of(&secondary),
            IGauge::earnedCall { token: op.address, account: ACCOUNT },
            ether(2),
        );

        let records = aggregator(&mock, None)
            .with_secondary_token(op.clone())
            .aggregate(RewardQuery {
                account: ACCOUNT,
                nft_id: None,
                positions: std::slice::from_ref(&primary),
                secondary: std::slice::from_ref(&secondary),
            })
            .await;

        assert_eq!(records.len(), 2);
        assert!(matches!(
            &records[0],
            RewardRecord::Gauge { program: RewardProgram::Secondary, reward, .. }
                if reward.token == op && reward.earned == ether(2)
        ));
        assert!(matches!(
            &records[1],
            RewardRecord::Gauge { program: RewardProgram::Primary, reward, .. }
                if reward.token == velo() && reward.earned == ether(1)
        ));
    }

    #[tokio::test]
    async fn test_no_distributor_skips_rebase() {
        let mock = MockChain::new(ACCOUNT);
        assert!(aggregator(&mock, None).distribution_reward(U256::from(4)).await.is_none());
        assert_eq!(mock.aggregate_count(), 0);
    }

    #[test]
    fn test_record_serializes_with_type_tag() {
        let record = RewardRecord::Distribution {
            nft_id: U256::from(1),
            lock_token: velo(),
            reward: EarnedToken::new(velo(), ether(1)),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "distribution");
        assert_eq!(json["reward"]["display"], "1");
    }
}
