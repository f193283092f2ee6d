//! Workflow construction, one constructor per user action
//!
//! Conditional steps (approvals, bribe claims, vote resets) are decided here
//! from reads made before the workflow starts, so the step list only holds
//! what the current position actually needs.

use alloy_primitives::{Address, U256};
use tracing::debug;

use super::{AmountSource, StepAction, Workflow};
use crate::api::Quote;
use crate::chain::abi::{IGauge, IRewardsDistributor, IRouter, IVoter, IVotingEscrow};
use crate::chain::{Allowance, WriteCall};
use crate::config::{Contracts, CoreContracts};
use crate::errors::{ConfigError, ValidationError};
use crate::rewards::{RewardProgram, RewardRecord};
use crate::state::{Position, RefreshScope, VeNft};
use crate::tokens::TokenInfo;

const BPS: u64 = 10_000;

/// Router write parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSettings {
    pub slippage_bps: u32,
    pub deadline_secs: u64,
}

/// One pair and its share of a vote, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteAllocation {
    pub pair: Address,
    pub percent: f64,
}

/// Percentages → basis points summing to exactly 10000.
/// The rounding remainder goes to the last entry.
pub fn vote_weights(allocations: &[VoteAllocation]) -> Result<(Vec<Address>, Vec<U256>), ValidationError> {
    if allocations.is_empty() {
        return Err(ValidationError::VoteWeights("no pairs selected".to_string()));
    }

    let mut pairs = Vec::with_capacity(allocations.len());
    for a in allocations {
        if !a.percent.is_finite() || a.percent <= 0.0 {
            return Err(ValidationError::VoteWeights(format!(
                "weight for {} must be a positive percentage",
                a.pair
            )));
        }
        if pairs.contains(&a.pair) {
            return Err(ValidationError::VoteWeights(format!("{} listed twice", a.pair)));
        }
        pairs.push(a.pair);
    }

    let total: f64 = allocations.iter().map(|a| a.percent).sum();
    if (total - 100.0).abs() > 1e-6 {
        return Err(ValidationError::VoteWeights(format!(
            "weights sum to {}%, expected 100%",
            total
        )));
    }

    let mut weights = Vec::with_capacity(allocations.len());
    let mut assigned = 0u64;
    for a in &allocations[..allocations.len() - 1] {
        let bps = (a.percent * 100.0).round() as u64;
        if bps == 0 {
            return Err(ValidationError::VoteWeights(format!(
                "weight for {} rounds to zero",
                a.pair
            )));
        }
        assigned += bps;
        weights.push(bps);
    }
    if assigned >= BPS {
        return Err(ValidationError::VoteWeights(
            "last pair rounds to a zero weight".to_string(),
        ));
    }
    weights.push(BPS - assigned);

    Ok((pairs, weights.into_iter().map(U256::from).collect()))
}

pub struct WorkflowBuilder {
    contracts: CoreContracts,
    account: Address,
    settings: TxSettings,
    now: u64,
}

impl WorkflowBuilder {
    pub fn new(contracts: CoreContracts, account: Address, settings: TxSettings) -> Self {
        Self {
            contracts,
            account,
            settings,
            now: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Pin "now" (deadlines are computed from it)
    pub fn at(mut self, now: u64) -> Self {
        self.now = now;
        self
    }

    fn deadline(&self) -> U256 {
        U256::from(self.now + self.settings.deadline_secs)
    }

    fn min_amount(&self, amount: U256) -> U256 {
        let keep = BPS.saturating_sub(self.settings.slippage_bps as u64);
        amount * U256::from(keep) / U256::from(BPS)
    }

    /// Approval step unless the pre-read allowance already covers `amount`
    fn approve(&self, wf: &mut Workflow, token: &TokenInfo, spender: Address, label: &str, amount: U256, allowance: &Allowance) {
        if allowance.covers(amount) {
            debug!("{} allowance for {} sufficient, no approval step", token.symbol, label);
            return;
        }
        wf.push(
            format!("Approve {} for {}", token.symbol, label),
            StepAction::EnsureAllowance {
                token: token.clone(),
                spender,
                amount: AmountSource::Exact(amount),
            },
        );
    }

    fn gauge_of(position: &Position) -> Result<Address, ValidationError> {
        position
            .gauge
            .as_ref()
            .map(|g| g.address)
            .ok_or(ValidationError::NoGauge(position.address))
    }

    // ========== Liquidity ==========

    fn add_liquidity(&self, wf: &mut Workflow, position: &Position, amount0: U256, amount1: U256, allowances: [&Allowance; 2]) {
        let router = self.contracts.router;
        self.approve(wf, &position.token0, router, "router", amount0, allowances[0]);
        self.approve(wf, &position.token1, router, "router", amount1, allowances[1]);
        wf.write(
            format!("Deposit {} and {}", position.token0.symbol, position.token1.symbol),
            WriteCall::new(
                router,
                IRouter::addLiquidityCall {
                    tokenA: position.token0.address,
                    tokenB: position.token1.address,
                    stable: position.stable,
                    amountADesired: amount0,
                    amountBDesired: amount1,
                    amountAMin: self.min_amount(amount0),
                    amountBMin: self.min_amount(amount1),
                    to: self.account,
                    deadline: self.deadline(),
                },
            ),
        );
    }

    /// [approve token0], [approve token1], add liquidity
    pub fn deposit(&self, position: &Position, amount0: U256, amount1: U256, allowances: [&Allowance; 2]) -> Workflow {
        let mut wf = Workflow::new(
            format!("Deposit into {}", position.symbol),
            "Deposit",
            RefreshScope::POSITIONS | RefreshScope::BASE_ASSETS,
        );
        self.add_liquidity(&mut wf, position, amount0, amount1, allowances);
        wf
    }

    /// Deposit steps, then stake whatever LP balance the deposit left
    pub fn deposit_and_stake(
        &self,
        position: &Position,
        amount0: U256,
        amount1: U256,
        allowances: [&Allowance; 2],
    ) -> Result<Workflow, ValidationError> {
        let gauge = Self::gauge_of(position)?;
        let mut wf = Workflow::new(
            format!("Deposit and stake {}", position.symbol),
            "Deposit",
            RefreshScope::POSITIONS | RefreshScope::BASE_ASSETS,
        );
        self.add_liquidity(&mut wf, position, amount0, amount1, allowances);

        // LP amount is only known once the deposit confirms
        wf.push(
            format!("Approve {} for gauge", position.symbol),
            StepAction::EnsureAllowance {
                token: position.lp_token(),
                spender: gauge,
                amount: AmountSource::FullBalance,
            },
        );
        wf.push(
            format!("Stake {} in gauge", position.symbol),
            StepAction::StakeBalance {
                lp: position.address,
                gauge,
            },
        );
        Ok(wf)
    }

    /// [approve LP to gauge], stake
    pub fn stake(&self, position: &Position, amount: U256, allowance: &Allowance) -> Result<Workflow, ValidationError> {
        let gauge = Self::gauge_of(position)?;
        let mut wf = Workflow::new(format!("Stake {}", position.symbol), "Stake", RefreshScope::POSITIONS);
        self.approve(&mut wf, &position.lp_token(), gauge, "gauge", amount, allowance);
        wf.write(
            format!("Stake {} {}", position.lp_token().format(amount), position.symbol),
            WriteCall::new(
                gauge,
                IGauge::depositCall {
                    amount,
                    tokenId: U256::ZERO,
                },
            ),
        );
        Ok(wf)
    }

    pub fn unstake(&self, position: &Position, amount: U256) -> Result<Workflow, ValidationError> {
        let gauge = Self::gauge_of(position)?;
        let mut wf = Workflow::new(format!("Unstake {}", position.symbol), "Unstake", RefreshScope::POSITIONS);
        wf.write(
            format!("Unstake {} {}", position.lp_token().format(amount), position.symbol),
            WriteCall::new(gauge, IGauge::withdrawCall { amount }),
        );
        Ok(wf)
    }

    /// [unstake `from_gauge`], [approve LP to router], remove `liquidity`
    pub fn remove_liquidity(
        &self,
        position: &Position,
        liquidity: U256,
        from_gauge: U256,
        lp_allowance: &Allowance,
    ) -> Result<Workflow, ValidationError> {
        let mut wf = Workflow::new(
            format!("Withdraw from {}", position.symbol),
            "Withdraw",
            RefreshScope::POSITIONS | RefreshScope::BASE_ASSETS,
        );

        if !from_gauge.is_zero() {
            let gauge = Self::gauge_of(position)?;
            wf.write(
                format!("Unstake {} {}", position.lp_token().format(from_gauge), position.symbol),
                WriteCall::new(gauge, IGauge::withdrawCall { amount: from_gauge }),
            );
        }

        let router = self.contracts.router;
        self.approve(&mut wf, &position.lp_token(), router, "router", liquidity, lp_allowance);

        let (expected0, expected1) = position.underlying(liquidity);
        wf.write(
            format!("Withdraw {} and {}", position.token0.symbol, position.token1.symbol),
            WriteCall::new(
                router,
                IRouter::removeLiquidityCall {
                    tokenA: position.token0.address,
                    tokenB: position.token1.address,
                    stable: position.stable,
                    liquidity,
                    amountAMin: self.min_amount(expected0),
                    amountBMin: self.min_amount(expected1),
                    to: self.account,
                    deadline: self.deadline(),
                },
            ),
        );
        Ok(wf)
    }

    // ========== Swap ==========

    /// [approve input token], swap along the quoted route
    pub fn swap(&self, from: &TokenInfo, to: &TokenInfo, quote: &Quote, allowance: &Allowance) -> Result<Workflow, ValidationError> {
        quote.validate(from.address, to.address)?;

        let mut wf = Workflow::new(
            format!("Swap {} for {}", from.symbol, to.symbol),
            "Swap",
            RefreshScope::BASE_ASSETS,
        );
        let router = self.contracts.router;
        self.approve(&mut wf, from, router, "router", quote.amount_in, allowance);

        let routes = quote
            .routes
            .iter()
            .map(|leg| IRouter::Route {
                from: leg.from,
                to: leg.to,
                stable: leg.stable,
            })
            .collect();
        wf.write(
            format!("Swap {} {} for {}", from.format(quote.amount_in), from.symbol, to.symbol),
            WriteCall::new(
                router,
                IRouter::swapExactTokensForTokensCall {
                    amountIn: quote.amount_in,
                    amountOutMin: self.min_amount(quote.amount_out),
                    routes,
                    to: self.account,
                    deadline: self.deadline(),
                },
            ),
        );
        Ok(wf)
    }

    // ========== Vote escrow ==========

    pub fn create_lock(&self, token: &TokenInfo, amount: U256, duration_secs: u64, allowance: &Allowance) -> Workflow {
        let mut wf = Workflow::new(
            format!("Lock {}", token.symbol),
            "Lock",
            RefreshScope::VE_NFTS | RefreshScope::BASE_ASSETS,
        );
        let ve = self.contracts.voting_escrow;
        self.approve(&mut wf, token, ve, "vote-escrow", amount, allowance);
        wf.write(
            format!("Lock {} {}", token.format(amount), token.symbol),
            WriteCall::new(
                ve,
                IVotingEscrow::create_lockCall {
                    value: amount,
                    lockDuration: U256::from(duration_secs),
                },
            ),
        );
        wf
    }

    pub fn increase_amount(&self, token: &TokenInfo, nft: U256, amount: U256, allowance: &Allowance) -> Workflow {
        let mut wf = Workflow::new(
            format!("Increase lock #{}", nft),
            "Increase",
            RefreshScope::VE_NFTS | RefreshScope::BASE_ASSETS,
        );
        let ve = self.contracts.voting_escrow;
        self.approve(&mut wf, token, ve, "vote-escrow", amount, allowance);
        wf.write(
            format!("Add {} {} to #{}", token.format(amount), token.symbol, nft),
            WriteCall::new(
                ve,
                IVotingEscrow::increase_amountCall {
                    tokenId: nft,
                    value: amount,
                },
            ),
        );
        wf
    }

    pub fn increase_duration(&self, nft: U256, duration_secs: u64) -> Workflow {
        let mut wf = Workflow::new(format!("Extend lock #{}", nft), "Extend", RefreshScope::VE_NFTS);
        wf.write(
            format!("Extend #{} by {} days", nft, duration_secs / 86_400),
            WriteCall::new(
                self.contracts.voting_escrow,
                IVotingEscrow::increase_unlock_timeCall {
                    tokenId: nft,
                    lockDuration: U256::from(duration_secs),
                },
            ),
        );
        wf
    }

    /// [claim bribes], [reset], withdraw
    pub fn withdraw_lock(&self, nft: &VeNft, rewards: &[RewardRecord]) -> Workflow {
        let mut wf = Workflow::new(
            format!("Withdraw lock #{}", nft.id),
            "Withdraw",
            RefreshScope::VE_NFTS | RefreshScope::BASE_ASSETS | RefreshScope::REWARDS,
        );
        self.claim_bribes_step(&mut wf, nft.id, rewards);
        if nft.voted {
            self.reset_step(&mut wf, nft.id);
        }
        wf.write(
            format!("Withdraw #{}", nft.id),
            WriteCall::new(self.contracts.voting_escrow, IVotingEscrow::withdrawCall { tokenId: nft.id }),
        );
        wf
    }

    /// [reset source], merge
    pub fn merge(&self, from: &VeNft, to: U256) -> Result<Workflow, ValidationError> {
        if from.id == to {
            return Err(ValidationError::SelfMerge(to));
        }
        let mut wf = Workflow::new(
            format!("Merge #{} into #{}", from.id, to),
            "Merge",
            RefreshScope::VE_NFTS | RefreshScope::REWARDS,
        );
        if from.voted {
            self.reset_step(&mut wf, from.id);
        }
        wf.write(
            format!("Merge #{} into #{}", from.id, to),
            WriteCall::new(
                self.contracts.voting_escrow,
                IVotingEscrow::mergeCall { from: from.id, to },
            ),
        );
        Ok(wf)
    }

    // ========== Voting ==========

    /// [claim bribes], vote
    pub fn vote(&self, nft: U256, allocations: &[VoteAllocation], rewards: &[RewardRecord]) -> Result<Workflow, ValidationError> {
        let (pools, weights) = vote_weights(allocations)?;

        let mut wf = Workflow::new(
            format!("Vote with #{}", nft),
            "Vote",
            RefreshScope::VE_NFTS | RefreshScope::REWARDS,
        );
        self.claim_bribes_step(&mut wf, nft, rewards);
        // claimed bribes land in the wallet
        if !wf.is_empty() {
            wf.refresh = wf.refresh | RefreshScope::BASE_ASSETS;
        }
        wf.write(
            format!("Cast votes for {} pair(s)", pools.len()),
            WriteCall::new(
                self.contracts.voter,
                IVoter::voteCall {
                    tokenId: nft,
                    pools,
                    weights,
                },
            ),
        );
        Ok(wf)
    }

    pub fn reset(&self, nft: U256) -> Workflow {
        let mut wf = Workflow::new(format!("Reset votes of #{}", nft), "Reset", RefreshScope::VE_NFTS);
        self.reset_step(&mut wf, nft);
        wf
    }

    fn reset_step(&self, wf: &mut Workflow, nft: U256) {
        wf.write(
            format!("Reset votes of #{}", nft),
            WriteCall::new(self.contracts.voter, IVoter::resetCall { tokenId: nft }),
        );
    }

    // ========== Claims ==========

    /// One `claimBribes` over every bribe record of `nft`; nothing if none
    fn claim_bribes_step(&self, wf: &mut Workflow, nft: U256, rewards: &[RewardRecord]) {
        let mut bribes = Vec::new();
        let mut tokens = Vec::new();
        for record in rewards {
            if let RewardRecord::Bribe {
                bribe,
                nft_id,
                rewards,
                ..
            } = record
            {
                if *nft_id == nft {
                    bribes.push(*bribe);
                    tokens.push(rewards.iter().map(|r| r.token.address).collect::<Vec<_>>());
                }
            }
        }
        if bribes.is_empty() {
            return;
        }
        wf.write(
            format!("Claim bribes from {} pair(s)", bribes.len()),
            WriteCall::new(
                self.contracts.voter,
                IVoter::claimBribesCall {
                    bribes,
                    tokens,
                    tokenId: nft,
                },
            ),
        );
    }

    /// `claimRewards` on `voter` for every gauge record of `program`
    fn claim_gauges_step(&self, wf: &mut Workflow, voter: Address, program: RewardProgram, rewards: &[RewardRecord]) {
        let mut gauges = Vec::new();
        let mut tokens = Vec::new();
        for record in rewards {
            if let RewardRecord::Gauge {
                gauge,
                program: p,
                reward,
                ..
            } = record
            {
                if *p == program {
                    gauges.push(*gauge);
                    tokens.push(vec![reward.token.address]);
                }
            }
        }
        if gauges.is_empty() {
            return;
        }
        let label = match program {
            RewardProgram::Primary => "gauge",
            RewardProgram::Secondary => "secondary gauge",
        };
        wf.write(
            format!("Claim {} rewards from {} pair(s)", label, gauges.len()),
            WriteCall::new(voter, IVoter::claimRewardsCall { gauges, tokens }),
        );
    }

    /// Claim a single record
    pub fn claim(&self, record: &RewardRecord, optional: &Contracts) -> Result<Workflow, ConfigError> {
        let wf = match record {
            RewardRecord::Bribe { symbol, nft_id, .. } => {
                let mut wf = Workflow::new(
                    format!("Claim {} bribes", symbol),
                    "Claim",
                    RefreshScope::REWARDS | RefreshScope::BASE_ASSETS,
                );
                self.claim_bribes_step(&mut wf, *nft_id, std::slice::from_ref(record));
                wf
            }
            RewardRecord::Gauge {
                symbol, gauge, reward, ..
            } => {
                let mut wf = Workflow::new(
                    format!("Claim {} rewards", symbol),
                    "Claim",
                    RefreshScope::REWARDS | RefreshScope::BASE_ASSETS,
                );
                wf.write(
                    format!("Claim {} {}", reward.display, reward.token.symbol),
                    WriteCall::new(
                        *gauge,
                        IGauge::getRewardCall {
                            account: self.account,
                            tokens: vec![reward.token.address],
                        },
                    ),
                );
                wf
            }
            RewardRecord::Distribution { nft_id, reward, .. } => {
                let distributor = optional.require_distributor()?;
                let mut wf = Workflow::new(
                    format!("Claim rebase for #{}", nft_id),
                    "Claim",
                    RefreshScope::REWARDS | RefreshScope::VE_NFTS,
                );
                wf.write(
                    format!("Claim {} {} rebase", reward.display, reward.token.symbol),
                    WriteCall::new(distributor, IRewardsDistributor::claimCall { tokenId: *nft_id }),
                );
                wf
            }
        };
        Ok(wf)
    }

    /// One claim step per non-empty category, in aggregation order
    pub fn claim_all(
        &self,
        rewards: &[RewardRecord],
        optional: &Contracts,
    ) -> Result<Workflow, ConfigError> {
        let mut wf = Workflow::new(
            "Claim all rewards",
            "Claim",
            RefreshScope::REWARDS | RefreshScope::BASE_ASSETS | RefreshScope::VE_NFTS,
        );

        let has_secondary = rewards.iter().any(|r| {
            matches!(
                r,
                RewardRecord::Gauge {
                    program: RewardProgram::Secondary,
                    ..
                }
            )
        });
        if has_secondary {
            let voter = optional.require_secondary_voter()?;
            self.claim_gauges_step(&mut wf, voter, RewardProgram::Secondary, rewards);
        }

        let mut nfts: Vec<U256> = Vec::new();
        for record in rewards {
            if let RewardRecord::Bribe { nft_id, .. } = record {
                if !nfts.contains(nft_id) {
                    nfts.push(*nft_id);
                }
            }
        }
        for nft in nfts {
            self.claim_bribes_step(&mut wf, nft, rewards);
        }

        self.claim_gauges_step(&mut wf, self.contracts.voter, RewardProgram::Primary, rewards);

        for record in rewards {
            if let RewardRecord::Distribution { nft_id, reward, .. } = record {
                let distributor = optional.require_distributor()?;
                wf.write(
                    format!("Claim {} {} rebase for #{}", reward.display, reward.token.symbol, nft_id),
                    WriteCall::new(distributor, IRewardsDistributor::claimCall { tokenId: *nft_id }),
                );
            }
        }

        Ok(wf)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RouteLeg;
    use crate::rewards::EarnedToken;
    use crate::state::Gauge;
    use crate::testing::ether;

    fn contracts() -> CoreContracts {
        CoreContracts {
            router: Address::repeat_byte(0xa1),
            voter: Address::repeat_byte(0xa2),
            voting_escrow: Address::repeat_byte(0xa3),
        }
    }

    fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new(
            contracts(),
            Address::repeat_byte(1),
            TxSettings {
                slippage_bps: 50,
                deadline_secs: 1_800,
            },
        )
        .at(1_700_000_000)
    }

    fn token(byte: u8, symbol: &str) -> TokenInfo {
        TokenInfo::new(Address::repeat_byte(byte), symbol, 18)
    }

    fn position(with_gauge: bool) -> Position {
        Position {
            address: Address::repeat_byte(0x50),
            symbol: "vAMM-WETH/USDC".to_string(),
            decimals: 18,
            stable: false,
            token0: token(0x10, "WETH"),
            token1: token(0x11, "USDC"),
            reserve0: ether(100),
            reserve1: ether(200),
            total_supply: ether(10),
            balance: ether(1),
            gauge: with_gauge.then(|| Gauge {
                address: Address::repeat_byte(0x60),
                bribe: Some(Address::repeat_byte(0x61)),
                balance: ether(2),
                total_supply: ether(5),
                weight: U256::ZERO,
                bribes: Vec::new(),
                reward_earned: U256::ZERO,
            }),
        }
    }

    fn nft(id: u64, voted: bool) -> VeNft {
        VeNft {
            id: U256::from(id),
            locked: ether(100),
            lock_end: 1_600_000_000,
            voting_power: U256::ZERO,
            voted,
        }
    }

    fn earned(symbol: &str, byte: u8, amount: u64) -> EarnedToken {
        EarnedToken::new(token(byte, symbol), ether(amount))
    }

    fn bribe_record(nft_id: u64) -> RewardRecord {
        RewardRecord::Bribe {
            pair: Address::repeat_byte(0x50),
            symbol: "vAMM-WETH/USDC".to_string(),
            gauge: Address::repeat_byte(0x60),
            bribe: Address::repeat_byte(0x61),
            nft_id: U256::from(nft_id),
            rewards: vec![earned("WETH", 0x10, 1), earned("USDC", 0x11, 2)],
        }
    }

    fn gauge_record(program: RewardProgram) -> RewardRecord {
        RewardRecord::Gauge {
            pair: Address::repeat_byte(0x50),
            symbol: "vAMM-WETH/USDC".to_string(),
            gauge: Address::repeat_byte(0x60),
            program,
            reward: earned("VELO", 0x70, 3),
        }
    }

    fn known(raw: U256) -> Allowance {
        Allowance::known(raw, 18)
    }

    // ========== vote weights ==========

    #[test]
    fn test_vote_weights_sixty_forty() {
        let (pools, weights) = vote_weights(&[
            VoteAllocation { pair: Address::repeat_byte(1), percent: 60.0 },
            VoteAllocation { pair: Address::repeat_byte(2), percent: 40.0 },
        ])
        .unwrap();

        assert_eq!(pools, vec![Address::repeat_byte(1), Address::repeat_byte(2)]);
        assert_eq!(weights, vec![U256::from(6000), U256::from(4000)]);
    }

    #[test]
    fn test_vote_weights_remainder_goes_to_last() {
        let third = 100.0 / 3.0;
        let (_, weights) = vote_weights(&[
            VoteAllocation { pair: Address::repeat_byte(1), percent: third },
            VoteAllocation { pair: Address::repeat_byte(2), percent: third },
            VoteAllocation { pair: Address::repeat_byte(3), percent: third },
        ])
        .unwrap();

        assert_eq!(weights, vec![U256::from(3333), U256::from(3333), U256::from(3334)]);
        assert_eq!(weights.iter().fold(U256::ZERO, |a, w| a + *w), U256::from(10_000));
    }

    #[test]
    fn test_vote_weights_rejects_bad_input() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        assert!(vote_weights(&[]).is_err());
        assert!(vote_weights(&[VoteAllocation { pair: a, percent: 90.0 }]).is_err());
        assert!(vote_weights(&[
            VoteAllocation { pair: a, percent: 50.0 },
            VoteAllocation { pair: a, percent: 50.0 },
        ])
        .is_err());
        assert!(vote_weights(&[
            VoteAllocation { pair: a, percent: 110.0 },
            VoteAllocation { pair: b, percent: -10.0 },
        ])
        .is_err());
    }

    #[test]
    fn test_vote_weights_rejects_share_below_one_bps() {
        let err = vote_weights(&[
            VoteAllocation { pair: Address::repeat_byte(1), percent: 0.004 },
            VoteAllocation { pair: Address::repeat_byte(2), percent: 99.996 },
        ])
        .unwrap_err();
        assert!(matches!(err, ValidationError::VoteWeights(ref m) if m.contains("rounds to zero")));

        let (_, weights) = vote_weights(&[
            VoteAllocation { pair: Address::repeat_byte(1), percent: 0.01 },
            VoteAllocation { pair: Address::repeat_byte(2), percent: 99.99 },
        ])
        .unwrap();
        assert_eq!(weights, vec![U256::from(1), U256::from(9_999)]);
    }

    // ========== composite workflows ==========

    #[test]
    fn test_vote_without_bribes_is_single_step() {
        let wf = builder()
            .vote(
                U256::from(7),
                &[
                    VoteAllocation { pair: Address::repeat_byte(1), percent: 60.0 },
                    VoteAllocation { pair: Address::repeat_byte(2), percent: 40.0 },
                ],
                &[],
            )
            .unwrap();

        assert_eq!(wf.len(), 1);
        assert_eq!(wf.refresh, RefreshScope::VE_NFTS | RefreshScope::REWARDS);
        let vote = wf.calls()[0].decode_as::<IVoter::voteCall>().unwrap();
        assert_eq!(vote.tokenId, U256::from(7));
        assert_eq!(vote.pools.len(), 2);
        assert_eq!(vote.weights, vec![U256::from(6000), U256::from(4000)]);
    }

    #[test]
    fn test_vote_claims_outstanding_bribes_first() {
        let wf = builder()
            .vote(
                U256::from(7),
                &[VoteAllocation { pair: Address::repeat_byte(1), percent: 100.0 }],
                &[bribe_record(7), bribe_record(8), gauge_record(RewardProgram::Primary)],
            )
            .unwrap();

        assert_eq!(wf.len(), 2);
        assert!(wf.refresh.base_assets);
        assert!(wf.refresh.ve_nfts && wf.refresh.rewards);
        let claim = wf.calls()[0].decode_as::<IVoter::claimBribesCall>().unwrap();
        assert_eq!(claim.tokenId, U256::from(7));
        assert_eq!(claim.bribes, vec![Address::repeat_byte(0x61)]);
        assert_eq!(claim.tokens, vec![vec![Address::repeat_byte(0x10), Address::repeat_byte(0x11)]]);
        assert!(wf.calls()[1].decode_as::<IVoter::voteCall>().is_some());
    }

    #[test]
    fn test_deposit_approvals_depend_on_allowance() {
        let pos = position(false);
        let zero = known(U256::ZERO);
        let wf = builder().deposit(&pos, ether(1), ether(2), [&zero, &zero]);
        assert_eq!(wf.len(), 3);
        assert!(matches!(wf.steps[0].action, StepAction::EnsureAllowance { ref token, .. } if token.symbol == "WETH"));
        assert!(matches!(wf.steps[1].action, StepAction::EnsureAllowance { ref token, .. } if token.symbol == "USDC"));

        let plenty = known(U256::MAX);
        let wf = builder().deposit(&pos, ether(1), ether(2), [&plenty, &plenty]);
        assert_eq!(wf.len(), 1);
        let add = wf.calls()[0].decode_as::<IRouter::addLiquidityCall>().unwrap();
        assert_eq!(add.amountADesired, ether(1));
        assert_eq!(add.amountAMin, ether(1) * U256::from(9950) / U256::from(10_000));
        assert_eq!(add.deadline, U256::from(1_700_001_800u64));
        assert_eq!(wf.refresh, RefreshScope::POSITIONS | RefreshScope::BASE_ASSETS);
    }

    #[test]
    fn test_unknown_allowance_requests_approval() {
        let pos = position(false);
        let wf = builder().deposit(&pos, ether(1), ether(2), [&Allowance::Unknown, &known(U256::MAX)]);
        assert_eq!(wf.len(), 2);
    }

    #[test]
    fn test_deposit_and_stake_needs_gauge() {
        let zero = known(U256::ZERO);
        assert_eq!(
            builder()
                .deposit_and_stake(&position(false), ether(1), ether(1), [&zero, &zero])
                .unwrap_err(),
            ValidationError::NoGauge(Address::repeat_byte(0x50))
        );

        let wf = builder()
            .deposit_and_stake(&position(true), ether(1), ether(1), [&zero, &zero])
            .unwrap();
        assert_eq!(wf.len(), 5);
        assert!(matches!(
            wf.steps[3].action,
            StepAction::EnsureAllowance { amount: AmountSource::FullBalance, .. }
        ));
        assert!(matches!(wf.steps[4].action, StepAction::StakeBalance { .. }));
    }

    #[test]
    fn test_remove_liquidity_unstakes_first() {
        let pos = position(true);
        let wf = builder()
            .remove_liquidity(&pos, ether(3), ether(2), &known(U256::MAX))
            .unwrap();

        assert_eq!(wf.len(), 2);
        let unstake = wf.calls()[0].decode_as::<IGauge::withdrawCall>().unwrap();
        assert_eq!(unstake.amount, ether(2));
        let remove = wf.calls()[1].decode_as::<IRouter::removeLiquidityCall>().unwrap();
        // 3/10 of reserves, minus 0.5%
        assert_eq!(remove.amountAMin, ether(30) * U256::from(9950) / U256::from(10_000));
        assert_eq!(remove.amountBMin, ether(60) * U256::from(9950) / U256::from(10_000));
    }

    #[test]
    fn test_swap_uses_quoted_route() {
        let weth = token(0x10, "WETH");
        let usdc = token(0x11, "USDC");
        let quote = Quote {
            amount_in: ether(1),
            amount_out: ether(2000),
            routes: vec![RouteLeg { from: weth.address, to: usdc.address, stable: false }],
        };

        let wf = builder().swap(&weth, &usdc, &quote, &known(U256::ZERO)).unwrap();
        assert_eq!(wf.len(), 2);
        let swap = wf.calls()[0].decode_as::<IRouter::swapExactTokensForTokensCall>().unwrap();
        assert_eq!(swap.routes.len(), 1);
        assert_eq!(swap.amountOutMin, ether(2000) * U256::from(9950) / U256::from(10_000));

        let wrong = Quote { routes: Vec::new(), ..quote };
        assert!(builder().swap(&weth, &usdc, &wrong, &known(U256::MAX)).is_err());
    }

    #[test]
    fn test_withdraw_lock_claims_resets_then_withdraws() {
        let wf = builder().withdraw_lock(&nft(7, true), &[bribe_record(7)]);
        assert_eq!(wf.len(), 3);
        assert!(wf.calls()[0].decode_as::<IVoter::claimBribesCall>().is_some());
        assert!(wf.calls()[1].decode_as::<IVoter::resetCall>().is_some());
        assert!(wf.calls()[2].decode_as::<IVotingEscrow::withdrawCall>().is_some());

        let wf = builder().withdraw_lock(&nft(7, false), &[]);
        assert_eq!(wf.len(), 1);
    }

    #[test]
    fn test_merge_resets_voted_source() {
        let wf = builder().merge(&nft(3, true), U256::from(4)).unwrap();
        assert_eq!(wf.len(), 2);
        let merge = wf.calls()[1].decode_as::<IVotingEscrow::mergeCall>().unwrap();
        assert_eq!((merge.from, merge.to), (U256::from(3), U256::from(4)));
        assert_eq!(wf.refresh, RefreshScope::VE_NFTS | RefreshScope::REWARDS);

        assert_eq!(
            builder().merge(&nft(3, false), U256::from(3)).unwrap_err(),
            ValidationError::SelfMerge(U256::from(3))
        );
    }

    #[test]
    fn test_claim_all_orders_categories() {
        let distribution = RewardRecord::Distribution {
            nft_id: U256::from(7),
            lock_token: token(0x70, "VELO"),
            reward: earned("VELO", 0x70, 1),
        };
        let records = vec![
            gauge_record(RewardProgram::Secondary),
            bribe_record(7),
            gauge_record(RewardProgram::Primary),
            distribution,
        ];
        let secondary = Address::repeat_byte(0xb2);
        let distributor = Address::repeat_byte(0xb3);
        let mut optional = Contracts {
            rewards_distributor: Some(distributor),
            secondary_voter: Some(secondary),
            ..Contracts::default()
        };

        let wf = builder().claim_all(&records, &optional).unwrap();

        let targets: Vec<Address> = wf.calls().iter().map(|c| c.to).collect();
        assert_eq!(targets, vec![secondary, contracts().voter, contracts().voter, distributor]);
        assert!(wf.calls()[1].decode_as::<IVoter::claimBribesCall>().is_some());
        assert!(wf.calls()[2].decode_as::<IVoter::claimRewardsCall>().is_some());

        optional.rewards_distributor = None;
        let err = builder().claim_all(&records, &optional).unwrap_err();
        assert_eq!(err, ConfigError::MissingAddress("REWARDS_DISTRIBUTOR_ADDRESS"));

        optional.secondary_voter = None;
        let err = builder().claim_all(&records, &optional).unwrap_err();
        assert_eq!(err, ConfigError::MissingAddress("SECONDARY_VOTER_ADDRESS"));
    }

    #[test]
    fn test_claim_rebase_goes_to_configured_distributor() {
        let record = RewardRecord::Distribution {
            nft_id: U256::from(7),
            lock_token: token(0x70, "VELO"),
            reward: earned("VELO", 0x70, 1),
        };
        assert_eq!(
            builder().claim(&record, &Contracts::default()).unwrap_err(),
            ConfigError::MissingAddress("REWARDS_DISTRIBUTOR_ADDRESS")
        );

        let optional = Contracts {
            rewards_distributor: Some(Address::repeat_byte(0xb3)),
            ..Contracts::default()
        };
        let wf = builder().claim(&record, &optional).unwrap();
        assert_eq!(wf.calls()[0].to, Address::repeat_byte(0xb3));
        let claim = wf.calls()[0].decode_as::<IRewardsDistributor::claimCall>().unwrap();
        assert_eq!(claim.tokenId, U256::from(7));
    }

    #[test]
    fn test_claim_single_gauge_reward() {
        let wf = builder().claim(&gauge_record(RewardProgram::Primary), &Contracts::default()).unwrap();
        assert_eq!(wf.len(), 1);
        let call = wf.calls()[0];
        assert_eq!(call.to, Address::repeat_byte(0x60));
        let reward = call.decode_as::<IGauge::getRewardCall>().unwrap();
        assert_eq!(reward.account, Address::repeat_byte(1));
        assert_eq!(reward.tokens, vec![Address::repeat_byte(0x70)]);
    }
}
