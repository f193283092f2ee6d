//! Action dispatch
//!
//! Every user action is one `Command` variant. `dispatch` validates it
//! against the cached snapshot, does the reads the workflow shape depends on,
//! builds one flat workflow, runs it, then refreshes the affected snapshot
//! fields once. Nothing escapes: failures become exactly one event.

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::api::{PairListing, Quote};
use crate::chain::abi::IVotingEscrow;
use crate::chain::{
    decode, Allowance, AllowanceRequest, AllowanceResolver, ChainClient, MulticallReader,
    ReadCall, ReadMode,
};
use crate::config::Config;
use crate::errors::{ConfigError, ValidationError};
use crate::events::{Event, EventBus};
use crate::rewards::{RewardProgram, RewardRecord};
use crate::sequencer::{Sequencer, TxSettings, VoteAllocation, Workflow, WorkflowBuilder, WorkflowResult};
use crate::state::{AppStore, Position, RefreshScope, Snapshot, SnapshotFetcher, VeNft};
use crate::tokens::TokenInfo;

/// Shortest lock the vote-escrow accepts
pub const WEEK_SECS: u64 = 7 * 86_400;

/// Longest lock the vote-escrow accepts
pub const MAX_LOCK_SECS: u64 = 4 * 365 * 86_400;

// ============================================
// COMMANDS
// ============================================

/// Amounts are the human-decimal strings the user typed. `None` means "all".
#[derive(Debug, Clone)]
pub enum Command {
    Refresh(RefreshScope),
    SelectNft(U256),

    Deposit {
        pair: Address,
        amount0: String,
        amount1: String,
        stake: bool,
    },
    Stake {
        pair: Address,
        amount: Option<String>,
    },
    Unstake {
        pair: Address,
        amount: Option<String>,
    },
    /// LP amount across wallet and gauge; the staked part is unstaked first
    RemoveLiquidity {
        pair: Address,
        amount: Option<String>,
    },
    Swap {
        from: Address,
        to: Address,
        quote: Quote,
    },

    CreateLock {
        amount: String,
        duration_secs: u64,
    },
    IncreaseAmount {
        nft: U256,
        amount: String,
    },
    IncreaseDuration {
        nft: U256,
        duration_secs: u64,
    },
    WithdrawLock {
        nft: U256,
    },
    Merge {
        from: U256,
        to: U256,
    },

    Vote {
        nft: U256,
        allocations: Vec<VoteAllocation>,
    },
    Reset {
        nft: U256,
    },

    ClaimBribes {
        pair: Address,
    },
    ClaimReward {
        pair: Address,
    },
    ClaimDistribution {
        nft: U256,
    },
    ClaimAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Refresh,
    SelectNft,
    Deposit,
    Stake,
    Unstake,
    RemoveLiquidity,
    Swap,
    CreateLock,
    IncreaseAmount,
    IncreaseDuration,
    WithdrawLock,
    Merge,
    Vote,
    Reset,
    ClaimBribes,
    ClaimReward,
    ClaimDistribution,
    ClaimAll,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Refresh(_) => CommandKind::Refresh,
            Command::SelectNft(_) => CommandKind::SelectNft,
            Command::Deposit { .. } => CommandKind::Deposit,
            Command::Stake { .. } => CommandKind::Stake,
            Command::Unstake { .. } => CommandKind::Unstake,
            Command::RemoveLiquidity { .. } => CommandKind::RemoveLiquidity,
            Command::Swap { .. } => CommandKind::Swap,
            Command::CreateLock { .. } => CommandKind::CreateLock,
            Command::IncreaseAmount { .. } => CommandKind::IncreaseAmount,
            Command::IncreaseDuration { .. } => CommandKind::IncreaseDuration,
            Command::WithdrawLock { .. } => CommandKind::WithdrawLock,
            Command::Merge { .. } => CommandKind::Merge,
            Command::Vote { .. } => CommandKind::Vote,
            Command::Reset { .. } => CommandKind::Reset,
            Command::ClaimBribes { .. } => CommandKind::ClaimBribes,
            Command::ClaimReward { .. } => CommandKind::ClaimReward,
            Command::ClaimDistribution { .. } => CommandKind::ClaimDistribution,
            Command::ClaimAll => CommandKind::ClaimAll,
        }
    }
}

/// What became of a dispatched command (already reported on the bus)
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Returned,
    Invalid(ValidationError),
    Failed(String),
}

#[derive(Error, Debug)]
enum DispatchError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Failed(String),
}

// ============================================
// DISPATCHER
// ============================================

pub struct Dispatcher {
    config: Config,
    chain: Arc<dyn ChainClient>,
    reader: MulticallReader,
    allowances: AllowanceResolver,
    sequencer: Sequencer,
    fetcher: SnapshotFetcher,
    bus: EventBus,
}

impl Dispatcher {
    pub fn new(config: Config, chain: Arc<dyn ChainClient>, pairs: Vec<PairListing>, bus: EventBus) -> Self {
        let reader = MulticallReader::new(chain.clone(), config.multicall_chunk_size, config.max_chunks_in_flight);
        let store = AppStore::new(bus.clone());
        let fetcher = SnapshotFetcher::new(reader.clone(), store, &config, chain.account(), pairs);
        let sequencer = Sequencer::new(chain.clone(), reader.clone(), bus.clone(), config.gas_buffer_pct);

        Self {
            allowances: AllowanceResolver::new(reader.clone()),
            config,
            chain,
            reader,
            sequencer,
            fetcher,
            bus,
        }
    }

    pub fn store(&self) -> &AppStore {
        self.fetcher.store()
    }

    /// Run one command to completion. Outcomes are also emitted on the bus.
    pub async fn dispatch(&self, command: Command) -> Outcome {
        let kind = command.kind();
        info!("▶ {:?}", kind);

        match self.handle(command).await {
            Ok(()) => {
                self.bus.emit(Event::Returned(kind));
                Outcome::Returned
            }
            Err(DispatchError::Invalid(e)) => {
                warn!("{:?} rejected: {}", kind, e);
                self.bus.emit(Event::Validation(e.clone()));
                Outcome::Invalid(e)
            }
            Err(e) => {
                let message = e.to_string();
                error!("{:?} failed: {}", kind, message);
                self.bus.emit(Event::Error(message.clone()));
                Outcome::Failed(message)
            }
        }
    }

    async fn handle(&self, command: Command) -> Result<(), DispatchError> {
        match command {
            Command::Refresh(scope) => {
                self.fetcher.refresh(scope).await;
                Ok(())
            }
            Command::SelectNft(id) => {
                let snapshot = self.store().snapshot().await;
                owned_nft(&snapshot, id)?;
                self.fetcher.select_nft(id).await;
                Ok(())
            }
            command => {
                let workflow = self.build(command).await?;
                info!("🧩 {}: {} step(s)", workflow.title, workflow.len());
                self.execute(workflow).await
            }
        }
    }

    async fn execute(&self, workflow: Workflow) -> Result<(), DispatchError> {
        match self.sequencer.run(workflow).await {
            WorkflowResult::Completed { refresh, .. } => {
                if !refresh.is_empty() {
                    self.fetcher.refresh(refresh).await;
                }
                Ok(())
            }
            WorkflowResult::Failed { reason, .. } => Err(DispatchError::Failed(reason)),
        }
    }

    fn builder(&self) -> Result<WorkflowBuilder, ConfigError> {
        Ok(WorkflowBuilder::new(
            self.config.contracts.require()?,
            self.chain.account(),
            TxSettings {
                slippage_bps: self.config.slippage_bps,
                deadline_secs: self.config.deadline_secs,
            },
        ))
    }

    /// Validate, pre-read, and flatten `command` into a workflow
    async fn build(&self, command: Command) -> Result<Workflow, DispatchError> {
        let snapshot = self.store().snapshot().await;
        let builder = self.builder()?;
        let contracts = self.config.contracts.require()?;
        let now = now();

        let workflow = match command {
            Command::Refresh(_) | Command::SelectNft(_) => {
                return Err(DispatchError::Failed("not a workflow command".to_string()))
            }

            // ========== Liquidity ==========
            Command::Deposit {
                pair,
                amount0,
                amount1,
                stake,
            } => {
                let position = known_pair(&snapshot, pair)?;
                let a0 = position.token0.parse("amount0", &amount0)?;
                let a1 = position.token1.parse("amount1", &amount1)?;
                check_balance(&snapshot, &position.token0, a0, "amount0")?;
                check_balance(&snapshot, &position.token1, a1, "amount1")?;
                if stake && position.gauge.is_none() {
                    return Err(ValidationError::NoGauge(pair).into());
                }

                let allowances = self
                    .allowances
                    .allowances(&[
                        self.request(&position.token0, contracts.router),
                        self.request(&position.token1, contracts.router),
                    ])
                    .await;
                let (first, second) = (
                    allowances.first().cloned().unwrap_or(Allowance::Unknown),
                    allowances.get(1).cloned().unwrap_or(Allowance::Unknown),
                );

                if stake {
                    builder.deposit_and_stake(position, a0, a1, [&first, &second])?
                } else {
                    builder.deposit(position, a0, a1, [&first, &second])
                }
            }

            Command::Stake { pair, amount } => {
                let position = known_pair(&snapshot, pair)?;
                let gauge = position
                    .gauge
                    .as_ref()
                    .map(|g| g.address)
                    .ok_or(ValidationError::NoGauge(pair))?;
                let lp = position.lp_token();
                let amount = amount_or(&lp, "amount", amount.as_deref(), position.balance)?;
                within("amount", &lp, amount, position.balance)?;

                let allowance = self.allowances.allowance(self.request(&lp, gauge)).await;
                builder.stake(position, amount, &allowance)?
            }

            Command::Unstake { pair, amount } => {
                let position = known_pair(&snapshot, pair)?;
                if position.gauge.is_none() {
                    return Err(ValidationError::NoGauge(pair).into());
                }
                let lp = position.lp_token();
                let amount = amount_or(&lp, "amount", amount.as_deref(), position.staked())?;
                within("amount", &lp, amount, position.staked())?;
                builder.unstake(position, amount)?
            }

            Command::RemoveLiquidity { pair, amount } => {
                let position = known_pair(&snapshot, pair)?;
                let lp = position.lp_token();
                let total = position.balance + position.staked();
                let liquidity = amount_or(&lp, "amount", amount.as_deref(), total)?;
                within("amount", &lp, liquidity, total)?;
                let from_gauge = liquidity.saturating_sub(position.balance);

                let allowance = self.allowances.allowance(self.request(&lp, contracts.router)).await;
                builder.remove_liquidity(position, liquidity, from_gauge, &allowance)?
            }

            Command::Swap { from, to, quote } => {
                quote.validate(from, to)?;
                let from_token = self.token_info(&snapshot, from);
                let to_token = self.token_info(&snapshot, to);
                check_balance(&snapshot, &from_token, quote.amount_in, "amount")?;

                let allowance = self.allowances.allowance(self.request(&from_token, contracts.router)).await;
                builder.swap(&from_token, &to_token, &quote, &allowance)?
            }

            // ========== Vote escrow ==========
            Command::CreateLock { amount, duration_secs } => {
                let token = &self.config.governance_token;
                let amount = token.parse("amount", &amount)?;
                check_balance(&snapshot, token, amount, "amount")?;
                check_duration(duration_secs)?;

                let allowance = self.allowances.allowance(self.request(token, contracts.voting_escrow)).await;
                builder.create_lock(token, amount, duration_secs, &allowance)
            }

            Command::IncreaseAmount { nft, amount } => {
                let ve = owned_nft(&snapshot, nft)?;
                if ve.is_expired(now) {
                    return Err(ValidationError::LockExpired(nft).into());
                }
                let token = &self.config.governance_token;
                let amount = token.parse("amount", &amount)?;
                check_balance(&snapshot, token, amount, "amount")?;

                let allowance = self.allowances.allowance(self.request(token, contracts.voting_escrow)).await;
                builder.increase_amount(token, nft, amount, &allowance)
            }

            Command::IncreaseDuration { nft, duration_secs } => {
                let ve = owned_nft(&snapshot, nft)?;
                if ve.is_expired(now) {
                    return Err(ValidationError::LockExpired(nft).into());
                }
                check_duration(duration_secs)?;
                builder.increase_duration(nft, duration_secs)
            }

            Command::WithdrawLock { nft } => {
                let mut ve = owned_nft(&snapshot, nft)?;
                if !ve.is_expired(now) {
                    return Err(ValidationError::LockNotExpired(nft).into());
                }
                ve.voted = self.voted(&ve).await;
                let bribes = self.outstanding_bribes(&snapshot, nft).await;
                builder.withdraw_lock(&ve, &bribes)
            }

            Command::Merge { from, to } => {
                let mut source = owned_nft(&snapshot, from)?;
                owned_nft(&snapshot, to)?;
                source.voted = self.voted(&source).await;
                builder.merge(&source, to)?
            }

            // ========== Voting ==========
            Command::Vote { nft, allocations } => {
                let ve = owned_nft(&snapshot, nft)?;
                if ve.is_expired(now) {
                    return Err(ValidationError::LockExpired(nft).into());
                }
                for allocation in &allocations {
                    let position = known_pair(&snapshot, allocation.pair)?;
                    if position.gauge.is_none() {
                        return Err(ValidationError::NoGauge(allocation.pair).into());
                    }
                }
                let bribes = self.outstanding_bribes(&snapshot, nft).await;
                builder.vote(nft, &allocations, &bribes)?
            }

            Command::Reset { nft } => {
                owned_nft(&snapshot, nft)?;
                builder.reset(nft)
            }

            // ========== Claims ==========
            Command::ClaimBribes { pair } => {
                let record = find_reward(&snapshot, |r| matches!(r, RewardRecord::Bribe { pair: p, .. } if *p == pair))?;
                builder.claim(record, &self.config.contracts)?
            }

            Command::ClaimReward { pair } => {
                let record = find_reward(&snapshot, |r| {
                    matches!(r, RewardRecord::Gauge { pair: p, program: RewardProgram::Primary, .. } if *p == pair)
                })
                .or_else(|_| {
                    find_reward(&snapshot, |r| matches!(r, RewardRecord::Gauge { pair: p, .. } if *p == pair))
                })?;
                builder.claim(record, &self.config.contracts)?
            }

            Command::ClaimDistribution { nft } => {
                let record = find_reward(&snapshot, |r| {
                    matches!(r, RewardRecord::Distribution { nft_id, .. } if *nft_id == nft)
                })?;
                builder.claim(record, &self.config.contracts)?
            }

            Command::ClaimAll => {
                if snapshot.rewards.is_empty() {
                    return Err(ValidationError::NothingToClaim.into());
                }
                builder.claim_all(&snapshot.rewards, &self.config.contracts)?
            }
        };

        Ok(workflow)
    }

    fn request(&self, token: &TokenInfo, spender: Address) -> AllowanceRequest {
        AllowanceRequest {
            token: token.address,
            decimals: token.decimals,
            owner: self.chain.account(),
            spender,
        }
    }

    /// Base asset or pair token metadata; placeholder if never seen
    fn token_info(&self, snapshot: &Snapshot, address: Address) -> TokenInfo {
        if let Some(asset) = snapshot.asset(address) {
            return asset.token.clone();
        }
        snapshot
            .positions
            .iter()
            .flat_map(|p| [&p.token0, &p.token1])
            .find(|t| t.address == address)
            .cloned()
            .unwrap_or_else(|| TokenInfo::unknown(address))
    }

    /// Cached bribe records when `nft` is the selected one, a fresh read otherwise
    async fn outstanding_bribes(&self, snapshot: &Snapshot, nft: U256) -> Vec<RewardRecord> {
        if snapshot.selected_nft == Some(nft) {
            return snapshot
                .rewards
                .iter()
                .filter(|r| matches!(r, RewardRecord::Bribe { nft_id, .. } if *nft_id == nft))
                .cloned()
                .collect();
        }
        self.fetcher.bribes_for(nft).await
    }

    /// Fresh `voted` flag; the cached one if the read fails
    async fn voted(&self, nft: &VeNft) -> bool {
        let Some(ve) = self.config.contracts.voting_escrow else {
            return nft.voted;
        };
        let call = ReadCall::new(ve, IVotingEscrow::votedCall { tokenId: nft.id });
        match self.reader.read(vec![call], ReadMode::Lenient).await {
            Ok(results) => results
                .first()
                .and_then(decode::<IVotingEscrow::votedCall>)
                .unwrap_or(nft.voted),
            Err(_) => nft.voted,
        }
    }
}

// ============================================
// PRE-CHECKS
// ============================================

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn known_pair(snapshot: &Snapshot, pair: Address) -> Result<&Position, ValidationError> {
    snapshot.position(pair).ok_or(ValidationError::UnknownPair(pair))
}

fn owned_nft(snapshot: &Snapshot, id: U256) -> Result<VeNft, ValidationError> {
    snapshot.nft(id).cloned().ok_or(ValidationError::UnknownNft(id))
}

fn find_reward(snapshot: &Snapshot, pred: impl Fn(&RewardRecord) -> bool) -> Result<&RewardRecord, ValidationError> {
    snapshot
        .rewards
        .iter()
        .find(|r| pred(r))
        .ok_or(ValidationError::NothingToClaim)
}

/// Parsed `input`, or `all` when no amount was given
fn amount_or(token: &TokenInfo, field: &'static str, input: Option<&str>, all: U256) -> Result<U256, ValidationError> {
    match input {
        Some(input) => token.parse(field, input),
        None if all.is_zero() => Err(ValidationError::ZeroAmount { field }),
        None => Ok(all),
    }
}

fn within(field: &'static str, token: &TokenInfo, amount: U256, available: U256) -> Result<(), ValidationError> {
    if amount > available {
        return Err(ValidationError::ExceedsBalance {
            field,
            requested: token.format(amount),
            available: token.format(available),
        });
    }
    Ok(())
}

/// Only checked when the balance is known
fn check_balance(snapshot: &Snapshot, token: &TokenInfo, amount: U256, field: &'static str) -> Result<(), ValidationError> {
    match snapshot.asset(token.address).and_then(|a| a.balance) {
        Some(balance) => within(field, token, amount, balance),
        None => Ok(()),
    }
}

fn check_duration(secs: u64) -> Result<(), ValidationError> {
    if secs < WEEK_SECS {
        return Err(ValidationError::LockDuration("must be at least one week".to_string()));
    }
    if secs > MAX_LOCK_SECS {
        return Err(ValidationError::LockDuration("must be at most four years".to_string()));
    }
    Ok(())
}

// ============================================
// TESTS
// ============================================
