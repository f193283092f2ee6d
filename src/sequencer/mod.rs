//! Transaction Sequencer
//!
//! Runs a flat, ordered list of dependent writes:
//! - Every step goes PENDING → SUBMITTED → CONFIRMED, or REJECTED
//! - Step k+1 never starts before step k is CONFIRMED
//! - A REJECTED step halts the rest; confirmed steps are not rolled back
//!
//! Steps may carry a pre-check (allowance, balance) that is resolved only
//! when the step's turn comes, so a step that depends on an earlier one
//! (stake the LP a deposit just minted) sees the post-deposit state.

mod errors;
mod step;
pub mod workflows;

pub use errors::{classify, user_message, ErrorCategory};
pub use step::{StepId, StepStatus, TransactionStep, WorkflowId};
pub use workflows::{vote_weights, TxSettings, VoteAllocation, WorkflowBuilder};

use alloy_primitives::{Address, TxHash, U256};
use eyre::{bail, eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::abi::{IGauge, IERC20};
use crate::chain::multicall::decode_strict;
use crate::chain::{error_text, AllowanceRequest, AllowanceResolver, ChainClient, MulticallReader, ReadCall, ReadMode, WriteCall};
use crate::events::{Event, EventBus};
use crate::state::RefreshScope;
use crate::tokens::TokenInfo;

// ============================================
// WORKFLOW DEFINITION
// ============================================

/// How much allowance a step needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountSource {
    Exact(U256),
    /// The owner's whole balance of the token, read when the step runs
    FullBalance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Send as-is
    Write(WriteCall),

    /// Approve `spender` unless the current allowance already covers `amount`
    EnsureAllowance {
        token: TokenInfo,
        spender: Address,
        amount: AmountSource,
    },

    /// Deposit the account's entire LP balance into `gauge`
    StakeBalance { lp: Address, gauge: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub description: String,
    pub action: StepAction,
}

/// One user action, already flattened into the steps it needs
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: WorkflowId,
    pub title: String,
    pub verb: String,
    pub steps: Vec<PlannedStep>,
    /// Snapshot fields to re-read once the whole workflow succeeds
    pub refresh: RefreshScope,
}

impl Workflow {
    pub fn new(title: impl Into<String>, verb: impl Into<String>, refresh: RefreshScope) -> Self {
        Self {
            id: WorkflowId::next(),
            title: title.into(),
            verb: verb.into(),
            steps: Vec::new(),
            refresh,
        }
    }

    pub fn push(&mut self, description: impl Into<String>, action: StepAction) {
        self.steps.push(PlannedStep {
            description: description.into(),
            action,
        });
    }

    pub fn write(&mut self, description: impl Into<String>, call: WriteCall) {
        self.push(description, StepAction::Write(call));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Raw write calls of the steps that are plain writes, in order
    pub fn calls(&self) -> Vec<&WriteCall> {
        self.steps
            .iter()
            .filter_map(|s| match &s.action {
                StepAction::Write(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum WorkflowResult {
    Completed {
        workflow: WorkflowId,
        steps: Vec<TransactionStep>,
        refresh: RefreshScope,
    },
    Failed {
        workflow: WorkflowId,
        step: StepId,
        category: ErrorCategory,
        /// Classified message, or the raw error when unmapped
        reason: String,
        steps: Vec<TransactionStep>,
    },
}

impl WorkflowResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkflowResult::Completed { .. })
    }

    pub fn steps(&self) -> &[TransactionStep] {
        match self {
            WorkflowResult::Completed { steps, .. } | WorkflowResult::Failed { steps, .. } => steps,
        }
    }
}

/// A step action once its pre-check has run
enum Resolved {
    Send(WriteCall),
    /// Nothing to send; carries the description shown instead
    Sufficient(String),
}

// ============================================
// SEQUENCER
// ============================================

pub struct Sequencer {
    chain: Arc<dyn ChainClient>,
    reader: MulticallReader,
    allowances: AllowanceResolver,
    bus: EventBus,
    gas_buffer_pct: u64,
}

impl Sequencer {
    pub fn new(chain: Arc<dyn ChainClient>, reader: MulticallReader, bus: EventBus, gas_buffer_pct: u64) -> Self {
        Self {
            chain,
            allowances: AllowanceResolver::new(reader.clone()),
            reader,
            bus,
            gas_buffer_pct,
        }
    }

    /// Execute every step in order, stopping at the first rejection
    pub async fn run(&self, workflow: Workflow) -> WorkflowResult {
        let Workflow {
            id,
            title,
            verb,
            steps: planned,
            refresh,
        } = workflow;

        let mut steps: Vec<TransactionStep> = planned
            .iter()
            .map(|p| TransactionStep::waiting(p.description.clone()))
            .collect();

        info!("📋 {} [{}]: {} step(s)", title, id, steps.len());
        self.bus.emit(Event::TransactionAdded {
            workflow: id,
            title: title.clone(),
            verb,
            steps: steps.clone(),
        });

        for (index, plan) in planned.into_iter().enumerate() {
            if let Err(e) = self.execute_step(id, &mut steps[index], plan.action).await {
                let raw = error_text(&e);
                let category = classify(&raw);
                let reason = user_message(&raw);
                let step = &mut steps[index];
                step.rejected(reason.clone());
                let step_id = step.id;

                warn!("❌ {} step {}/{} rejected ({}): {}", title, index + 1, steps.len(), category, raw);
                self.bus.emit(Event::TransactionRejected {
                    workflow: id,
                    step: step_id,
                    reason: reason.clone(),
                });

                return WorkflowResult::Failed {
                    workflow: id,
                    step: step_id,
                    category,
                    reason,
                    steps,
                };
            }
        }

        info!("✅ {} [{}] complete", title, id);
        WorkflowResult::Completed {
            workflow: id,
            steps,
            refresh,
        }
    }

    async fn execute_step(&self, workflow: WorkflowId, step: &mut TransactionStep, action: StepAction) -> Result<()> {
        step.pending();
        info!("⏳ {}: {}", step.id, step.description);
        self.bus.emit(Event::TransactionPending {
            workflow,
            step: step.id,
        });

        let call = match self.resolve(action).await? {
            Resolved::Send(call) => call,
            Resolved::Sufficient(description) => {
                step.skip(description);
                info!("⏭  {}: {}", step.id, step.description);
                self.bus.emit(Event::TransactionConfirmed {
                    workflow,
                    step: step.id,
                    hash: None,
                    description: step.description.clone(),
                });
                return Ok(());
            }
        };

        let gas = self.chain.estimate_gas(&call).await?;
        let gas_limit = gas + gas * self.gas_buffer_pct / 100;
        let fees = self.chain.fee_quote().await?;

        let hash = self.chain.submit(&call, gas_limit, fees).await?;
        step.submitted(hash);
        info!("📤 {}: submitted {}", step.id, hash);
        self.bus.emit(Event::TransactionSubmitted {
            workflow,
            step: step.id,
            hash,
        });

        let receipt = self.chain.wait_for_receipt(hash).await?;
        if !receipt.success {
            return Err(reverted(hash));
        }

        step.confirmed();
        info!(
            "✓ {}: confirmed in block {}",
            step.id,
            receipt.block_number.map(|b| b.to_string()).unwrap_or_else(|| "?".to_string())
        );
        self.bus.emit(Event::TransactionConfirmed {
            workflow,
            step: step.id,
            hash: Some(hash),
            description: step.description.clone(),
        });
        Ok(())
    }

    async fn resolve(&self, action: StepAction) -> Result<Resolved> {
        let owner = self.chain.account();
        match action {
            StepAction::Write(call) => Ok(Resolved::Send(call)),

            StepAction::EnsureAllowance { token, spender, amount } => {
                let required = match amount {
                    AmountSource::Exact(amount) => amount,
                    AmountSource::FullBalance => self.balance_of(token.address, owner).await?,
                };
                let allowance = self
                    .allowances
                    .allowance(AllowanceRequest {
                        token: token.address,
                        decimals: token.decimals,
                        owner,
                        spender,
                    })
                    .await;

                if allowance.covers(required) {
                    return Ok(Resolved::Sufficient(format!("{} allowance sufficient", token.symbol)));
                }
                Ok(Resolved::Send(WriteCall::new(
                    token.address,
                    IERC20::approveCall {
                        spender,
                        amount: required,
                    },
                )))
            }

            StepAction::StakeBalance { lp, gauge } => {
                let balance = self.balance_of(lp, owner).await?;
                if balance.is_zero() {
                    bail!("no LP balance to stake in gauge {}", gauge);
                }
                Ok(Resolved::Send(WriteCall::new(
                    gauge,
                    IGauge::depositCall {
                        amount: balance,
                        tokenId: U256::ZERO,
                    },
                )))
            }
        }
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let results = self
            .reader
            .read(vec![ReadCall::new(token, IERC20::balanceOfCall { account: owner })], ReadMode::Strict)
            .await?;
        let slot = results.into_iter().next().flatten();
        Ok(decode_strict::<IERC20::balanceOfCall>(token, &slot)?)
    }
}

fn reverted(hash: TxHash) -> eyre::Report {
    eyre!("execution reverted: transaction {} failed on-chain", hash)
}

// ============================================
// TESTS
// ============================================
