//! vedex - state layer for a vote-escrow DEX front end
//!
//! Run with: cargo run -- <command>
//!
//! Every write command refreshes the snapshot first (inputs are checked
//! against it), runs its workflow step by step, then re-reads what changed.

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod chain;
mod config;
mod dispatcher;
mod errors;
mod events;
mod rewards;
mod sequencer;
mod state;
#[cfg(test)]
mod testing;
mod tokens;

use api::{PairListClient, Quote};
use chain::RpcChainClient;
use config::Config;
use dispatcher::{Command, CommandKind, Dispatcher, Outcome};
use events::{Event, EventBus};
use sequencer::{StepId, VoteAllocation};
use state::{RefreshScope, Snapshot};

const DAY_SECS: u64 = 86_400;

// ============================================
// COMMAND LINE
// ============================================

#[derive(Parser)]
#[command(name = "vedex", version, about = "Vote-escrow DEX positions, votes and rewards")]
struct Cli {
    /// TOML config file (otherwise environment and .env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh everything and print the snapshot
    Snapshot {
        #[arg(long)]
        json: bool,
    },
    /// Print the claimable rewards of a veNFT
    Rewards {
        /// veNFT to aggregate bribes and rebase for (default: first owned)
        #[arg(long)]
        nft: Option<U256>,
    },
    /// Vote with a veNFT, e.g. `vote --nft 5 0xPAIR=60 0xPAIR=40`
    Vote {
        #[arg(long)]
        nft: U256,
        #[arg(required = true, value_parser = parse_allocation)]
        allocations: Vec<VoteAllocation>,
    },
    /// Clear a veNFT's votes
    Reset {
        #[arg(long)]
        nft: U256,
    },
    /// Add liquidity to a pair
    Deposit {
        pair: Address,
        amount0: String,
        amount1: String,
        /// Stake the received LP in the pair's gauge
        #[arg(long)]
        stake: bool,
    },
    /// Stake LP in the pair's gauge (default: whole wallet balance)
    Stake { pair: Address, amount: Option<String> },
    /// Withdraw LP from the pair's gauge (default: everything staked)
    Unstake { pair: Address, amount: Option<String> },
    /// Remove liquidity, unstaking first if needed (default: everything)
    WithdrawLiquidity { pair: Address, amount: Option<String> },
    /// Swap along a pre-computed route
    Swap {
        from: Address,
        to: Address,
        /// Quote JSON from the routing service
        #[arg(long)]
        quote: PathBuf,
    },
    /// Lock governance tokens into a new veNFT
    Lock {
        amount: String,
        #[arg(long, default_value_t = 4 * 365)]
        days: u64,
    },
    /// Add governance tokens to an existing lock
    IncreaseAmount {
        #[arg(long)]
        nft: U256,
        amount: String,
    },
    /// Extend a lock
    IncreaseDuration {
        #[arg(long)]
        nft: U256,
        days: u64,
    },
    /// Withdraw an expired lock
    WithdrawLock {
        #[arg(long)]
        nft: U256,
    },
    /// Merge one veNFT into another
    Merge { from: U256, to: U256 },
    /// Claim one reward
    Claim {
        #[command(subcommand)]
        target: ClaimTarget,
    },
    /// Claim every outstanding reward
    ClaimAll {
        #[arg(long)]
        nft: Option<U256>,
    },
}

#[derive(Subcommand)]
enum ClaimTarget {
    /// Bribes earned by the selected veNFT on a pair
    Bribes {
        pair: Address,
        #[arg(long)]
        nft: Option<U256>,
    },
    /// Gauge emissions on a pair
    Reward { pair: Address },
    /// Rebase of a veNFT
    Distribution { nft: U256 },
}

/// `0xPAIR=PERCENT`
fn parse_allocation(s: &str) -> Result<VoteAllocation, String> {
    let (pair, percent) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PAIR=PERCENT, got '{}'", s))?;
    Ok(VoteAllocation {
        pair: pair.trim().parse().map_err(|e| format!("bad pair '{}': {}", pair, e))?,
        percent: percent
            .trim()
            .parse()
            .map_err(|e| format!("bad percent '{}': {}", percent, e))?,
    })
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🗳  VEDEX - Liquidity, Locks, Votes & Rewards").cyan().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

// ============================================
// MAIN
// ============================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vedex=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e.into());
    }

    config.print_summary();
    println!();

    let chain = RpcChainClient::from_config(&config)?;
    config.check_chain_id(chain.chain_id().await?)?;
    info!("✓ Connected to chain {}", config.chain_id);
    let chain = Arc::new(chain);
    let pairs = PairListClient::new()?
        .load(config.pair_list_url.as_deref(), config.pair_list_path.as_deref())
        .await?;
    info!("✓ {} pair(s) listed", pairs.len());

    let bus = EventBus::new(config.event_capacity);
    let progress = tokio::spawn(render(bus.subscribe()));
    let dispatcher = Dispatcher::new(config, chain, pairs, bus.clone());
    bus.emit(Event::Configured);

    let result = run(&dispatcher, cli.command).await;

    // closing every sender ends the renderer once it has drained
    drop(dispatcher);
    drop(bus);
    if let Err(e) = progress.await {
        warn!("Progress display stopped: {}", e);
    }

    result
}

async fn run(dispatcher: &Dispatcher, command: Commands) -> Result<()> {
    expect_returned(dispatcher.dispatch(Command::Refresh(RefreshScope::ALL)).await)?;

    let command = match command {
        Commands::Snapshot { json } => {
            let snapshot = dispatcher.store().snapshot().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
            return Ok(());
        }
        Commands::Rewards { nft } => {
            select(dispatcher, nft).await?;
            print_rewards(&dispatcher.store().snapshot().await);
            return Ok(());
        }

        Commands::Vote { nft, allocations } => Command::Vote { nft, allocations },
        Commands::Reset { nft } => Command::Reset { nft },
        Commands::Deposit {
            pair,
            amount0,
            amount1,
            stake,
        } => Command::Deposit {
            pair,
            amount0,
            amount1,
            stake,
        },
        Commands::Stake { pair, amount } => Command::Stake { pair, amount },
        Commands::Unstake { pair, amount } => Command::Unstake { pair, amount },
        Commands::WithdrawLiquidity { pair, amount } => Command::RemoveLiquidity { pair, amount },
        Commands::Swap { from, to, quote } => Command::Swap {
            from,
            to,
            quote: Quote::from_file(quote)?,
        },
        Commands::Lock { amount, days } => Command::CreateLock {
            amount,
            duration_secs: days * DAY_SECS,
        },
        Commands::IncreaseAmount { nft, amount } => Command::IncreaseAmount { nft, amount },
        Commands::IncreaseDuration { nft, days } => Command::IncreaseDuration {
            nft,
            duration_secs: days * DAY_SECS,
        },
        Commands::WithdrawLock { nft } => Command::WithdrawLock { nft },
        Commands::Merge { from, to } => Command::Merge { from, to },
        Commands::Claim { target } => match target {
            ClaimTarget::Bribes { pair, nft } => {
                select(dispatcher, nft).await?;
                Command::ClaimBribes { pair }
            }
            ClaimTarget::Reward { pair } => Command::ClaimReward { pair },
            ClaimTarget::Distribution { nft } => {
                select(dispatcher, Some(nft)).await?;
                Command::ClaimDistribution { nft }
            }
        },
        Commands::ClaimAll { nft } => {
            select(dispatcher, nft).await?;
            Command::ClaimAll
        }
    };

    expect_returned(dispatcher.dispatch(command).await)
}

/// Aggregate rewards for `nft` unless it already is the selected one
async fn select(dispatcher: &Dispatcher, nft: Option<U256>) -> Result<()> {
    let Some(nft) = nft else {
        return Ok(());
    };
    if dispatcher.store().get(|s| s.selected_nft).await == Some(nft) {
        return Ok(());
    }
    expect_returned(dispatcher.dispatch(Command::SelectNft(nft)).await)
}

/// The renderer already reported the failure; this only sets the exit status
fn expect_returned(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Returned => Ok(()),
        Outcome::Invalid(e) => Err(eyre!("invalid input: {}", e)),
        Outcome::Failed(reason) => Err(eyre!("{}", reason)),
    }
}

// ============================================
// PROGRESS
// ============================================

/// Print workflow progress from the event bus until every sender is gone
async fn render(mut rx: Receiver<Event>) {
    let mut spinner: Option<ProgressBar> = None;
    let mut steps: HashMap<StepId, String> = HashMap::new();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!("Progress display skipped {} event(s)", n);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let say = |line: String| match &spinner {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        };

        match event {
            Event::TransactionAdded { title, steps: planned, .. } => {
                println!();
                println!("{}", style(format!("═══ {} ═══", title)).yellow().bold());
                for (i, step) in planned.iter().enumerate() {
                    println!("  {}. {}", i + 1, step.description);
                    steps.insert(step.id, step.description.clone());
                }
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.enable_steady_tick(Duration::from_millis(120));
                spinner = Some(bar);
            }
            Event::TransactionPending { step, .. } => {
                if let (Some(bar), Some(desc)) = (&spinner, steps.get(&step)) {
                    bar.set_message(desc.clone());
                }
            }
            Event::TransactionSubmitted { step, hash, .. } => {
                if let (Some(bar), Some(desc)) = (&spinner, steps.get(&step)) {
                    bar.set_message(format!("{} ({})", desc, style(hash).dim()));
                }
            }
            Event::TransactionConfirmed { hash, description, .. } => match hash {
                Some(hash) => say(format!("{} {} {}", style("✓").green(), description, style(hash).dim())),
                None => say(format!("{} {} {}", style("○").dim(), description, style("(already done)").dim())),
            },
            Event::TransactionRejected { step, reason, .. } => {
                let desc = steps.get(&step).cloned().unwrap_or_default();
                say(format!("{} {}", style("✗").red(), desc));
                if let Some(bar) = spinner.take() {
                    bar.finish_and_clear();
                }
                println!("  {}", style(reason).red());
            }
            Event::Returned(kind) => {
                if let Some(bar) = spinner.take() {
                    bar.finish_and_clear();
                }
                if !matches!(kind, CommandKind::Refresh | CommandKind::SelectNft) {
                    println!("{} {:?} complete", style("✅").green(), kind);
                }
            }
            Event::Validation(e) => {
                println!("{} {}: {}", style("⚠").yellow(), style(e.field()).bold(), e);
            }
            Event::Warning(w) => say(format!("{} {}", style("⚠").yellow(), w)),
            Event::Error(e) => {
                if let Some(bar) = spinner.take() {
                    bar.finish_and_clear();
                }
                println!("{} {}", style("✗").red().bold(), style(e).red());
            }
            Event::StateUpdated => debug!("snapshot updated"),
            Event::Configured => debug!("configured"),
        }
    }

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}

// ============================================
// OUTPUT
// ============================================

fn print_snapshot(snapshot: &Snapshot) {
    println!("{}", style("═══ WALLET ═══").blue().bold());
    for asset in &snapshot.base_assets {
        let balance = match asset.balance {
            Some(b) => asset.token.format(b),
            None => style("unavailable").dim().to_string(),
        };
        println!("  {:<10} {}", asset.token.symbol, balance);
    }

    println!();
    println!("{}", style("═══ POSITIONS ═══").blue().bold());
    if snapshot.positions.is_empty() {
        println!("  (none)");
    }
    for p in &snapshot.positions {
        let lp = p.lp_token();
        let (a0, a1) = p.underlying(p.balance + p.staked());
        println!(
            "  {} {} | wallet {} | staked {} | ≈ {} {} + {} {}",
            style(&p.symbol).cyan(),
            if p.stable { "(stable)" } else { "(volatile)" },
            lp.format(p.balance),
            lp.format(p.staked()),
            p.token0.format(a0),
            p.token0.symbol,
            p.token1.format(a1),
            p.token1.symbol,
        );
        if let Some(g) = &p.gauge {
            println!("      gauge {:?} | weight {} | bribes {}", g.address, lp.format(g.weight), g.bribes.len());
        }
    }

    println!();
    println!("{}", style("═══ veNFTs ═══").blue().bold());
    if snapshot.ve_nfts.is_empty() {
        println!("  (none)");
    }
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    for nft in &snapshot.ve_nfts {
        let end = chrono::DateTime::from_timestamp(nft.lock_end as i64, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| nft.lock_end.to_string());
        let marker = if snapshot.selected_nft == Some(nft.id) { "▶" } else { " " };
        println!(
            "  {} #{} | locked {} | power {} | until {}{}{}",
            marker,
            nft.id,
            tokens::format_amount(nft.locked, 18),
            tokens::format_amount(nft.voting_power, 18),
            end,
            if nft.is_expired(now) { " (expired)" } else { "" },
            if nft.voted { " | voted" } else { "" },
        );
    }

    println!();
    print_rewards(snapshot);
}

fn print_rewards(snapshot: &Snapshot) {
    println!("{}", style("═══ REWARDS ═══").blue().bold());
    if snapshot.rewards.is_empty() {
        println!("  Nothing to claim");
        return;
    }
    for record in &snapshot.rewards {
        let earned = record
            .earned()
            .iter()
            .map(|e| format!("{} {}", e.display, e.token.symbol))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {} {}: {}", style("💰").green(), record.label(), earned);
    }
}
