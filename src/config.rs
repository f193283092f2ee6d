//! Configuration for the vedex state layer
//!
//! Loaded from environment variables (with `.env` support) or a TOML file.
//! Contract addresses are optional at load time; `validate()` and
//! `Contracts::require()` decide which ones a given operation cannot live
//! without.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::chain::abi::MULTICALL3;
use crate::chain::multicall::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_IN_FLIGHT};
use crate::errors::ConfigError;
use crate::tokens::{parse_token_list, TokenInfo};

// ============================================
// CONTRACT ADDRESSES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contracts {
    /// Multicall3 (same address on every EVM chain)
    pub multicall: Address,

    /// AMM router (add/remove liquidity, swaps)
    pub router: Option<Address>,

    /// Voter (gauges, bribes, votes, claims)
    pub voter: Option<Address>,

    /// Vote-escrow NFT contract
    pub voting_escrow: Option<Address>,

    /// Rebase distributor for veNFT holders
    pub rewards_distributor: Option<Address>,

    /// Voter of a second gauge program, if the deployment has one
    pub secondary_voter: Option<Address>,
}

impl Default for Contracts {
    fn default() -> Self {
        Self {
            multicall: MULTICALL3,
            router: None,
            voter: None,
            voting_escrow: None,
            rewards_distributor: None,
            secondary_voter: None,
        }
    }
}

/// Addresses every write workflow depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreContracts {
    pub router: Address,
    pub voter: Address,
    pub voting_escrow: Address,
}

impl Contracts {
    /// Router, voter and vote-escrow, or the first missing one
    pub fn require(&self) -> Result<CoreContracts, ConfigError> {
        Ok(CoreContracts {
            router: self.router.ok_or(ConfigError::MissingAddress("ROUTER_ADDRESS"))?,
            voter: self.voter.ok_or(ConfigError::MissingAddress("VOTER_ADDRESS"))?,
            voting_escrow: self
                .voting_escrow
                .ok_or(ConfigError::MissingAddress("VOTING_ESCROW_ADDRESS"))?,
        })
    }

    pub fn require_distributor(&self) -> Result<Address, ConfigError> {
        self.rewards_distributor
            .ok_or(ConfigError::MissingAddress("REWARDS_DISTRIBUTOR_ADDRESS"))
    }

    pub fn require_secondary_voter(&self) -> Result<Address, ConfigError> {
        self.secondary_voter
            .ok_or(ConfigError::MissingAddress("SECONDARY_VOTER_ADDRESS"))
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint
    pub rpc_url: String,

    pub chain_id: u64,

    // ========== Wallet Settings ==========
    /// Signing key for writes (KEEP SECRET!)
    #[serde(skip_serializing)]
    pub private_key: Option<String>,

    /// Read-only account when no key is configured
    pub account: Option<Address>,

    // ========== Contracts ==========
    pub contracts: Contracts,

    /// Token locked in the vote-escrow and paid out as emissions
    pub governance_token: TokenInfo,

    /// Token the secondary gauge program pays; the governance token if unset
    #[serde(default)]
    pub secondary_reward_token: Option<TokenInfo>,

    /// Tokens whose balances the snapshot tracks
    pub base_assets: Vec<TokenInfo>,

    // ========== Auxiliary Services ==========
    /// Pair-list service URL (JSON array of pairs)
    pub pair_list_url: Option<String>,

    /// Local pair-list file, used instead of the URL when set
    pub pair_list_path: Option<String>,

    // ========== Multicall ==========
    /// Maximum calls per `aggregate3`
    pub multicall_chunk_size: usize,

    /// Chunks executed concurrently
    pub max_chunks_in_flight: usize,

    // ========== Transactions ==========
    /// Slippage tolerance for liquidity and swap minimums (basis points)
    pub slippage_bps: u32,

    /// Router deadline, seconds from now
    pub deadline_secs: u64,

    /// Extra headroom on top of the gas estimate (percent)
    pub gas_buffer_pct: u64,

    /// Receipt polling interval (milliseconds)
    pub receipt_poll_ms: u64,

    /// Receipt polls before giving up with a timeout
    pub receipt_max_polls: u32,

    // ========== Events ==========
    /// Event bus buffer; slow subscribers past this lag and skip events
    pub event_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Wallet
            private_key: env::var("PRIVATE_KEY").ok().filter(|k| !k.is_empty()),
            account: env_address("ACCOUNT")?,

            // Contracts
            contracts: Contracts {
                multicall: env_address("MULTICALL_ADDRESS")?.unwrap_or(MULTICALL3),
                router: env_address("ROUTER_ADDRESS")?,
                voter: env_address("VOTER_ADDRESS")?,
                voting_escrow: env_address("VOTING_ESCROW_ADDRESS")?,
                rewards_distributor: env_address("REWARDS_DISTRIBUTOR_ADDRESS")?,
                secondary_voter: env_address("SECONDARY_VOTER_ADDRESS")?,
            },
            governance_token: match env::var("GOVERNANCE_TOKEN") {
                Ok(s) => TokenInfo::from_str(&s)?,
                Err(_) => defaults.governance_token,
            },
            secondary_reward_token: match env::var("SECONDARY_REWARD_TOKEN") {
                Ok(s) if !s.trim().is_empty() => Some(TokenInfo::from_str(&s)?),
                _ => None,
            },
            base_assets: match env::var("BASE_ASSETS") {
                Ok(s) => parse_token_list(&s)?,
                Err(_) => defaults.base_assets,
            },

            // Auxiliary services
            pair_list_url: env::var("PAIR_LIST_URL").ok(),
            pair_list_path: env::var("PAIR_LIST_PATH").ok(),

            // Multicall
            multicall_chunk_size: env::var("MULTICALL_CHUNK_SIZE")
                .unwrap_or_else(|_| DEFAULT_CHUNK_SIZE.to_string())
                .parse()
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            max_chunks_in_flight: env::var("MAX_CHUNKS_IN_FLIGHT")
                .unwrap_or_else(|_| DEFAULT_MAX_IN_FLIGHT.to_string())
                .parse()
                .unwrap_or(DEFAULT_MAX_IN_FLIGHT),

            // Transactions
            slippage_bps: env::var("SLIPPAGE_BPS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            deadline_secs: env::var("DEADLINE_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .unwrap_or(1800),
            gas_buffer_pct: env::var("GAS_BUFFER_PCT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            receipt_poll_ms: env::var("RECEIPT_POLL_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            receipt_max_polls: env::var("RECEIPT_MAX_POLLS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .unwrap_or(90),

            event_capacity: env::var("EVENT_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// The RPC endpoint must serve the chain the addresses belong to
    pub fn check_chain_id(&self, served: u64) -> Result<(), ConfigError> {
        if served != self.chain_id {
            return Err(ConfigError::ChainMismatch {
                expected: self.chain_id,
                got: served,
            });
        }
        Ok(())
    }

    pub fn secondary_token(&self) -> TokenInfo {
        self.secondary_reward_token
            .clone()
            .unwrap_or_else(|| self.governance_token.clone())
    }

    /// Reject configurations no operation can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multicall_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.private_key.is_none() && self.account.is_none() {
            return Err(ConfigError::NoAccount);
        }
        self.contracts.require()?;
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let addr = |a: Option<Address>| match a {
            Some(a) => format!("{:?}", a),
            None => "✗ Not Set".to_string(),
        };

        println!("╔════════════════════════════════════════════════════════════════╗");
        println!("║                    VEDEX - CONFIGURATION                       ║");
        println!("╠════════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:        {:<45} ║", self.chain_id);
        println!("║ Signer:          {:<45} ║",
            if self.private_key.is_some() { "✓ Configured" } else { "✗ Read-only" }
        );
        println!("╠════════════════════════════════════════════════════════════════╣");
        println!("║ CONTRACTS                                                      ║");
        println!("║ • Router:        {:<45} ║", addr(self.contracts.router));
        println!("║ • Voter:         {:<45} ║", addr(self.contracts.voter));
        println!("║ • VotingEscrow:  {:<45} ║", addr(self.contracts.voting_escrow));
        println!("║ • Distributor:   {:<45} ║", addr(self.contracts.rewards_distributor));
        println!("║ • 2nd Voter:     {:<45} ║", addr(self.contracts.secondary_voter));
        println!("╠════════════════════════════════════════════════════════════════╣");
        println!("║ TOKENS                                                         ║");
        println!("║ • Governance:    {:<45} ║", self.governance_token.symbol);
        if self.contracts.secondary_voter.is_some() {
            println!("║ • 2nd Rewards:   {:<45} ║", self.secondary_token().symbol);
        }
        println!("║ • Base Assets:   {:<45} ║", self.base_assets.len());
        println!("╠════════════════════════════════════════════════════════════════╣");
        println!("║ READS / WRITES                                                 ║");
        println!("║ • Chunk Size:    {:<45} ║", self.multicall_chunk_size);
        println!("║ • In Flight:     {:<45} ║", self.max_chunks_in_flight);
        println!("║ • Slippage:      {:<45} ║", format!("{} bps", self.slippage_bps));
        println!("║ • Deadline:      {:<45} ║", format!("{} s", self.deadline_secs));
        println!("╚════════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.optimism.io".to_string(),
            chain_id: 10,
            private_key: None,
            account: None,
            contracts: Contracts::default(),
            governance_token: TokenInfo::new(Address::ZERO, "GOV", 18),
            secondary_reward_token: None,
            base_assets: Vec::new(),
            pair_list_url: None,
            pair_list_path: None,
            multicall_chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks_in_flight: DEFAULT_MAX_IN_FLIGHT,
            slippage_bps: 50,
            deadline_secs: 1800,
            gas_buffer_pct: 20,
            receipt_poll_ms: 2000,
            receipt_max_polls: 90,
            event_capacity: 256,
        }
    }
}

/// Optional address from the environment; present-but-invalid is an error
fn env_address(key: &'static str) -> Result<Option<Address>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Address::from_str(value.trim())
            .map(Some)
            .map_err(|_| ConfigError::InvalidAddress { key, value }),
        Err(_) => Ok(None),
    }
}

// ============================================
// TESTS
// ============================================
