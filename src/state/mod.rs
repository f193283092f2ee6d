//! Application State Cache
//!
//! One process-scoped snapshot behind an `RwLock`. Writers shallow-merge a
//! patch and the store broadcasts a single `StateUpdated`; readers clone what
//! they need. Locks are only held for the clone or the merge itself.

mod fetch;
mod model;

pub use fetch::SnapshotFetcher;
pub use model::{BaseAsset, Bribe, Gauge, Position, VeNft};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::events::{Event, EventBus};
use crate::rewards::RewardRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub account: Option<Address>,
    pub base_assets: Vec<BaseAsset>,
    pub positions: Vec<Position>,
    pub ve_nfts: Vec<VeNft>,
    /// veNFT rewards are aggregated for
    pub selected_nft: Option<U256>,
    pub rewards: Vec<RewardRecord>,
}

impl Snapshot {
    pub fn position(&self, pair: Address) -> Option<&Position> {
        self.positions.iter().find(|p| p.address == pair)
    }

    pub fn nft(&self, id: U256) -> Option<&VeNft> {
        self.ve_nfts.iter().find(|n| n.id == id)
    }

    pub fn asset(&self, token: Address) -> Option<&BaseAsset> {
        self.base_assets.iter().find(|a| a.token.address == token)
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct SnapshotPatch {
    pub account: Option<Address>,
    pub base_assets: Option<Vec<BaseAsset>>,
    pub positions: Option<Vec<Position>>,
    pub ve_nfts: Option<Vec<VeNft>>,
    pub selected_nft: Option<Option<U256>>,
    pub rewards: Option<Vec<RewardRecord>>,
}

impl SnapshotPatch {
    pub fn is_empty(&self) -> bool {
        self.account.is_none()
            && self.base_assets.is_none()
            && self.positions.is_none()
            && self.ve_nfts.is_none()
            && self.selected_nft.is_none()
            && self.rewards.is_none()
    }
}

/// Which snapshot fields a refresh re-reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshScope {
    pub base_assets: bool,
    pub positions: bool,
    pub ve_nfts: bool,
    pub rewards: bool,
}

impl RefreshScope {
    pub const NONE: Self = Self {
        base_assets: false,
        positions: false,
        ve_nfts: false,
        rewards: false,
    };
    pub const BASE_ASSETS: Self = Self { base_assets: true, ..Self::NONE };
    pub const POSITIONS: Self = Self { positions: true, ..Self::NONE };
    pub const VE_NFTS: Self = Self { ve_nfts: true, ..Self::NONE };
    pub const REWARDS: Self = Self { rewards: true, ..Self::NONE };
    pub const ALL: Self = Self {
        base_assets: true,
        positions: true,
        ve_nfts: true,
        rewards: true,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

impl BitOr for RefreshScope {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            base_assets: self.base_assets || rhs.base_assets,
            positions: self.positions || rhs.positions,
            ve_nfts: self.ve_nfts || rhs.ve_nfts,
            rewards: self.rewards || rhs.rewards,
        }
    }
}

#[derive(Clone)]
pub struct AppStore {
    inner: Arc<RwLock<Snapshot>>,
    bus: EventBus,
}

impl AppStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Snapshot::default())),
            bus,
        }
    }

    /// Latest merged snapshot
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }

    /// Read one piece of the snapshot without cloning the rest
    pub async fn get<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        f(&*self.inner.read().await)
    }

    /// Shallow-merge `patch` and broadcast one `StateUpdated`
    pub async fn merge(&self, patch: SnapshotPatch) {
        if patch.is_empty() {
            return;
        }
        {
            let mut state = self.inner.write().await;
            if let Some(account) = patch.account {
                state.account = Some(account);
            }
            if let Some(assets) = patch.base_assets {
                state.base_assets = assets;
            }
            if let Some(positions) = patch.positions {
                state.positions = positions;
            }
            if let Some(nfts) = patch.ve_nfts {
                state.ve_nfts = nfts;
            }
            if let Some(selected) = patch.selected_nft {
                state.selected_nft = selected;
            }
            if let Some(rewards) = patch.rewards {
                state.rewards = rewards;
            }
        }
        debug!("Snapshot updated");
        self.bus.emit(Event::StateUpdated);
    }

    /// Report an omitted entity to subscribers without touching the snapshot
    pub fn warn(&self, message: impl Into<String>) {
        self.bus.emit(Event::Warning(message.into()));
    }
}
