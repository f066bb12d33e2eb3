//! Client-side records for shards, pools and per-item vaults.

use crate::account_shard::{PoolAccount, ShardAccount, VaultAccount, from_fixed};
use crate::address::{AddressResolver, check_seed_field};
use crate::config::RegistryConfig;
use crate::errors::Result;
use crate::planner::CapacityPlanner;
use anchor_lang::prelude::Pubkey;

/// Item identifier: the mint of one NFT.
pub type ItemId = Pubkey;

#[derive(Debug, Clone)]
pub struct CapacityStats {
    pub current_items: usize,
    pub max_capacity: usize,
    pub remaining_capacity: usize,
    pub utilization_percentage: f32,
    pub is_full: bool,
    pub is_empty: bool,
}

/// Identity and contents of a shard that is about to be created or extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub collection: String,
    pub category: String,
    pub index: u64,
    pub admin: Pubkey,
    pub address: Pubkey,
    pub seed: String,
    pub items: Vec<ItemId>,
}

impl ShardSpec {
    pub fn new(
        resolver: &AddressResolver,
        collection: &str,
        category: &str,
        index: u64,
        admin: Pubkey,
        items: Vec<ItemId>,
    ) -> Result<Self> {
        check_seed_field("collection", collection)?;
        check_seed_field("category", category)?;
        let seed = crate::address::shard_seed(collection, category, index)?;
        let address = resolver.derive_shard_address(collection, category, index, &admin)?;
        Ok(Self {
            collection: collection.to_string(),
            category: category.to_string(),
            index,
            admin,
            address,
            seed,
            items,
        })
    }

    /// One spec per capacity-bounded group of `items`, indexed from zero.
    pub fn plan_from_items(
        cfg: &RegistryConfig,
        collection: &str,
        category: &str,
        admin: Pubkey,
        items: &[ItemId],
    ) -> Result<Vec<Self>> {
        let resolver = AddressResolver::new(cfg);
        let planner = CapacityPlanner::new(cfg)?;
        planner
            .plan_shards(items)
            .into_iter()
            .map(|group| Self::new(&resolver, collection, category, group.index, admin, group.items))
            .collect()
    }
}

/// A shard as read back from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardRecord {
    pub address: Pubkey,
    pub admin: Pubkey,
    pub collection: String,
    pub category: String,
    /// Recovered by re-deriving candidate addresses; `None` if not found.
    pub index: Option<u64>,
    pub items: Vec<ItemId>,
    pub capacity: usize,
}

impl ShardRecord {
    pub fn from_account(address: Pubkey, account: ShardAccount, capacity: usize) -> Self {
        Self {
            address,
            admin: account.admin,
            collection: from_fixed(&account.collection),
            category: from_fixed(&account.category),
            index: None,
            items: account.items,
            capacity,
        }
    }

    pub fn contains(&self, item: &ItemId) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn utilization_percentage(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.items.len() as f32 / self.capacity as f32) * 100.0
    }

    pub fn capacity_stats(&self) -> CapacityStats {
        CapacityStats {
            current_items: self.len(),
            max_capacity: self.capacity,
            remaining_capacity: self.remaining_capacity(),
            utilization_percentage: self.utilization_percentage(),
            is_full: self.is_full(),
            is_empty: self.is_empty(),
        }
    }
}

/// A staking pool as read back from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRecord {
    pub address: Pubkey,
    pub admin: Pubkey,
    pub collateral_mint: Pubkey,
    pub collateral_authority: Pubkey,
    pub collateral_vault: Pubkey,
    pub shard: Pubkey,
    /// Shard length snapshotted when the pool was created.
    pub item_count: u64,
    pub locked_count: u64,
}

impl PoolRecord {
    pub fn from_account(address: Pubkey, account: PoolAccount) -> Self {
        Self {
            address,
            admin: account.admin,
            collateral_mint: account.collateral_mint,
            collateral_authority: account.collateral_authority,
            collateral_vault: account.collateral_vault,
            shard: account.shard,
            item_count: account.item_count,
            locked_count: account.locked_count,
        }
    }
}

/// One staked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultRecord {
    pub address: Pubkey,
    pub owner: Pubkey,
    pub pool: Pubkey,
    pub item: ItemId,
}

impl VaultRecord {
    pub fn from_account(address: Pubkey, account: VaultAccount) -> Self {
        Self {
            address,
            owner: account.owner,
            pool: account.pool,
            item: account.item,
        }
    }
}

/// Every vault currently owned by one user, built by scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIndex {
    pub user: Pubkey,
    pub staked: Vec<VaultRecord>,
}

impl UserIndex {
    pub fn items_in_pool(&self, pool: &Pubkey) -> Vec<ItemId> {
        self.staked
            .iter()
            .filter(|v| v.pool == *pool)
            .map(|v| v.item)
            .collect()
    }
}
