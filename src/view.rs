//! Read side: fetch shard/pool state, derive metrics and reconcile holdings.

use crate::account_shard::{
    LayoutAccount, POOL_ACCOUNT_SPACE, PoolAccount, ShardAccount, VAULT_ACCOUNT_SPACE,
    VAULT_OWNER_OFFSET, VAULT_POOL_OFFSET, VaultAccount,
};
use crate::address::AddressResolver;
use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};
use crate::matcher::ShardIndex;
use crate::shard::{ItemId, PoolRecord, ShardRecord, UserIndex, VaultRecord};
use crate::traits::{AccountFilter, LedgerClient};
use anchor_lang::prelude::Pubkey;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A pool together with the shard it references.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryPair {
    pub shard: ShardRecord,
    pub pool: PoolRecord,
}

/// An item resolved all the way to its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMatch {
    pub item: ItemId,
    pub shard: Pubkey,
    pub pool: Pubkey,
    pub collection: String,
    pub category: String,
}

/// `sum(locked) / sum(items)` as a percentage over the pools whose shard
/// belongs to `collection`. Zero when there is nothing to divide by.
pub fn compute_occupancy(pairs: &[RegistryPair], collection: &str) -> f64 {
    let (locked, items) = pairs
        .iter()
        .filter(|p| p.shard.collection == collection)
        .fold((0u64, 0u64), |(locked, items), p| {
            (
                locked.saturating_add(p.pool.locked_count),
                items.saturating_add(p.pool.item_count),
            )
        });
    percentage(locked, items)
}

/// Items staked across every pool.
pub fn staked_count(pairs: &[RegistryPair]) -> u64 {
    saturating_sum(pairs.iter().map(|p| p.pool.locked_count))
}

/// Staked share across every pool, as a percentage.
pub fn staked_percentage(pairs: &[RegistryPair]) -> f64 {
    let items = saturating_sum(pairs.iter().map(|p| p.pool.item_count));
    percentage(staked_count(pairs), items)
}

fn saturating_sum(values: impl Iterator<Item = u64>) -> u64 {
    values.fold(0, u64::saturating_add)
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Resolve items to the pools built on the shards that list them.
pub fn match_items_to_pools(items: &[ItemId], pairs: &[RegistryPair]) -> Vec<PoolMatch> {
    let shards: Vec<ShardRecord> = pairs.iter().map(|p| p.shard.clone()).collect();
    let by_shard: HashMap<Pubkey, &RegistryPair> =
        pairs.iter().map(|p| (p.shard.address, p)).collect();
    ShardIndex::build(&shards)
        .match_items(items)
        .into_iter()
        .filter_map(|m| {
            let pair = by_shard.get(&m.shard)?;
            Some(PoolMatch {
                item: m.item,
                shard: m.shard,
                pool: pair.pool.address,
                collection: pair.shard.collection.clone(),
                category: pair.shard.category.clone(),
            })
        })
        .collect()
}

pub struct RegistryView {
    ledger: Arc<dyn LedgerClient>,
    cfg: RegistryConfig,
    resolver: AddressResolver,
}

impl RegistryView {
    pub fn new(ledger: Arc<dyn LedgerClient>, cfg: &RegistryConfig) -> Self {
        Self {
            ledger,
            cfg: cfg.clone(),
            resolver: AddressResolver::new(cfg),
        }
    }

    /// Every pool under the staking program paired with its shard. Shard
    /// reads run concurrently, bounded by `max_concurrent_reads`.
    pub async fn fetch_all(&self) -> Result<Vec<RegistryPair>> {
        let pools = self
            .ledger
            .get_program_accounts(
                &self.cfg.staking_program_id,
                &[AccountFilter::DataSize(POOL_ACCOUNT_SPACE as u64)],
            )
            .await?
            .into_iter()
            .map(|(address, blob)| self.decode_pool(address, &blob.data))
            .collect::<Result<Vec<_>>>()?;
        debug!(pools = pools.len(), "fetched pools");

        stream::iter(pools)
            .map(|pool| async move {
                let shard = self.fetch_shard(&pool.shard).await?;
                Ok::<_, RegistryError>(RegistryPair { shard, pool })
            })
            .buffered(self.cfg.max_concurrent_reads.max(1))
            .try_collect()
            .await
    }

    pub async fn fetch_pair(&self, pool_address: &Pubkey) -> Result<RegistryPair> {
        let pool = self.fetch_pool(pool_address).await?;
        let shard = self.fetch_shard(&pool.shard).await?;
        Ok(RegistryPair { shard, pool })
    }

    pub async fn fetch_pool(&self, address: &Pubkey) -> Result<PoolRecord> {
        let blob = self
            .ledger
            .get_account(address)
            .await?
            .ok_or(RegistryError::AccountNotFound(*address))?;
        if blob.owner != self.cfg.staking_program_id {
            return Err(RegistryError::InvalidPool(
                *address,
                format!("owned by {}", blob.owner),
            ));
        }
        self.decode_pool(*address, &blob.data)
    }

    pub async fn fetch_shard(&self, address: &Pubkey) -> Result<ShardRecord> {
        let blob = self
            .ledger
            .get_account(address)
            .await?
            .ok_or(RegistryError::AccountNotFound(*address))?;
        if blob.owner != self.cfg.rarity_program_id {
            return Err(RegistryError::Decode {
                account: ShardAccount::NAME,
                reason: format!("{address} is owned by {}", blob.owner),
            });
        }
        let mut record = ShardRecord::from_account(
            *address,
            ShardAccount::decode(&blob.data)?,
            self.cfg.shard_capacity,
        );
        record.index = self.resolver.recover_shard_index(
            &record.collection,
            &record.category,
            &record.admin,
            address,
            self.cfg.max_index_scan,
        );
        Ok(record)
    }

    pub async fn fetch_user_holdings(&self, user: &Pubkey) -> Result<Vec<VaultRecord>> {
        self.fetch_vaults(vec![AccountFilter::memcmp_pubkey(VAULT_OWNER_OFFSET, user)])
            .await
    }

    pub async fn fetch_user_index(&self, user: &Pubkey) -> Result<UserIndex> {
        Ok(UserIndex {
            user: *user,
            staked: self.fetch_user_holdings(user).await?,
        })
    }

    pub async fn fetch_pool_holdings(&self, pool: &Pubkey) -> Result<Vec<VaultRecord>> {
        self.fetch_vaults(vec![AccountFilter::memcmp_pubkey(VAULT_POOL_OFFSET, pool)])
            .await
    }

    pub async fn fetch_user_pool_holdings(
        &self,
        user: &Pubkey,
        pool: &Pubkey,
    ) -> Result<Vec<VaultRecord>> {
        self.fetch_vaults(vec![
            AccountFilter::memcmp_pubkey(VAULT_OWNER_OFFSET, user),
            AccountFilter::memcmp_pubkey(VAULT_POOL_OFFSET, pool),
        ])
        .await
    }

    async fn fetch_vaults(&self, mut filters: Vec<AccountFilter>) -> Result<Vec<VaultRecord>> {
        filters.push(AccountFilter::DataSize(VAULT_ACCOUNT_SPACE as u64));
        self.ledger
            .get_program_accounts(&self.cfg.staking_program_id, &filters)
            .await?
            .into_iter()
            .map(|(address, blob)| {
                let vault = VaultRecord::from_account(address, VaultAccount::decode(&blob.data)?);
                AddressResolver::verify(
                    "item vault",
                    self.resolver.derive_item_vault_address(&vault.item, &vault.pool),
                    address,
                )?;
                Ok(vault)
            })
            .collect()
    }

    /// Decodes a pool and checks it against the locally derived addresses.
    fn decode_pool(&self, address: Pubkey, data: &[u8]) -> Result<PoolRecord> {
        let pool = PoolRecord::from_account(address, PoolAccount::decode(data)?);
        AddressResolver::verify("pool", self.resolver.derive_pool_address(&pool.shard), address)?;
        AddressResolver::verify(
            "collateral authority",
            self.resolver.derive_authority_address(&address),
            pool.collateral_authority,
        )?;
        Ok(pool)
    }
}
