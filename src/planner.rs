//! Splitting item lists into shard-sized groups and message-sized batches.

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};
use crate::shard::ItemId;
use anchor_lang::prelude::Pubkey;
use tracing::{debug, warn};

/// Items destined for one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardGroup {
    pub index: u64,
    pub items: Vec<ItemId>,
}

/// Contiguous, order-preserving partition of `items` into groups of at most
/// `bound`. An empty input yields no groups.
pub fn partition<T: Clone>(items: &[T], bound: usize) -> Vec<Vec<T>> {
    if bound == 0 {
        return Vec::new();
    }
    items.chunks(bound).map(<[T]>::to_vec).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct CapacityPlanner {
    shard_capacity: usize,
    append_batch_size: usize,
}

impl CapacityPlanner {
    pub fn new(cfg: &RegistryConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            shard_capacity: cfg.shard_capacity,
            append_batch_size: cfg.append_batch_size,
        })
    }

    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity
    }

    pub fn append_batch_size(&self) -> usize {
        self.append_batch_size
    }

    /// `ceil(len / capacity)` groups; group `k` holds
    /// `items[k * cap .. min((k + 1) * cap, len)]`.
    pub fn plan_shards(&self, items: &[ItemId]) -> Vec<ShardGroup> {
        let groups: Vec<ShardGroup> = partition(items, self.shard_capacity)
            .into_iter()
            .enumerate()
            .map(|(k, items)| ShardGroup {
                index: k as u64,
                items,
            })
            .collect();
        debug!(items = items.len(), shards = groups.len(), "planned shards");
        groups
    }

    pub fn plan_append_batches(&self, items: &[ItemId]) -> Vec<Vec<ItemId>> {
        partition(items, self.append_batch_size)
    }

    /// Reports, without refusing, an append that would overfill a shard.
    /// The program on the ledger is the final arbiter.
    pub fn check_capacity(
        &self,
        shard: &Pubkey,
        existing: usize,
        appending: usize,
    ) -> Option<RegistryError> {
        let total = existing + appending;
        if total <= self.shard_capacity {
            debug!(%shard, existing, appending, total, "append within capacity");
            return None;
        }
        let overflow = RegistryError::CapacityOverflow {
            shard: *shard,
            total,
            capacity: self.shard_capacity,
        };
        warn!(%shard, existing, appending, "{overflow}, submission may fail");
        Some(overflow)
    }
}
