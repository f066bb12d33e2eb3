//! Resolving which shard owns an item.

use crate::shard::{ItemId, ShardRecord};
use anchor_lang::prelude::Pubkey;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemMatch {
    pub item: ItemId,
    pub shard: Pubkey,
}

/// For each item, the first shard in scan order whose list contains it.
/// Unmatched items are omitted.
///
/// O(shards x items). Fine for tens of shards; use [`ShardIndex`] when the
/// same shard set answers many queries.
pub fn match_items_to_shards(items: &[ItemId], shards: &[ShardRecord]) -> Vec<ItemMatch> {
    items
        .iter()
        .filter_map(|item| {
            shards.iter().find(|shard| shard.contains(item)).map(|shard| ItemMatch {
                item: *item,
                shard: shard.address,
            })
        })
        .collect()
}

/// Items present in more than one shard, with every shard that lists them,
/// in scan order. Empty for a well-formed registry.
pub fn find_duplicate_items(shards: &[ShardRecord]) -> Vec<(ItemId, Vec<Pubkey>)> {
    let mut owners: HashMap<ItemId, Vec<Pubkey>> = HashMap::new();
    let mut order = Vec::new();
    for shard in shards {
        for item in &shard.items {
            let entry = owners.entry(*item).or_default();
            if entry.is_empty() {
                order.push(*item);
            }
            if !entry.contains(&shard.address) {
                entry.push(shard.address);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|item| {
            let shards = owners.remove(&item)?;
            (shards.len() > 1).then_some((item, shards))
        })
        .collect()
}

/// Item to shard lookup built once per read cycle.
#[derive(Debug, Clone, Default)]
pub struct ShardIndex {
    owners: HashMap<ItemId, Pubkey>,
}

impl ShardIndex {
    /// First shard in scan order wins, matching [`match_items_to_shards`].
    pub fn build(shards: &[ShardRecord]) -> Self {
        let mut owners = HashMap::new();
        for shard in shards {
            for item in &shard.items {
                owners.entry(*item).or_insert(shard.address);
            }
        }
        Self { owners }
    }

    pub fn shard_of(&self, item: &ItemId) -> Option<Pubkey> {
        self.owners.get(item).copied()
    }

    pub fn match_items(&self, items: &[ItemId]) -> Vec<ItemMatch> {
        items
            .iter()
            .filter_map(|item| {
                self.shard_of(item).map(|shard| ItemMatch {
                    item: *item,
                    shard,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
