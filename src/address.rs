//! Deterministic address derivation for shards, pools and per-item vaults.
//!
//! Every function here must agree byte-for-byte with the deployed programs'
//! own derivation; nothing in this module touches the network.

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};
use anchor_lang::prelude::Pubkey;
use sha2::{Digest, Sha256};
use spl_associated_token_account_interface::address::get_associated_token_address_and_bump_seed;

/// Domain suffix mixed into every shard seed.
pub const SHARD_SEED_SUFFIX: &str = "rarity_info";
pub const POOL_SEED: &[u8] = b"pool_info";
pub const AUTHORITY_SEED: &[u8] = b"prove_token_vault";
pub const ITEM_VAULT_SEED: &[u8] = b"nft_vault";

/// Collection and category strings are stored as zero padded `[u8; 16]`.
pub const MAX_SEED_FIELD_LEN: usize = 16;
/// `create_with_seed` accepts at most 32 seed bytes.
pub const SHARD_SEED_LEN: usize = 32;

/// Seed string for a shard account.
///
/// `hex(sha256(hex(collection || category || index || "rarity_info")))`
/// truncated to its first 32 characters. The index is rendered in decimal.
pub fn shard_seed(collection: &str, category: &str, index: u64) -> Result<String> {
    check_seed_field("collection", collection)?;
    check_seed_field("category", category)?;

    let preimage = [
        collection.as_bytes(),
        category.as_bytes(),
        index.to_string().as_bytes(),
        SHARD_SEED_SUFFIX.as_bytes(),
    ]
    .concat();
    let digest = Sha256::digest(hex::encode(preimage).as_bytes());
    let mut seed = hex::encode(digest);
    seed.truncate(SHARD_SEED_LEN);
    Ok(seed)
}

pub fn check_seed_field(field: &'static str, value: &str) -> Result<()> {
    if value.len() > MAX_SEED_FIELD_LEN {
        return Err(RegistryError::SeedTooLong {
            field,
            len: value.len(),
            max: MAX_SEED_FIELD_LEN,
        });
    }
    Ok(())
}

/// Addresses owned by one pool, derived together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAddresses {
    pub pool: Pubkey,
    pub authority: Pubkey,
    pub collateral_vault: Pubkey,
}

/// Addresses touched when one item is staked into a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemVaultAddresses {
    pub vault: Pubkey,
    pub vault_token_account: Pubkey,
}

#[derive(Debug, Clone)]
pub struct AddressResolver {
    rarity_program: Pubkey,
    staking_program: Pubkey,
    token_program: Pubkey,
    associated_token_program: Pubkey,
}

impl AddressResolver {
    pub fn new(cfg: &RegistryConfig) -> Self {
        Self {
            rarity_program: cfg.rarity_program_id,
            staking_program: cfg.staking_program_id,
            token_program: cfg.token_program_id,
            associated_token_program: cfg.associated_token_program_id,
        }
    }

    pub fn rarity_program(&self) -> &Pubkey {
        &self.rarity_program
    }

    pub fn staking_program(&self) -> &Pubkey {
        &self.staking_program
    }

    /// Seeded (non-PDA) address of a shard, owned by the rarity program and
    /// based on the shard's authority.
    pub fn derive_shard_address(
        &self,
        collection: &str,
        category: &str,
        index: u64,
        authority: &Pubkey,
    ) -> Result<Pubkey> {
        let seed = shard_seed(collection, category, index)?;
        Pubkey::create_with_seed(authority, &seed, &self.rarity_program)
            .map_err(|e| RegistryError::Derivation(format!("shard seed {seed}: {e:?}")))
    }

    pub fn derive_pool_address(&self, shard: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[shard.as_ref(), POOL_SEED], &self.staking_program).0
    }

    pub fn derive_authority_address(&self, pool: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[pool.as_ref(), AUTHORITY_SEED], &self.staking_program).0
    }

    /// The authority's associated token account for the collateral mint.
    pub fn derive_collateral_vault_address(&self, authority: &Pubkey, mint: &Pubkey) -> Pubkey {
        self.associated_token_address(authority, mint)
    }

    pub fn derive_pool_addresses(&self, shard: &Pubkey, collateral_mint: &Pubkey) -> PoolAddresses {
        let pool = self.derive_pool_address(shard);
        let authority = self.derive_authority_address(&pool);
        PoolAddresses {
            pool,
            authority,
            collateral_vault: self.derive_collateral_vault_address(&authority, collateral_mint),
        }
    }

    /// Keyed by both item and pool so one item in two pools never collides.
    pub fn derive_item_vault_address(&self, item: &Pubkey, pool: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[item.as_ref(), pool.as_ref(), ITEM_VAULT_SEED],
            &self.staking_program,
        )
        .0
    }

    pub fn derive_item_vault_addresses(&self, item: &Pubkey, pool: &Pubkey) -> ItemVaultAddresses {
        let vault = self.derive_item_vault_address(item, pool);
        ItemVaultAddresses {
            vault,
            vault_token_account: self.associated_token_address(&vault, item),
        }
    }

    pub fn associated_token_address(&self, wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
        get_associated_token_address_and_bump_seed(
            wallet,
            mint,
            &self.associated_token_program,
            &self.token_program,
        )
        .0
    }

    /// Find which index produced `address`, scanning `0..limit`.
    pub fn recover_shard_index(
        &self,
        collection: &str,
        category: &str,
        authority: &Pubkey,
        address: &Pubkey,
        limit: u64,
    ) -> Option<u64> {
        (0..limit).find(|index| {
            self.derive_shard_address(collection, category, *index, authority)
                .map(|derived| derived == *address)
                .unwrap_or(false)
        })
    }

    /// Fails with `AddressMismatch` when a fetched address disagrees with the
    /// locally derived one.
    pub fn verify(kind: &'static str, expected: Pubkey, found: Pubkey) -> Result<()> {
        if expected != found {
            return Err(RegistryError::AddressMismatch {
                kind,
                expected,
                found,
            });
        }
        Ok(())
    }
}
