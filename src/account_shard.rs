//! Byte layouts of the rarity and staking program accounts, and their sizing.

use crate::address::MAX_SEED_FIELD_LEN;
use crate::errors::{RegistryError, Result};
use anchor_lang::prelude::*;
use sha2::{Digest, Sha256};

pub const DISCRIMINATOR_LEN: usize = 8;

/// Allocated size of a pool account: discriminator + 5 keys + 2 counters.
pub const POOL_ACCOUNT_SPACE: usize = DISCRIMINATOR_LEN + 32 * 5 + 8 + 8;
/// Allocated size of a per-item vault account: discriminator + 3 keys.
pub const VAULT_ACCOUNT_SPACE: usize = DISCRIMINATOR_LEN + 32 * 3;
/// Byte offset of the staking user inside a vault account.
pub const VAULT_OWNER_OFFSET: usize = DISCRIMINATOR_LEN;
/// Byte offset of the pool back-reference inside a vault account.
pub const VAULT_POOL_OFFSET: usize = DISCRIMINATOR_LEN + 32;

/// Size to allocate for a shard able to hold `capacity` items.
/// - 8: discriminator
/// - 32: admin
/// - 16 + 16: collection and category
/// - 4: borsh vec length prefix
pub fn shard_account_space(capacity: usize) -> usize {
    DISCRIMINATOR_LEN + 32 + MAX_SEED_FIELD_LEN * 2 + 4 + capacity * 32
}

/// Rent-exempt balance for an account of `space` bytes.
pub fn rent_exempt_lamports(space: usize) -> u64 {
    Rent::default().minimum_balance(space)
}

/// Anchor's account discriminator: `sha256("account:<Name>")[..8]`.
pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("account:{name}").as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

pub fn to_fixed(value: &str) -> [u8; MAX_SEED_FIELD_LEN] {
    let src = value.as_bytes();
    let len = src.len().min(MAX_SEED_FIELD_LEN);
    let mut out = [0u8; MAX_SEED_FIELD_LEN];
    out[..len].copy_from_slice(&src[..len]);
    out
}

pub fn from_fixed(raw: &[u8; MAX_SEED_FIELD_LEN]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// An account stored behind an Anchor discriminator.
pub trait LayoutAccount: AnchorSerialize + AnchorDeserialize + Sized {
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        account_discriminator(Self::NAME)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(RegistryError::Decode {
                account: Self::NAME,
                reason: format!("{} bytes is shorter than the discriminator", data.len()),
            });
        }
        if data[..DISCRIMINATOR_LEN] != Self::discriminator() {
            return Err(RegistryError::Decode {
                account: Self::NAME,
                reason: "discriminator mismatch".to_string(),
            });
        }
        let mut body = &data[DISCRIMINATOR_LEN..];
        Self::deserialize(&mut body).map_err(|e| RegistryError::Decode {
            account: Self::NAME,
            reason: e.to_string(),
        })
    }

    /// Serialized bytes, zero padded up to `space`.
    fn encode(&self, space: usize) -> Result<Vec<u8>> {
        let mut buf = Self::discriminator().to_vec();
        self.serialize(&mut buf)?;
        if buf.len() < space {
            buf.resize(space, 0);
        }
        Ok(buf)
    }
}

/// The rarity program's `RarityInfo` account: one shard.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq)]
pub struct ShardAccount {
    pub admin: Pubkey,
    pub collection: [u8; MAX_SEED_FIELD_LEN],
    pub category: [u8; MAX_SEED_FIELD_LEN],
    pub items: Vec<Pubkey>,
}

impl LayoutAccount for ShardAccount {
    const NAME: &'static str = "RarityInfo";
}

/// The staking program's `PoolInfo` account.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq)]
pub struct PoolAccount {
    pub admin: Pubkey,
    pub collateral_authority: Pubkey,
    pub collateral_vault: Pubkey,
    pub collateral_mint: Pubkey,
    pub shard: Pubkey,
    pub item_count: u64,
    pub locked_count: u64,
}

impl LayoutAccount for PoolAccount {
    const NAME: &'static str = "PoolInfo";
}

/// The staking program's `NftVaultAccount`, one per staked item.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq)]
pub struct VaultAccount {
    pub owner: Pubkey,
    pub pool: Pubkey,
    pub item: Pubkey,
}

impl LayoutAccount for VaultAccount {
    const NAME: &'static str = "NftVaultAccount";
}
