//! Registry configuration: program ids and the constants shared with the
//! deployed programs.

use crate::errors::{RegistryError, Result};
use anchor_lang::prelude::Pubkey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const RARITY_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("NFTRnyHzbhLx7XWc9PBKJyP68zFsjwNbUtmYTHc1ow3");
pub const STAKING_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("NFTS4eKECWLtMmzoo2FJH7Zkoj2jxU8PJicCViyuVGh");
pub const TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
/// Creates an associated token account and succeeds when it already exists.
pub const ATA_INIT_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("9tiP8yZcekzfGzSBmp7n9LaDHRjxP2w7wJj8tpPJtfG");

/// Items per shard account (stack 4kb / heap 32kb limit of the rarity program).
pub const SHARD_CAPACITY: usize = 512;
/// Items per append message (1232 byte transaction limit).
pub const APPEND_BATCH_SIZE: usize = 28;
/// Account creations bundled into one group ahead of stake operations.
pub const ACCOUNT_CREATION_FANOUT: usize = 4;

/// Immutable settings handed to every component at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    #[serde(with = "pubkey_str")]
    pub rarity_program_id: Pubkey,
    #[serde(with = "pubkey_str")]
    pub staking_program_id: Pubkey,
    #[serde(with = "pubkey_str")]
    pub token_program_id: Pubkey,
    #[serde(with = "pubkey_str")]
    pub associated_token_program_id: Pubkey,
    #[serde(with = "pubkey_str")]
    pub ata_init_program_id: Pubkey,
    pub shard_capacity: usize,
    pub append_batch_size: usize,
    pub account_creation_fanout: usize,
    pub max_concurrent_reads: usize,
    pub confirmation_timeout_secs: u64,
    pub run_log_dir: PathBuf,
    pub max_index_scan: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rarity_program_id: RARITY_PROGRAM_ID,
            staking_program_id: STAKING_PROGRAM_ID,
            token_program_id: TOKEN_PROGRAM_ID,
            associated_token_program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
            ata_init_program_id: ATA_INIT_PROGRAM_ID,
            shard_capacity: SHARD_CAPACITY,
            append_batch_size: APPEND_BATCH_SIZE,
            account_creation_fanout: ACCOUNT_CREATION_FANOUT,
            max_concurrent_reads: 8,
            confirmation_timeout_secs: 300,
            run_log_dir: PathBuf::from("output"),
            max_index_scan: 64,
        }
    }
}

impl RegistryConfig {
    /// Parse a TOML document; omitted keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| RegistryError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("shard_capacity", self.shard_capacity),
            ("append_batch_size", self.append_batch_size),
            ("account_creation_fanout", self.account_creation_fanout),
            ("max_concurrent_reads", self.max_concurrent_reads),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, v)| *v == 0) {
            return Err(RegistryError::Config(format!("{name} must be greater than zero")));
        }
        if self.append_batch_size > self.shard_capacity {
            return Err(RegistryError::Config(format!(
                "append_batch_size ({}) exceeds shard_capacity ({})",
                self.append_batch_size, self.shard_capacity
            )));
        }
        Ok(())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

mod pubkey_str {
    use anchor_lang::prelude::Pubkey;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(d)?;
        Pubkey::from_str(&raw).map_err(|e| D::Error::custom(format!("{raw}: {e}")))
    }
}
