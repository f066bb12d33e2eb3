//! Builds the ordered operation groups for each registry action.

use crate::account_shard::{rent_exempt_lamports, shard_account_space};
use crate::address::AddressResolver;
use crate::config::RegistryConfig;
use crate::errors::Result;
use crate::ops::{
    AccountRef, AppendArgs, InitializeArgs, Operation, OperationGroup, anchor_data,
    create_account_with_seed, create_ata_unchecked,
};
use crate::planner::{CapacityPlanner, partition};
use crate::shard::{ItemId, PoolRecord, ShardSpec};
use anchor_lang::prelude::Pubkey;
use tracing::debug;

/// Account positions of the rarity program's `initialize` and `append_list`.
pub mod shard_accounts {
    pub const ADMIN: usize = 0;
    pub const SHARD: usize = 1;
}

/// Account positions of `update_admin` in both programs.
pub mod update_admin_accounts {
    pub const ADMIN: usize = 0;
    pub const NEW_ADMIN: usize = 1;
    pub const TARGET: usize = 2;
}

/// Account positions of the staking program's `initialize`.
pub mod pool_init_accounts {
    pub const ADMIN: usize = 0;
    pub const COLLATERAL_MINT: usize = 1;
    pub const AUTHORITY: usize = 3;
    pub const COLLATERAL_VAULT: usize = 4;
    pub const POOL: usize = 5;
    pub const SHARD: usize = 6;
}

/// Account positions shared by `stake` and `unstake`.
pub mod stake_accounts {
    pub const USER: usize = 0;
    pub const POOL: usize = 1;
    pub const ITEM_MINT: usize = 3;
    pub const SHARD: usize = 4;
    pub const VAULT_TOKEN_ACCOUNT: usize = 6;
    pub const USER_COLLATERAL: usize = 7;
    pub const ITEM_VAULT: usize = 10;
}

/// An item to stake and the user's token account currently holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeItem {
    pub mint: ItemId,
    pub token_account: Pubkey,
}

#[derive(Debug, Clone)]
pub struct BatchPipeline {
    cfg: RegistryConfig,
    resolver: AddressResolver,
    planner: CapacityPlanner,
}

impl BatchPipeline {
    pub fn new(cfg: &RegistryConfig) -> Result<Self> {
        Ok(Self {
            cfg: cfg.clone(),
            resolver: AddressResolver::new(cfg),
            planner: CapacityPlanner::new(cfg)?,
        })
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    pub fn planner(&self) -> &CapacityPlanner {
        &self.planner
    }

    /// Allocate the shard account at its seeded address and initialize it.
    pub fn build_create_shard(&self, shard: &ShardSpec) -> Result<OperationGroup> {
        let space = shard_account_space(self.cfg.shard_capacity);
        let allocate = create_account_with_seed(
            &shard.admin,
            &shard.address,
            &shard.seed,
            rent_exempt_lamports(space),
            space as u64,
            &self.cfg.rarity_program_id,
        );
        let initialize = Operation {
            program_id: self.cfg.rarity_program_id,
            accounts: vec![
                AccountRef::readonly(shard.admin, true),
                AccountRef::writable(shard.address, false),
            ],
            data: anchor_data(
                "initialize",
                &InitializeArgs {
                    collection: shard.collection.clone(),
                    category: shard.category.clone(),
                    index: shard.index,
                },
            )?,
        };
        Ok(OperationGroup::new(format!("create-shard:{}", shard.address))
            .with(allocate)
            .with(initialize))
    }

    /// One group per message-sized batch. Overfilling the shard is reported
    /// as a warning only.
    pub fn build_append(
        &self,
        shard: &Pubkey,
        admin: &Pubkey,
        existing_len: usize,
        items: &[ItemId],
    ) -> Result<Vec<OperationGroup>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.planner.check_capacity(shard, existing_len, items.len());

        self.planner
            .plan_append_batches(items)
            .into_iter()
            .enumerate()
            .map(|(k, batch)| {
                let op = Operation {
                    program_id: self.cfg.rarity_program_id,
                    accounts: vec![
                        AccountRef::readonly(*admin, true),
                        AccountRef::writable(*shard, false),
                    ],
                    data: anchor_data("append_list", &AppendArgs { items: batch })?,
                };
                Ok(OperationGroup::new(format!("append:{shard}:{k}")).with(op))
            })
            .collect()
    }

    /// Creation of a fresh shard followed by appending all of its items.
    pub fn build_shard_with_items(&self, shard: &ShardSpec) -> Result<Vec<OperationGroup>> {
        let mut groups = vec![self.build_create_shard(shard)?];
        groups.extend(self.build_append(&shard.address, &shard.admin, 0, &shard.items)?);
        debug!(shard = %shard.address, groups = groups.len(), "built shard groups");
        Ok(groups)
    }

    /// Create the collateral vault and initialize the pool in one group.
    pub fn build_create_pool(
        &self,
        shard: &ShardSpec,
        collateral_mint: &Pubkey,
    ) -> Result<OperationGroup> {
        let addrs = self.resolver.derive_pool_addresses(&shard.address, collateral_mint);
        let admin_collateral = self
            .resolver
            .associated_token_address(&shard.admin, collateral_mint);

        let create_vault = self.create_ata(&shard.admin, &addrs.authority, collateral_mint);
        let initialize = Operation {
            program_id: self.cfg.staking_program_id,
            accounts: vec![
                AccountRef::writable(shard.admin, true),
                AccountRef::readonly(*collateral_mint, false),
                AccountRef::writable(admin_collateral, false),
                AccountRef::writable(addrs.authority, false),
                AccountRef::writable(addrs.collateral_vault, false),
                AccountRef::writable(addrs.pool, false),
                AccountRef::readonly(shard.address, false),
                AccountRef::readonly(self.cfg.rarity_program_id, false),
                AccountRef::readonly(anchor_lang::system_program::ID, false),
                AccountRef::readonly(self.cfg.token_program_id, false),
            ],
            data: anchor_data(
                "initialize",
                &InitializeArgs {
                    collection: shard.collection.clone(),
                    category: shard.category.clone(),
                    index: shard.index,
                },
            )?,
        };
        Ok(OperationGroup::new(format!("create-pool:{}", addrs.pool))
            .with(create_vault)
            .with(initialize))
    }

    /// Account-creation groups (fan-out bounded) followed by one stake group
    /// per item.
    pub fn build_stake(
        &self,
        pool: &PoolRecord,
        user: &Pubkey,
        items: &[StakeItem],
    ) -> Result<Vec<OperationGroup>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let user_collateral = self
            .resolver
            .associated_token_address(user, &pool.collateral_mint);

        let mut creations = vec![self.create_ata(user, user, &pool.collateral_mint)];
        let mut stakes = Vec::with_capacity(items.len());
        for item in items {
            let vault = self
                .resolver
                .derive_item_vault_addresses(&item.mint, &pool.address);
            creations.push(self.create_ata(user, &vault.vault, &item.mint));

            let stake = Operation {
                program_id: self.cfg.staking_program_id,
                accounts: vec![
                    AccountRef::writable(*user, true),
                    AccountRef::writable(pool.address, false),
                    AccountRef::readonly(pool.collateral_mint, false),
                    AccountRef::readonly(item.mint, false),
                    AccountRef::readonly(pool.shard, false),
                    AccountRef::writable(item.token_account, false),
                    AccountRef::writable(vault.vault_token_account, false),
                    AccountRef::writable(user_collateral, false),
                    AccountRef::writable(pool.collateral_authority, false),
                    AccountRef::writable(pool.collateral_vault, false),
                    AccountRef::writable(vault.vault, false),
                    AccountRef::readonly(anchor_lang::system_program::ID, false),
                    AccountRef::readonly(self.cfg.token_program_id, false),
                ],
                data: anchor_data("stake", &())?,
            };
            stakes.push(OperationGroup::new(format!("stake:{}", item.mint)).with(stake));
        }

        let mut groups: Vec<OperationGroup> =
            partition(&creations, self.cfg.account_creation_fanout)
                .into_iter()
                .enumerate()
                .map(|(k, ops)| OperationGroup {
                    label: format!("create-accounts:{}:{k}", pool.address),
                    operations: ops,
                })
                .collect();
        groups.extend(stakes);
        debug!(pool = %pool.address, %user, items = items.len(), groups = groups.len(), "built stake groups");
        Ok(groups)
    }

    /// One group per item: ensure the user's token account, then unstake.
    pub fn build_unstake(
        &self,
        pool: &PoolRecord,
        user: &Pubkey,
        items: &[ItemId],
    ) -> Result<Vec<OperationGroup>> {
        let user_collateral = self
            .resolver
            .associated_token_address(user, &pool.collateral_mint);

        items
            .iter()
            .map(|mint| {
                let user_item_account = self.resolver.associated_token_address(user, mint);
                let vault = self.resolver.derive_item_vault_addresses(mint, &pool.address);
                let unstake = Operation {
                    program_id: self.cfg.staking_program_id,
                    accounts: vec![
                        AccountRef::writable(*user, true),
                        AccountRef::writable(pool.address, false),
                        AccountRef::readonly(pool.collateral_mint, false),
                        AccountRef::readonly(*mint, false),
                        AccountRef::readonly(pool.shard, false),
                        AccountRef::writable(user_item_account, false),
                        AccountRef::writable(vault.vault_token_account, false),
                        AccountRef::writable(user_collateral, false),
                        AccountRef::writable(pool.collateral_authority, false),
                        AccountRef::writable(pool.collateral_vault, false),
                        AccountRef::writable(vault.vault, false),
                        AccountRef::readonly(self.cfg.token_program_id, false),
                    ],
                    data: anchor_data("unstake", &())?,
                };
                Ok(OperationGroup::new(format!("unstake:{mint}"))
                    .with(self.create_ata(user, user, mint))
                    .with(unstake))
            })
            .collect()
    }

    pub fn build_update_shard_admin(
        &self,
        shard: &Pubkey,
        admin: &Pubkey,
        new_admin: &Pubkey,
    ) -> Result<OperationGroup> {
        let op = self.update_admin(self.cfg.rarity_program_id, shard, admin, new_admin)?;
        Ok(OperationGroup::new(format!("update-shard-admin:{shard}")).with(op))
    }

    pub fn build_update_pool_admin(
        &self,
        pool: &PoolRecord,
        new_admin: &Pubkey,
    ) -> Result<OperationGroup> {
        let op = self.update_admin(
            self.cfg.staking_program_id,
            &pool.address,
            &pool.admin,
            new_admin,
        )?;
        Ok(OperationGroup::new(format!("update-pool-admin:{}", pool.address)).with(op))
    }

    fn update_admin(
        &self,
        program_id: Pubkey,
        target: &Pubkey,
        admin: &Pubkey,
        new_admin: &Pubkey,
    ) -> Result<Operation> {
        Ok(Operation {
            program_id,
            accounts: vec![
                AccountRef::readonly(*admin, true),
                AccountRef::readonly(*new_admin, false),
                AccountRef::writable(*target, false),
            ],
            data: anchor_data("update_admin", &())?,
        })
    }

    fn create_ata(&self, payer: &Pubkey, wallet: &Pubkey, mint: &Pubkey) -> Operation {
        let ata = self.resolver.associated_token_address(wallet, mint);
        create_ata_unchecked(
            &self.cfg.ata_init_program_id,
            payer,
            &ata,
            wallet,
            mint,
            &self.cfg.token_program_id,
            &self.cfg.associated_token_program_id,
        )
    }
}
