//! In-memory ledger that executes the rarity, staking, system and ATA
//! initializer operations this crate builds. Token balances are not modelled;
//! token accounts only exist or do not.

use crate::account_shard::{
    LayoutAccount, POOL_ACCOUNT_SPACE, PoolAccount, ShardAccount, VAULT_ACCOUNT_SPACE,
    VaultAccount, to_fixed,
};
use crate::address::AddressResolver;
use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};
use crate::ops::{
    AppendArgs, InitializeArgs, Operation, OperationGroup, ata_accounts,
    instruction_discriminator,
};
use crate::pipeline::{pool_init_accounts, shard_accounts, stake_accounts, update_admin_accounts};
use crate::traits::{AccountBlob, AccountFilter, LedgerClient};
use anchor_lang::prelude::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_system_interface::instruction::SystemInstruction;
use std::collections::{BTreeMap, HashSet};

type Accounts = BTreeMap<Pubkey, AccountBlob>;

#[derive(Default)]
struct State {
    accounts: Accounts,
    sends: usize,
    submitted: Vec<String>,
    fail_sends: HashSet<usize>,
    reject_confirmations: bool,
    stall_confirmations: bool,
}

pub struct MockLedger {
    cfg: RegistryConfig,
    resolver: AddressResolver,
    state: Mutex<State>,
}

impl MockLedger {
    pub fn new(cfg: &RegistryConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            resolver: AddressResolver::new(cfg),
            state: Mutex::new(State::default()),
        }
    }

    /// Make the `nth` call to `send_group` (counted from zero across the
    /// ledger's lifetime) fail without applying anything.
    pub fn fail_send(&self, nth: usize) {
        self.state.lock().fail_sends.insert(nth);
    }

    pub fn reject_confirmations(&self, reject: bool) {
        self.state.lock().reject_confirmations = reject;
    }

    /// Confirmation futures never resolve while set.
    pub fn stall_confirmations(&self, stall: bool) {
        self.state.lock().stall_confirmations = stall;
    }

    /// Labels of every group applied so far, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().submitted.clone()
    }

    pub fn account(&self, address: &Pubkey) -> Option<AccountBlob> {
        self.state.lock().accounts.get(address).cloned()
    }

    pub fn insert_account(&self, address: Pubkey, blob: AccountBlob) {
        self.state.lock().accounts.insert(address, blob);
    }

    /// Register a token account so stake operations can reference it.
    pub fn insert_token_account(&self, address: Pubkey, wallet: &Pubkey, mint: &Pubkey) {
        self.insert_account(address, self.token_account(wallet, mint));
    }

    fn token_account(&self, wallet: &Pubkey, mint: &Pubkey) -> AccountBlob {
        AccountBlob {
            owner: self.cfg.token_program_id,
            lamports: 0,
            data: [mint.as_ref(), wallet.as_ref()].concat(),
        }
    }

    fn apply(&self, accounts: &mut Accounts, op: &Operation) -> std::result::Result<(), String> {
        if op.program_id == anchor_lang::system_program::ID {
            self.apply_system(accounts, op)
        } else if op.program_id == self.cfg.ata_init_program_id {
            let ata = key(op, ata_accounts::ATA)?;
            let wallet = key(op, ata_accounts::WALLET)?;
            let mint = key(op, ata_accounts::MINT)?;
            if self.resolver.associated_token_address(&wallet, &mint) != ata {
                return Err(format!("{ata} is not the associated account of {wallet}"));
            }
            accounts
                .entry(ata)
                .or_insert_with(|| self.token_account(&wallet, &mint));
            Ok(())
        } else if op.program_id == self.cfg.rarity_program_id {
            self.apply_rarity(accounts, op)
        } else if op.program_id == self.cfg.staking_program_id {
            self.apply_staking(accounts, op)
        } else {
            Err(format!("unknown program {}", op.program_id))
        }
    }

    fn apply_system(&self, accounts: &mut Accounts, op: &Operation) -> std::result::Result<(), String> {
        let ix = bincode::deserialize::<SystemInstruction>(&op.data).map_err(|e| e.to_string())?;
        let (base, seed, lamports, space, owner) = match ix {
            SystemInstruction::CreateAccountWithSeed {
                base,
                seed,
                lamports,
                space,
                owner,
            } => (base, seed, lamports, space, owner),
            other => return Err(format!("unsupported system instruction {other:?}")),
        };
        let to = key(op, 1)?;
        let expected =
            Pubkey::create_with_seed(&base, &seed, &owner).map_err(|e| format!("{e:?}"))?;
        if expected != to {
            return Err(format!("create_with_seed mismatch: {expected} != {to}"));
        }
        if accounts.contains_key(&to) {
            return Err(format!("account {to} already in use"));
        }
        accounts.insert(
            to,
            AccountBlob {
                owner,
                lamports,
                data: vec![0; space as usize],
            },
        );
        Ok(())
    }

    fn apply_rarity(&self, accounts: &mut Accounts, op: &Operation) -> std::result::Result<(), String> {
        let (tag, mut args) = op.data.split_at(8.min(op.data.len()));
        let admin = key(op, shard_accounts::ADMIN)?;

        if tag == instruction_discriminator("initialize") {
            let args = InitializeArgs::deserialize(&mut args).map_err(|e| e.to_string())?;
            let shard = key(op, shard_accounts::SHARD)?;
            let derived = self
                .resolver
                .derive_shard_address(&args.collection, &args.category, args.index, &admin)
                .map_err(|e| e.to_string())?;
            if derived != shard {
                return Err("RarityInfo verification failed".into());
            }
            let blob = accounts.get_mut(&shard).ok_or("shard account not allocated")?;
            if blob.data.iter().take(8).any(|b| *b != 0) {
                return Err("shard already initialized".into());
            }
            let account = ShardAccount {
                admin,
                collection: to_fixed(&args.collection),
                category: to_fixed(&args.category),
                items: Vec::new(),
            };
            blob.data = account.encode(blob.data.len()).map_err(|e| e.to_string())?;
            Ok(())
        } else if tag == instruction_discriminator("append_list") {
            let args = AppendArgs::deserialize(&mut args).map_err(|e| e.to_string())?;
            let shard = key(op, shard_accounts::SHARD)?;
            let blob = accounts.get_mut(&shard).ok_or("shard not found")?;
            let mut account = ShardAccount::decode(&blob.data).map_err(|e| e.to_string())?;
            if account.admin != admin {
                return Err("admin constraint violated".into());
            }
            account.items.extend(args.items);
            let space = blob.data.len();
            let data = account.encode(space).map_err(|e| e.to_string())?;
            if data.len() > space || account.items.len() > self.cfg.shard_capacity {
                return Err(format!("shard {shard} is full"));
            }
            blob.data = data;
            Ok(())
        } else if tag == instruction_discriminator("update_admin") {
            let target = key(op, update_admin_accounts::TARGET)?;
            let new_admin = key(op, update_admin_accounts::NEW_ADMIN)?;
            let blob = accounts.get_mut(&target).ok_or("shard not found")?;
            let mut account = ShardAccount::decode(&blob.data).map_err(|e| e.to_string())?;
            if account.admin != admin {
                return Err("admin constraint violated".into());
            }
            account.admin = new_admin;
            blob.data = account.encode(blob.data.len()).map_err(|e| e.to_string())?;
            Ok(())
        } else {
            Err("unknown rarity instruction".into())
        }
    }

    fn apply_staking(&self, accounts: &mut Accounts, op: &Operation) -> std::result::Result<(), String> {
        let (tag, mut args) = op.data.split_at(8.min(op.data.len()));

        if tag == instruction_discriminator("initialize") {
            let args = InitializeArgs::deserialize(&mut args).map_err(|e| e.to_string())?;
            let admin = key(op, pool_init_accounts::ADMIN)?;
            let mint = key(op, pool_init_accounts::COLLATERAL_MINT)?;
            let shard = key(op, pool_init_accounts::SHARD)?;
            let pool = key(op, pool_init_accounts::POOL)?;
            let addrs = self.resolver.derive_pool_addresses(&shard, &mint);
            if addrs.pool != pool
                || addrs.authority != key(op, pool_init_accounts::AUTHORITY)?
                || addrs.collateral_vault != key(op, pool_init_accounts::COLLATERAL_VAULT)?
            {
                return Err("pool address verification failed".into());
            }
            let derived = self
                .resolver
                .derive_shard_address(&args.collection, &args.category, args.index, &admin)
                .map_err(|e| e.to_string())?;
            if derived != shard {
                return Err("RarityInfo verification failed".into());
            }
            if !accounts.contains_key(&addrs.collateral_vault) {
                return Err("collateral vault does not exist".into());
            }
            if accounts.contains_key(&pool) {
                return Err(format!("pool {pool} already in use"));
            }
            let shard_account = decode_at::<ShardAccount>(accounts, &shard)?;
            let account = PoolAccount {
                admin,
                collateral_authority: addrs.authority,
                collateral_vault: addrs.collateral_vault,
                collateral_mint: mint,
                shard,
                item_count: shard_account.items.len() as u64,
                locked_count: 0,
            };
            self.store(accounts, pool, &account, POOL_ACCOUNT_SPACE)
        } else if tag == instruction_discriminator("stake") {
            let user = key(op, stake_accounts::USER)?;
            let pool_key = key(op, stake_accounts::POOL)?;
            let mint = key(op, stake_accounts::ITEM_MINT)?;
            let vault = key(op, stake_accounts::ITEM_VAULT)?;
            let mut pool = decode_at::<PoolAccount>(accounts, &pool_key)?;
            if pool.shard != key(op, stake_accounts::SHARD)? {
                return Err("shard constraint violated".into());
            }
            let shard = decode_at::<ShardAccount>(accounts, &pool.shard)?;
            if !shard.items.contains(&mint) {
                return Err("Mint not found in allowed mint list.".into());
            }
            if vault != self.resolver.derive_item_vault_address(&mint, &pool_key) {
                return Err("item vault seeds constraint violated".into());
            }
            if accounts.contains_key(&vault) {
                return Err(format!("item vault {vault} already in use"));
            }
            for required in [stake_accounts::VAULT_TOKEN_ACCOUNT, stake_accounts::USER_COLLATERAL] {
                let address = key(op, required)?;
                if !accounts.contains_key(&address) {
                    return Err(format!("token account {address} does not exist"));
                }
            }
            let record = VaultAccount {
                owner: user,
                pool: pool_key,
                item: mint,
            };
            self.store(accounts, vault, &record, VAULT_ACCOUNT_SPACE)?;
            pool.locked_count += 1;
            self.store(accounts, pool_key, &pool, POOL_ACCOUNT_SPACE)
        } else if tag == instruction_discriminator("unstake") {
            let user = key(op, stake_accounts::USER)?;
            let pool_key = key(op, stake_accounts::POOL)?;
            let vault = key(op, stake_accounts::ITEM_VAULT)?;
            let record = decode_at::<VaultAccount>(accounts, &vault)?;
            if record.owner != user || record.pool != pool_key {
                return Err("vault constraint violated".into());
            }
            let mut pool = decode_at::<PoolAccount>(accounts, &pool_key)?;
            pool.locked_count = pool
                .locked_count
                .checked_sub(1)
                .ok_or("locked count underflow")?;
            accounts.remove(&vault);
            accounts.remove(&key(op, stake_accounts::VAULT_TOKEN_ACCOUNT)?);
            self.store(accounts, pool_key, &pool, POOL_ACCOUNT_SPACE)
        } else if tag == instruction_discriminator("update_admin") {
            let admin = key(op, update_admin_accounts::ADMIN)?;
            let target = key(op, update_admin_accounts::TARGET)?;
            let mut pool = decode_at::<PoolAccount>(accounts, &target)?;
            if pool.admin != admin {
                return Err("admin constraint violated".into());
            }
            pool.admin = key(op, update_admin_accounts::NEW_ADMIN)?;
            self.store(accounts, target, &pool, POOL_ACCOUNT_SPACE)
        } else {
            Err("unknown staking instruction".into())
        }
    }

    fn store<T: LayoutAccount>(
        &self,
        accounts: &mut Accounts,
        address: Pubkey,
        account: &T,
        space: usize,
    ) -> std::result::Result<(), String> {
        let data = account.encode(space).map_err(|e| e.to_string())?;
        let lamports = rent_exempt(space);
        accounts.insert(
            address,
            AccountBlob {
                owner: self.cfg.staking_program_id,
                lamports,
                data,
            },
        );
        Ok(())
    }
}

fn rent_exempt(space: usize) -> u64 {
    crate::account_shard::rent_exempt_lamports(space)
}

fn key(op: &Operation, position: usize) -> std::result::Result<Pubkey, String> {
    op.account(position)
        .copied()
        .ok_or_else(|| format!("missing account #{position}"))
}

fn decode_at<T: LayoutAccount>(accounts: &Accounts, address: &Pubkey) -> std::result::Result<T, String> {
    let blob = accounts
        .get(address)
        .ok_or_else(|| format!("account {address} not found"))?;
    T::decode(&blob.data).map_err(|e| e.to_string())
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountBlob>> {
        Ok(self.account(address))
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, AccountBlob)>> {
        let state = self.state.lock();
        Ok(state
            .accounts
            .iter()
            .filter(|(_, blob)| blob.owner == *program_id)
            .filter(|(_, blob)| filters.iter().all(|f| f.matches(&blob.data)))
            .map(|(address, blob)| (*address, blob.clone()))
            .collect())
    }

    async fn send_group(&self, group: &OperationGroup) -> Result<String> {
        let mut state = self.state.lock();
        let nth = state.sends;
        state.sends += 1;
        if state.fail_sends.remove(&nth) {
            return Err(RegistryError::Rpc(format!("injected failure on send #{nth}")));
        }

        // All or nothing, like a transaction.
        let mut staged = state.accounts.clone();
        for (i, op) in group.operations.iter().enumerate() {
            self.apply(&mut staged, op).map_err(|reason| {
                RegistryError::Rpc(format!("{}: operation {i} rejected: {reason}", group.label))
            })?;
        }
        state.accounts = staged;
        state.submitted.push(group.label.clone());
        Ok(format!("mock-sig-{nth}"))
    }

    async fn confirm(&self, signature: &str) -> Result<()> {
        let (stall, reject) = {
            let state = self.state.lock();
            (state.stall_confirmations, state.reject_confirmations)
        };
        if stall {
            std::future::pending::<()>().await;
        }
        if reject {
            return Err(RegistryError::Rpc(format!("{signature} was not confirmed")));
        }
        Ok(())
    }
}
