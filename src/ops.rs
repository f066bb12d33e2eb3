//! Primitive operations and the atomically submitted groups they form.

use crate::errors::Result;
use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use sha2::{Digest, Sha256};
use solana_system_interface::instruction as system_instruction;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccountRef {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountRef {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// One program invocation.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountRef>,
    pub data: Vec<u8>,
}

impl Operation {
    pub fn account(&self, position: usize) -> Option<&Pubkey> {
        self.accounts.get(position).map(|a| &a.pubkey)
    }
}

impl From<Instruction> for Operation {
    fn from(ix: Instruction) -> Self {
        Operation {
            program_id: ix.program_id,
            accounts: ix
                .accounts
                .into_iter()
                .map(|meta| AccountRef {
                    pubkey: meta.pubkey,
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
                .collect(),
            data: ix.data,
        }
    }
}

impl From<Operation> for Instruction {
    fn from(op: Operation) -> Self {
        Instruction {
            program_id: op.program_id,
            accounts: op
                .accounts
                .into_iter()
                .map(|a| {
                    if a.is_writable {
                        AccountMeta::new(a.pubkey, a.is_signer)
                    } else {
                        AccountMeta::new_readonly(a.pubkey, a.is_signer)
                    }
                })
                .collect(),
            data: op.data,
        }
    }
}

/// The smallest unit submitted atomically: one ledger transaction.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct OperationGroup {
    pub label: String,
    pub operations: Vec<Operation>,
}

impl OperationGroup {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            operations: Vec::new(),
        }
    }

    pub fn with(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.operations.iter().cloned().map(Instruction::from).collect()
    }

    /// Borsh encoding of the group; this is what the run log records.
    pub fn wire_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(&mut buf)?;
        Ok(buf)
    }
}

/// Anchor's instruction discriminator: `sha256("global:<name>")[..8]`.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Instruction data for an Anchor method: discriminator followed by borsh args.
pub fn anchor_data<A: AnchorSerialize>(name: &str, args: &A) -> Result<Vec<u8>> {
    let mut data = instruction_discriminator(name).to_vec();
    args.serialize(&mut data)?;
    Ok(data)
}

/// Arguments shared by the rarity and staking `initialize` methods.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct InitializeArgs {
    pub collection: String,
    pub category: String,
    pub index: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct AppendArgs {
    pub items: Vec<Pubkey>,
}

/// System program `CreateAccountWithSeed`, with `base == from`.
pub fn create_account_with_seed(
    from: &Pubkey,
    to: &Pubkey,
    seed: &str,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Operation {
    system_instruction::create_account_with_seed(from, to, from, seed, lamports, space, owner).into()
}

/// Associated token account creation that does not fail when the account
/// already exists.
pub fn create_ata_unchecked(
    init_program: &Pubkey,
    payer: &Pubkey,
    ata: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
    associated_token_program: &Pubkey,
) -> Operation {
    Operation {
        program_id: *init_program,
        accounts: vec![
            AccountRef::writable(*payer, true),
            AccountRef::writable(*ata, false),
            AccountRef::writable(*wallet, false),
            AccountRef::readonly(*mint, false),
            AccountRef::readonly(anchor_lang::system_program::ID, false),
            AccountRef::readonly(*token_program, false),
            AccountRef::readonly(anchor_lang::solana_program::sysvar::rent::ID, false),
            AccountRef::readonly(*associated_token_program, false),
        ],
        data: Vec::new(),
    }
}

/// Account positions inside [`create_ata_unchecked`].
pub mod ata_accounts {
    pub const ATA: usize = 1;
    pub const WALLET: usize = 2;
    pub const MINT: usize = 3;
}
