use crate::errors::Result;
use crate::ops::OperationGroup;
use crate::run_log::RunLogEntry;
use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;

/// Raw account as returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBlob {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// Server-side account filters, in the shape of the RPC `getProgramAccounts`
/// filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    DataSize(u64),
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    pub fn memcmp_pubkey(offset: usize, key: &Pubkey) -> Self {
        AccountFilter::Memcmp {
            offset,
            bytes: key.to_bytes().to_vec(),
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::DataSize(size) => data.len() as u64 == *size,
            AccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset + bytes.len())
                .is_some_and(|window| window == bytes.as_slice()),
        }
    }
}

/// The remote ledger. Implementations own signing and fee payment.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountBlob>>;

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, AccountBlob)>>;

    /// Sign and send one group, returning its transaction signature.
    async fn send_group(&self, group: &OperationGroup) -> Result<String>;

    /// Wait until the transaction is confirmed, or fail if it was rejected.
    async fn confirm(&self, signature: &str) -> Result<()>;
}

/// Append-only audit trail of a run, single writer per run name.
pub trait RunLog: Send {
    fn run_name(&self) -> &str;
    fn append(&mut self, entry: &RunLogEntry) -> Result<()>;
    fn read_all(&self) -> Result<Vec<RunLogEntry>>;
}
