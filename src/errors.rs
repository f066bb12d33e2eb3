use anchor_lang::prelude::Pubkey;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised while deriving, planning, submitting or reading registry state.
///
/// Derivation, planning and decoding errors are local: they are raised before
/// any network call and indicate a programming or input error. Submission
/// errors carry the run name and group index needed to resume.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("shard {shard} would hold {total} items, capacity is {capacity}")]
    CapacityOverflow {
        shard: Pubkey,
        total: usize,
        capacity: usize,
    },

    #[error("{kind} address mismatch: derived {expected}, found {found}")]
    AddressMismatch {
        kind: &'static str,
        expected: Pubkey,
        found: Pubkey,
    },

    #[error("run `{run}` failed at group {index}: {cause}")]
    SubmissionFailure {
        run: String,
        index: usize,
        cause: String,
    },

    #[error("run `{run}` timed out confirming group {index} after {after_secs}s")]
    ConfirmationTimeout {
        run: String,
        index: usize,
        after_secs: u64,
    },

    /// The run log could not be written while group `index` was in flight.
    /// When `sent` is set the group may already be applied on the ledger.
    #[error("run `{run}` could not record group {index} (sent: {sent}): {cause}")]
    RunLogWrite {
        run: String,
        index: usize,
        sent: bool,
        cause: String,
    },

    #[error("seed `{field}` is {len} bytes, at most {max} allowed")]
    SeedTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("address derivation failed: {0}")]
    Derivation(String),

    #[error("invalid item id `{0}`")]
    InvalidItemId(String),

    #[error("failed to decode {account} account: {reason}")]
    Decode {
        account: &'static str,
        reason: String,
    },

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("pool {0} is invalid: {1}")]
    InvalidPool(Pubkey, String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("run log error: {0}")]
    RunLog(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Whether a later invocation can pick the run back up from the failed group.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            RegistryError::SubmissionFailure { .. }
                | RegistryError::ConfirmationTimeout { .. }
                | RegistryError::RunLogWrite { .. }
                | RegistryError::Rpc(_)
        )
    }

    /// The group index a resumed run should start from, if this error has one.
    pub fn resume_index(&self) -> Option<usize> {
        match self {
            RegistryError::SubmissionFailure { index, .. }
            | RegistryError::ConfirmationTimeout { index, .. }
            | RegistryError::RunLogWrite { index, .. } => Some(*index),
            _ => None,
        }
    }
}
