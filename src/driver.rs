//! Sequential, resumable submission of operation groups.

use crate::config::RegistryConfig;
use crate::errors::{RegistryError, Result};
use crate::ops::OperationGroup;
use crate::run_log::{FileRunLog, GroupResult, RunLogEntry};
use crate::traits::{LedgerClient, RunLog};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Progress of one group within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    /// Below the resume index: confirmed by an earlier invocation.
    Skipped,
    Pending,
    Sent { signature: String },
    Confirmed { signature: String },
    Failed { cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Resume with `resume_index = index`.
    Failed {
        index: usize,
        cause: String,
        timed_out: bool,
    },
    /// Stopped between groups; `next_index` was never sent.
    Cancelled { next_index: usize },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: String,
    pub states: Vec<GroupState>,
    pub outcome: RunOutcome,
    /// Indices sent to the ledger during this invocation, in order.
    pub submitted: Vec<usize>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Index a later invocation should resume from, if the run stopped early.
    pub fn resume_index(&self) -> Option<usize> {
        match self.outcome {
            RunOutcome::Completed => None,
            RunOutcome::Failed { index, .. } => Some(index),
            RunOutcome::Cancelled { next_index } => Some(next_index),
        }
    }

    pub fn confirmed_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, GroupState::Confirmed { .. }))
            .count()
    }

    /// Turns a failed outcome into `SubmissionFailure` or
    /// `ConfirmationTimeout`.
    pub fn into_result(self, timeout: Duration) -> Result<Self> {
        match &self.outcome {
            RunOutcome::Failed {
                index,
                timed_out: true,
                ..
            } => Err(RegistryError::ConfirmationTimeout {
                run: self.run.clone(),
                index: *index,
                after_secs: timeout.as_secs(),
            }),
            RunOutcome::Failed { index, cause, .. } => Err(RegistryError::SubmissionFailure {
                run: self.run.clone(),
                index: *index,
                cause: cause.clone(),
            }),
            _ => Ok(self),
        }
    }
}

/// Opens the file log for `run_name` under the configured output directory.
pub fn open_run_log(cfg: &RegistryConfig, run_name: &str) -> Result<FileRunLog> {
    FileRunLog::open(&cfg.run_log_dir, run_name)
}

/// Drives one run at a time; groups go out strictly in list order and a
/// group is only sent once its predecessor is confirmed.
pub struct SubmissionDriver {
    ledger: Arc<dyn LedgerClient>,
    confirmation_timeout: Duration,
}

impl SubmissionDriver {
    pub fn new(ledger: Arc<dyn LedgerClient>, cfg: &RegistryConfig) -> Self {
        Self {
            ledger,
            confirmation_timeout: cfg.confirmation_timeout(),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Submit `groups[resume_index..]`.
    ///
    /// Ledger failures end the run and are reported in the returned
    /// [`RunReport`]; only local failures (encoding, bad resume index, run log
    /// writes) are returned as errors. A failed log write is
    /// [`RegistryError::RunLogWrite`] carrying the run name and the group index
    /// to resume from. Cancellation is checked between groups; a group already
    /// sent is always confirmed or timed out first.
    pub async fn run(
        &self,
        groups: &[OperationGroup],
        resume_index: usize,
        log: &mut dyn RunLog,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let run = log.run_name().to_string();
        if resume_index > groups.len() {
            return Err(RegistryError::RunLog(format!(
                "run `{run}`: resume index {resume_index} is past the last group ({})",
                groups.len()
            )));
        }

        let mut states: Vec<GroupState> = (0..groups.len())
            .map(|i| {
                if i < resume_index {
                    GroupState::Skipped
                } else {
                    GroupState::Pending
                }
            })
            .collect();
        let mut submitted = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for (index, group) in groups.iter().enumerate().skip(resume_index) {
            if cancel.is_cancelled() {
                info!(%run, index, "run cancelled");
                outcome = RunOutcome::Cancelled { next_index: index };
                break;
            }

            let wire = group.wire_bytes()?;
            record(log, &run, index, false, &RunLogEntry::Submitted { index, wire })?;
            submitted.push(index);

            let signature = match self.ledger.send_group(group).await {
                Ok(signature) => signature,
                Err(e) => {
                    outcome = fail(log, &mut states, &run, index, e.to_string(), false, false)?;
                    break;
                }
            };
            states[index] = GroupState::Sent {
                signature: signature.clone(),
            };
            info!(%run, index, label = %group.label, %signature, "group sent");

            match tokio::time::timeout(self.confirmation_timeout, self.ledger.confirm(&signature))
                .await
            {
                Ok(Ok(())) => {
                    let confirmed = RunLogEntry::Outcome {
                        index,
                        result: GroupResult::Confirmed {
                            signature: signature.clone(),
                        },
                    };
                    record(log, &run, index, true, &confirmed)?;
                    info!(%run, index, %signature, "group confirmed");
                    states[index] = GroupState::Confirmed { signature };
                }
                Ok(Err(e)) => {
                    outcome = fail(log, &mut states, &run, index, e.to_string(), true, false)?;
                    break;
                }
                Err(_) => {
                    let cause = format!(
                        "confirmation of {signature} timed out after {}s",
                        self.confirmation_timeout.as_secs()
                    );
                    outcome = fail(log, &mut states, &run, index, cause, true, true)?;
                    break;
                }
            }
        }

        Ok(RunReport {
            run,
            states,
            outcome,
            submitted,
        })
    }
}

/// Appends to the run log; a write failure names the group it interrupted.
fn record(
    log: &mut dyn RunLog,
    run: &str,
    index: usize,
    sent: bool,
    entry: &RunLogEntry,
) -> Result<()> {
    log.append(entry).map_err(|e| {
        warn!(%run, index, sent, error = %e, "run log write failed, run halted");
        RegistryError::RunLogWrite {
            run: run.to_string(),
            index,
            sent,
            cause: e.to_string(),
        }
    })
}

fn fail(
    log: &mut dyn RunLog,
    states: &mut [GroupState],
    run: &str,
    index: usize,
    cause: String,
    sent: bool,
    timed_out: bool,
) -> Result<RunOutcome> {
    warn!(%run, index, timed_out, %cause, "group failed, run halted");
    states[index] = GroupState::Failed {
        cause: cause.clone(),
    };
    let failed = RunLogEntry::Outcome {
        index,
        result: GroupResult::Failed {
            cause: cause.clone(),
        },
    };
    record(log, run, index, sent, &failed)?;
    Ok(RunOutcome::Failed {
        index,
        cause,
        timed_out,
    })
}
