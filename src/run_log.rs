//! Durable, append-only record of what a run sent and how each group ended.
//!
//! The file form is one text file per run name:
//!
//! ```text
//! index: 3
//! base64:
//! <wire bytes>
//!
//! hex:
//! <wire bytes>
//!
//! confirmed: <signature>
//! ---------------------------------
//! ```

use crate::errors::{RegistryError, Result};
use crate::traits::RunLog;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const SEPARATOR: &str = "---------------------------------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupResult {
    Confirmed { signature: String },
    Failed { cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunLogEntry {
    /// Written before the group is sent.
    Submitted { index: usize, wire: Vec<u8> },
    /// Written once the group is confirmed or has failed.
    Outcome { index: usize, result: GroupResult },
}

impl RunLogEntry {
    pub fn index(&self) -> usize {
        match self {
            RunLogEntry::Submitted { index, .. } | RunLogEntry::Outcome { index, .. } => *index,
        }
    }
}

/// Where a new invocation should start: one past the highest confirmed group.
pub fn resume_index(entries: &[RunLogEntry]) -> usize {
    last_confirmed_index(entries).map_or(0, |i| i + 1)
}

pub fn last_confirmed_index(entries: &[RunLogEntry]) -> Option<usize> {
    entries
        .iter()
        .filter_map(|e| match e {
            RunLogEntry::Outcome {
                index,
                result: GroupResult::Confirmed { .. },
            } => Some(*index),
            _ => None,
        })
        .max()
}

/// Groups whose latest submission never reached an outcome, e.g. after a
/// crash. An outcome only settles the submission written before it.
pub fn unresolved_indices(entries: &[RunLogEntry]) -> Vec<usize> {
    let mut open = BTreeSet::new();
    for entry in entries {
        match entry {
            RunLogEntry::Submitted { index, .. } => {
                open.insert(*index);
            }
            RunLogEntry::Outcome { index, .. } => {
                open.remove(index);
            }
        }
    }
    open.into_iter().collect()
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRunLog {
    run_name: String,
    entries: Vec<RunLogEntry>,
}

impl MemoryRunLog {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            entries: Vec::new(),
        }
    }
}

impl RunLog for MemoryRunLog {
    fn run_name(&self) -> &str {
        &self.run_name
    }

    fn append(&mut self, entry: &RunLogEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RunLogEntry>> {
        Ok(self.entries.clone())
    }
}

#[derive(Debug)]
pub struct FileRunLog {
    run_name: String,
    path: PathBuf,
    file: File,
}

impl FileRunLog {
    /// Open (or create) `<dir>/<run_name>.txt` for appending.
    pub fn open(dir: impl AsRef<Path>, run_name: &str) -> Result<Self> {
        if run_name.is_empty() || run_name.contains(['/', '\\']) || run_name.starts_with('.') {
            return Err(RegistryError::RunLog(format!("invalid run name `{run_name}`")));
        }
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(format!("{run_name}.txt"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            run_name: run_name.to_string(),
            path,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(entry: &RunLogEntry) -> String {
        match entry {
            RunLogEntry::Submitted { index, wire } => format!(
                "index: {index}\nbase64:\n{}\n\nhex:\n{}\n\n",
                STANDARD.encode(wire),
                hex::encode(wire)
            ),
            RunLogEntry::Outcome { result, .. } => {
                let line = match result {
                    GroupResult::Confirmed { signature } => format!("confirmed: {signature}"),
                    GroupResult::Failed { cause } => {
                        format!("failed: {}", cause.replace('\n', " "))
                    }
                };
                format!("{line}\n{SEPARATOR}\n")
            }
        }
    }

    fn parse(raw: &str) -> Result<Vec<RunLogEntry>> {
        let mut entries = Vec::new();
        let mut index = None;
        let mut lines = raw.lines();
        while let Some(line) = lines.next() {
            let line = line.trim_end();
            if let Some(rest) = line.strip_prefix("index: ") {
                let parsed = rest
                    .parse::<usize>()
                    .map_err(|e| RegistryError::RunLog(format!("bad index `{rest}`: {e}")))?;
                index = Some(parsed);
            } else if line == "base64:" {
                let current = index.ok_or_else(|| orphan("base64"))?;
                let encoded = lines.next().unwrap_or_default().trim();
                let wire = STANDARD
                    .decode(encoded)
                    .map_err(|e| RegistryError::RunLog(format!("group {current}: {e}")))?;
                entries.push(RunLogEntry::Submitted {
                    index: current,
                    wire,
                });
            } else if line == "hex:" {
                // Same bytes as the base64 block.
                lines.next();
            } else if let Some(signature) = line.strip_prefix("confirmed: ") {
                let current = index.ok_or_else(|| orphan("confirmed"))?;
                entries.push(RunLogEntry::Outcome {
                    index: current,
                    result: GroupResult::Confirmed {
                        signature: signature.to_string(),
                    },
                });
            } else if let Some(cause) = line.strip_prefix("failed: ") {
                let current = index.ok_or_else(|| orphan("failed"))?;
                entries.push(RunLogEntry::Outcome {
                    index: current,
                    result: GroupResult::Failed {
                        cause: cause.to_string(),
                    },
                });
            }
        }
        Ok(entries)
    }
}

fn orphan(what: &str) -> RegistryError {
    RegistryError::RunLog(format!("`{what}` line before any index line"))
}

impl RunLog for FileRunLog {
    fn run_name(&self) -> &str {
        &self.run_name
    }

    fn append(&mut self, entry: &RunLogEntry) -> Result<()> {
        self.file.write_all(Self::render(entry).as_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RunLogEntry>> {
        let raw = std::fs::read_to_string(&self.path)?;
        Self::parse(&raw)
    }
}
