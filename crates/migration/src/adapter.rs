//! Target-side write adapter.
//!
//! Converts legacy snapshot records into target types and writes them
//! through the target store. The state sink is fixed once, when the
//! adapter is opened: a live key/value handle when the store exposes one
//! (point writes per key), or a staged artifact file when it does not
//! (one all-or-nothing dump the target can ingest later).

use std::{fs, path::PathBuf};

use bytes::Bytes;
use chainport_common::{Address, AddressError, Transaction, Validator, ValidatorError};
use chainport_storage::{StateHandle, Store};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    error::MigrationError,
    reader::{BlockRecord, TransactionRecord, ValidatorRecord},
};

/// Artifact written next to the target store when no live state handle is
/// available.
pub const STAGED_STATE_FILENAME: &str = "migrated_state.json";

/// How state reached the target on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMode {
    Direct,
    Staged,
}

enum StateSink {
    Direct(StateHandle),
    Staged { artifact: PathBuf },
}

/// Result of one migration stage: how many records landed, plus the
/// per-record failures that did not abort the batch.
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub migrated: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct BlockOutcome {
    pub blocks: u64,
    pub transactions: u64,
    pub warnings: Vec<String>,
}

pub struct TargetAdapter<'a> {
    store: &'a mut Store,
    sink: StateSink,
}

impl<'a> TargetAdapter<'a> {
    /// Opens the adapter, probing the store's state capability exactly
    /// once. The probe is fallible: a store whose state backing exists
    /// but is unusable refuses the adapter instead of silently staging.
    pub fn open(store: &'a mut Store) -> Result<Self, MigrationError> {
        let sink = match store.state_handle()? {
            Some(handle) => StateSink::Direct(handle),
            None => {
                let artifact = store.data_dir().join(STAGED_STATE_FILENAME);
                warn!(
                    artifact = %artifact.display(),
                    "Target store exposes no live state handle; state will be staged"
                );
                StateSink::Staged { artifact }
            }
        };
        Ok(Self { store, sink })
    }

    pub fn state_mode(&self) -> StateMode {
        match self.sink {
            StateSink::Direct(_) => StateMode::Direct,
            StateSink::Staged { .. } => StateMode::Staged,
        }
    }

    /// Registers each validator independently. A record that fails to
    /// convert or register is recorded as a warning naming its address;
    /// the rest of the batch is unaffected.
    pub fn migrate_validators(&mut self, records: &[ValidatorRecord]) -> StageOutcome {
        let mut outcome = StageOutcome::default();
        for record in records {
            match convert_validator(record) {
                Ok(validator) => match self.store.register_validator(validator) {
                    Ok(()) => outcome.migrated += 1,
                    Err(error) => outcome.record_validator_failure(record, &error),
                },
                Err(error) => outcome.record_validator_failure(record, &error),
            }
        }
        outcome
    }

    /// Appends the snapshot's blocks in number order, skipping the
    /// genesis block: the target created its own at initialization.
    /// A block that fails to convert or append is skipped, not retried.
    pub fn migrate_blocks(&mut self, mut records: Vec<BlockRecord>) -> BlockOutcome {
        records.sort_by_key(|record| record.number);

        let mut outcome = BlockOutcome::default();
        for record in records {
            if record.number == 0 {
                continue;
            }
            let transactions: Result<Vec<Transaction>, _> =
                record.transactions.iter().map(convert_transaction).collect();
            let transactions = match transactions {
                Ok(transactions) => transactions,
                Err(error) => {
                    outcome.record_block_failure(record.number, &error);
                    continue;
                }
            };

            let count = transactions.len() as u64;
            match self.store.add_block(transactions) {
                Ok(_) => {
                    outcome.blocks += 1;
                    outcome.transactions += count;
                }
                Err(error) => outcome.record_block_failure(record.number, &error),
            }
        }
        outcome
    }

    /// Moves the state mapping into the target.
    ///
    /// Direct mode writes key by key and counts successes; a failed key is
    /// recorded and the rest continue. Staged mode has no per-key
    /// primitive, so the whole mapping is written in one shot and any
    /// failure is a hard error.
    pub fn migrate_state(
        &mut self,
        state: &Map<String, Value>,
    ) -> Result<StageOutcome, MigrationError> {
        let mut outcome = StageOutcome::default();
        match &self.sink {
            StateSink::Direct(handle) => {
                for (key, value) in state {
                    match handle.set(key, value.clone()) {
                        Ok(()) => outcome.migrated += 1,
                        Err(error) => {
                            let message = format!("Cannot write state key {key:?}: {error}");
                            warn!("{message}");
                            outcome.errors.push(message);
                        }
                    }
                }
            }
            StateSink::Staged { artifact } => {
                let encoded = serde_json::to_string_pretty(state)
                    .map_err(MigrationError::StagedEncode)?;
                fs::write(artifact, encoded).map_err(|source| MigrationError::StagedWrite {
                    path: artifact.clone(),
                    source,
                })?;
                info!(artifact = %artifact.display(), keys = state.len(), "Staged state artifact written");
                outcome.migrated = state.len() as u64;
            }
        }
        Ok(outcome)
    }
}

impl StageOutcome {
    fn record_validator_failure(&mut self, record: &ValidatorRecord, error: &dyn std::fmt::Display) {
        let address = record.address.as_deref().unwrap_or("<missing>");
        let message = format!("Cannot migrate validator {address}: {error}");
        warn!("{message}");
        self.warnings.push(message);
    }
}

impl BlockOutcome {
    fn record_block_failure(&mut self, number: u64, error: &dyn std::fmt::Display) {
        let message = format!("Cannot migrate block {number}: {error}");
        warn!("{message}");
        self.warnings.push(message);
    }
}

fn convert_transaction(record: &TransactionRecord) -> Result<Transaction, AddressError> {
    Ok(Transaction {
        from: Address::parse(&record.sender)?,
        to: Address::parse(&record.recipient)?,
        amount: record.amount,
        data: Bytes::from(record.data.clone()),
    })
}

fn convert_validator(record: &ValidatorRecord) -> Result<Validator, ValidatorError> {
    let address = Address::parse(record.address.as_deref().unwrap_or_default())?;
    Validator::new(address, record.stake, record.reputation)
}
