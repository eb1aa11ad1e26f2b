//! Post-migration reconciliation.
//!
//! Re-reads the legacy snapshot and the migrated target and asserts they
//! agree, entity kind by entity kind. Reconciliation never writes to
//! either side and is repeatable: against an unchanged target it produces
//! the same outcome every time.

use std::{collections::BTreeSet, fs};

use chainport_storage::Store;
use serde_json::{Map, Value};

use crate::{adapter::STAGED_STATE_FILENAME, error::SnapshotError, reader::SnapshotReader};

/// Outcome of one reconciliation check. `passed` is true exactly when
/// `errors` is empty; the errors name every diverging record so operators
/// can see which ones, not just that some did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub errors: Vec<String>,
}

impl CheckOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            passed: errors.is_empty(),
            errors,
        }
    }
}

pub struct Reconciler<'a> {
    reader: &'a SnapshotReader,
    store: &'a Store,
}

impl<'a> Reconciler<'a> {
    pub fn new(reader: &'a SnapshotReader, store: &'a Store) -> Self {
        Self { reader, store }
    }

    /// Height and per-block comparison. The target's height counts its own
    /// genesis and the snapshot chain is gapless from 0, so the expected
    /// height is exactly the snapshot's block count.
    pub fn check_blocks(&self) -> Result<CheckOutcome, SnapshotError> {
        let mut source = self.reader.read_blocks()?;
        source.sort_by_key(|record| record.number);

        let mut errors = Vec::new();
        let expected_height = source.len() as u64;
        let height = self.store.height();
        if height != expected_height {
            errors.push(format!(
                "Block count mismatch: expected {expected_height}, got {height}"
            ));
        }

        for (index, record) in source.iter().enumerate() {
            let number = index as u64;
            let Some(block) = self.store.get_block(number) else {
                errors.push(format!("Block {number} not found in target"));
                continue;
            };
            if block.number != record.number {
                errors.push(format!(
                    "Block {number} number mismatch: expected {}, got {}",
                    record.number, block.number
                ));
            }
            let expected_transactions = record.transactions.len();
            if block.transaction_count() != expected_transactions {
                errors.push(format!(
                    "Block {number} transaction count mismatch: expected {expected_transactions}, got {}",
                    block.transaction_count()
                ));
            }
        }

        Ok(CheckOutcome::from_errors(errors))
    }

    /// Cardinality plus address-set difference; every snapshot address
    /// absent from the target is reported on its own line.
    pub fn check_validators(&self) -> Result<CheckOutcome, SnapshotError> {
        let source = self.reader.read_validators()?;

        let mut errors = Vec::new();
        let target = self.store.validators();
        if target.len() != source.len() {
            errors.push(format!(
                "Validator count mismatch: expected {}, got {}",
                source.len(),
                target.len()
            ));
        }

        let source_addresses: BTreeSet<&str> = source
            .iter()
            .filter_map(|record| record.address.as_deref())
            .collect();
        let target_addresses: BTreeSet<&str> = target
            .iter()
            .map(|validator| validator.address.as_str())
            .collect();
        for address in source_addresses.difference(&target_addresses) {
            errors.push(format!("Validator missing in target: {address}"));
        }

        Ok(CheckOutcome::from_errors(errors))
    }

    /// Per-key structural comparison of the state mapping.
    ///
    /// With a live handle every key is read back through the target and
    /// compared as a decoded value. Without one the staged artifact is
    /// checked instead, keys and values both, which proves the artifact
    /// is faithful but not that the target ingested it.
    pub fn check_state(&self) -> Result<CheckOutcome, SnapshotError> {
        let source = self.reader.read_state()?;
        let mut errors = Vec::new();

        match self.store.state_handle() {
            Ok(Some(handle)) => {
                for (key, expected) in &source {
                    match handle.get(key) {
                        Ok(Some(actual)) if &actual == expected => {}
                        Ok(Some(_)) => {
                            errors.push(format!("State value mismatch for key: {key}"));
                        }
                        Ok(None) => errors.push(format!("State key missing in target: {key}")),
                        Err(error) => errors.push(format!(
                            "Cannot read state key {key:?} from target: {error}"
                        )),
                    }
                }
            }
            Ok(None) => self.check_staged_state(&source, &mut errors),
            Err(error) => errors.push(format!("Cannot access target state: {error}")),
        }

        Ok(CheckOutcome::from_errors(errors))
    }

    fn check_staged_state(&self, source: &Map<String, Value>, errors: &mut Vec<String>) {
        let artifact = self.store.data_dir().join(STAGED_STATE_FILENAME);
        let raw = match fs::read_to_string(&artifact) {
            Ok(raw) => raw,
            Err(error) => {
                errors.push(format!(
                    "Staged state artifact {} is unreadable: {error}",
                    artifact.display()
                ));
                return;
            }
        };
        let staged: Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(staged) => staged,
            Err(error) => {
                errors.push(format!(
                    "Staged state artifact {} is malformed: {error}",
                    artifact.display()
                ));
                return;
            }
        };

        for (key, expected) in source {
            match staged.get(key) {
                Some(actual) if actual == expected => {}
                Some(_) => errors.push(format!("State value mismatch for key: {key}")),
                None => errors.push(format!("State key missing in staged artifact: {key}")),
            }
        }
        for key in staged.keys() {
            if !source.contains_key(key) {
                errors.push(format!("Unexpected state key in staged artifact: {key}"));
            }
        }
    }
}
