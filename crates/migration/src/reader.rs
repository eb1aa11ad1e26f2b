//! Legacy snapshot reader.
//!
//! A snapshot is a directory of up to three independent JSON files:
//!
//! | Data       | File               | Shape                        |
//! |------------|--------------------|------------------------------|
//! | Blocks     | `blockchain.json`  | `{"blocks": [...]}`          |
//! | Validators | `validators.json`  | `{"validators": [...]}`      |
//! | State      | `state.json`       | `{"key": <value>, ...}`      |
//!
//! Any file may legitimately be absent (the snapshot then simply has no
//! entities of that kind); a present file that does not decode is a hard
//! error naming the file. Accessors re-read on every call; nothing is
//! cached between pipeline stages.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::SnapshotError;

pub const BLOCKS_FILENAME: &str = "blockchain.json";
pub const VALIDATORS_FILENAME: &str = "validators.json";
pub const STATE_FILENAME: &str = "state.json";

/// A transaction as the legacy implementation wrote it. Missing fields
/// take the legacy defaults (zero amount, empty payload).
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    #[serde(default, rename = "from")]
    pub sender: String,
    #[serde(default, rename = "to")]
    pub recipient: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// A block record. Producer and consensus metadata the legacy system
/// stored alongside are ignored on decode.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockRecord {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorRecord {
    pub address: Option<String>,
    #[serde(default)]
    pub stake: u64,
    #[serde(default = "default_reputation")]
    pub reputation: f64,
}

// The legacy implementation assigned new validators a neutral reputation.
fn default_reputation() -> f64 {
    0.5
}

#[derive(Debug, Default, Deserialize)]
struct BlocksFile {
    #[serde(default)]
    blocks: Vec<BlockRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidatorsFile {
    #[serde(default)]
    validators: Vec<ValidatorRecord>,
}

/// Read-only access to a legacy snapshot directory.
#[derive(Debug)]
pub struct SnapshotReader {
    snapshot_dir: PathBuf,
}

impl SnapshotReader {
    pub fn new(snapshot_dir: impl AsRef<Path>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
        }
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn read_blocks(&self) -> Result<Vec<BlockRecord>, SnapshotError> {
        let file: BlocksFile = self.read_optional(BLOCKS_FILENAME)?;
        Ok(file.blocks)
    }

    pub fn read_validators(&self) -> Result<Vec<ValidatorRecord>, SnapshotError> {
        let file: ValidatorsFile = self.read_optional(VALIDATORS_FILENAME)?;
        Ok(file.validators)
    }

    pub fn read_state(&self) -> Result<Map<String, Value>, SnapshotError> {
        self.read_optional(STATE_FILENAME)
    }

    fn read_optional<T: DeserializeOwned + Default>(
        &self,
        filename: &str,
    ) -> Result<T, SnapshotError> {
        let path = self.snapshot_dir.join(filename);
        if !path.exists() {
            return Ok(T::default());
        }
        let raw = fs::read_to_string(&path).map_err(|source| SnapshotError::Unreadable {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Malformed { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) {
        fs::write(dir.path().join(name), contents).expect("fixture file should write");
    }

    #[test]
    fn absent_files_read_as_empty_collections() {
        let dir = TempDir::new().expect("tempdir");
        let reader = SnapshotReader::new(dir.path());

        assert!(reader.read_blocks().expect("blocks should read").is_empty());
        assert!(
            reader
                .read_validators()
                .expect("validators should read")
                .is_empty()
        );
        assert!(reader.read_state().expect("state should read").is_empty());
    }

    #[test]
    fn reads_blocks_with_ordered_transactions() {
        let dir = TempDir::new().expect("tempdir");
        write_file(
            &dir,
            BLOCKS_FILENAME,
            &json!({
                "blocks": [
                    {"number": 1, "transactions": [
                        {"from": "0xaa", "to": "0xbb", "amount": 7, "data": [1, 2]},
                        {"from": "0xbb", "to": "0xcc", "amount": 3}
                    ]},
                    {"number": 0, "transactions": []}
                ]
            })
            .to_string(),
        );

        let blocks = SnapshotReader::new(dir.path())
            .read_blocks()
            .expect("blocks should read");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].number, 1);
        assert_eq!(blocks[0].transactions[0].sender, "0xaa");
        assert_eq!(blocks[0].transactions[1].amount, 3);
        assert!(blocks[0].transactions[1].data.is_empty());
    }

    #[test]
    fn ignores_unknown_block_metadata_fields() {
        let dir = TempDir::new().expect("tempdir");
        write_file(
            &dir,
            BLOCKS_FILENAME,
            &json!({
                "blocks": [
                    {"number": 2, "transactions": [], "producer": "0xdd", "hash": "0xbeef"}
                ]
            })
            .to_string(),
        );

        let blocks = SnapshotReader::new(dir.path())
            .read_blocks()
            .expect("blocks should read");
        assert_eq!(blocks[0].number, 2);
    }

    #[test]
    fn validator_records_take_legacy_defaults() {
        let dir = TempDir::new().expect("tempdir");
        write_file(
            &dir,
            VALIDATORS_FILENAME,
            &json!({
                "validators": [
                    {"address": "0x01", "stake": 500, "reputation": 0.9},
                    {"address": "0x02"},
                    {"stake": 100}
                ]
            })
            .to_string(),
        );

        let validators = SnapshotReader::new(dir.path())
            .read_validators()
            .expect("validators should read");
        assert_eq!(validators.len(), 3);
        assert_eq!(validators[1].stake, 0);
        assert_eq!(validators[1].reputation, 0.5);
        assert!(validators[2].address.is_none());
    }

    #[test]
    fn reads_state_mapping_with_nested_values() {
        let dir = TempDir::new().expect("tempdir");
        write_file(
            &dir,
            STATE_FILENAME,
            &json!({
                "0xacc1": {"balance": 100, "nonce": 1},
                "total_supply": 1_000_000
            })
            .to_string(),
        );

        let state = SnapshotReader::new(dir.path())
            .read_state()
            .expect("state should read");
        assert_eq!(state.len(), 2);
        assert_eq!(state["0xacc1"]["balance"], json!(100));
    }

    #[test]
    fn malformed_file_error_names_the_file() {
        let dir = TempDir::new().expect("tempdir");
        write_file(&dir, BLOCKS_FILENAME, "{\"blocks\": [oops");

        let error = SnapshotReader::new(dir.path())
            .read_blocks()
            .expect_err("malformed blocks should error");
        match error {
            SnapshotError::Malformed { path, .. } => assert!(path.ends_with(BLOCKS_FILENAME)),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn rereads_on_every_call() {
        let dir = TempDir::new().expect("tempdir");
        let reader = SnapshotReader::new(dir.path());
        assert!(reader.read_state().expect("state should read").is_empty());

        write_file(&dir, STATE_FILENAME, &json!({"k": 1}).to_string());
        assert_eq!(reader.read_state().expect("state should read").len(), 1);
    }
}
