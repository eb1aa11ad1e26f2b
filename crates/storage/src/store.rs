//! File-backed chain store.
//!
//! A store is a data directory holding a schema-version marker, the chain
//! (every block including genesis), the validator set, and, from schema
//! version 2 on, a key/value state file. Opening an empty directory
//! initializes a fresh layout at the current schema version; opening an
//! existing one honors the recorded version, which is how older layouts
//! without a state store keep working.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chainport_common::{Block, BlockNumber, Transaction, Validator};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::StoreError;

pub const STORE_METADATA_FILENAME: &str = "metadata.json";
pub const STORE_SCHEMA_VERSION: u64 = 2;

const CHAIN_FILENAME: &str = "chain.json";
const VALIDATORS_FILENAME: &str = "validators.json";
const STATE_FILENAME: &str = "state.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    schema_version: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChainFile {
    blocks: Vec<Block>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ValidatorsFile {
    validators: Vec<Validator>,
}

/// An open chain store rooted at a data directory.
///
/// Blocks and validators are kept in memory and written through on every
/// mutation; state lives behind [`StateHandle`] and is re-read per access.
#[derive(Debug)]
pub struct Store {
    data_dir: PathBuf,
    schema_version: u64,
    blocks: Vec<Block>,
    validators: Vec<Validator>,
}

impl Store {
    /// Opens the store at `data_dir`, initializing a fresh layout when the
    /// directory holds no metadata file.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let metadata_path = data_dir.join(STORE_METADATA_FILENAME);
        let schema_version = if metadata_path.exists() {
            let metadata: StoreMetadata = read_json(&metadata_path)?;
            if metadata.schema_version == 0 || metadata.schema_version > STORE_SCHEMA_VERSION {
                return Err(StoreError::UnsupportedSchema(metadata.schema_version));
            }
            metadata.schema_version
        } else {
            write_json(
                &metadata_path,
                &StoreMetadata {
                    schema_version: STORE_SCHEMA_VERSION,
                },
            )?;
            STORE_SCHEMA_VERSION
        };

        let chain_path = data_dir.join(CHAIN_FILENAME);
        let chain: ChainFile = if chain_path.exists() {
            read_json(&chain_path)?
        } else {
            let chain = ChainFile {
                blocks: vec![Block::genesis()],
            };
            write_json(&chain_path, &chain)?;
            info!(data_dir = %data_dir.display(), "Initialized chain store with genesis block");
            chain
        };

        let validators_path = data_dir.join(VALIDATORS_FILENAME);
        let validators: ValidatorsFile = if validators_path.exists() {
            read_json(&validators_path)?
        } else {
            ValidatorsFile::default()
        };

        if schema_version >= 2 {
            let state_path = data_dir.join(STATE_FILENAME);
            if !state_path.exists() {
                write_json(&state_path, &Map::<String, Value>::new())?;
            }
        }

        Ok(Self {
            data_dir,
            schema_version,
            blocks: chain.blocks,
            validators: validators.validators,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Number of blocks in the chain, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Blocks are gapless from 0, so the number doubles as the index.
    pub fn get_block(&self, number: BlockNumber) -> Option<&Block> {
        self.blocks.get(number as usize)
    }

    /// Appends a block at the next number and persists the chain.
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> Result<Block, StoreError> {
        let block = Block {
            number: self.height(),
            transactions,
        };
        self.blocks.push(block.clone());
        self.persist_chain()?;
        debug!(number = block.number, "Appended block");
        Ok(block)
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Registers a validator, rejecting duplicate addresses.
    pub fn register_validator(&mut self, validator: Validator) -> Result<(), StoreError> {
        if self
            .validators
            .iter()
            .any(|existing| existing.address == validator.address)
        {
            return Err(StoreError::DuplicateValidator(validator.address));
        }
        self.validators.push(validator);
        self.persist_validators()
    }

    /// Probes for live key/value state access.
    ///
    /// Returns `Ok(None)` for layouts predating the state store (schema
    /// version 1) and an error when the state file exists but cannot be
    /// decoded: a handle is only produced when it is actually usable.
    pub fn state_handle(&self) -> Result<Option<StateHandle>, StoreError> {
        if self.schema_version < 2 {
            return Ok(None);
        }
        let path = self.data_dir.join(STATE_FILENAME);
        // Probe once that the backing file is decodable.
        let _: Map<String, Value> = read_json(&path)?;
        Ok(Some(StateHandle { path }))
    }
}

impl Store {
    fn persist_chain(&self) -> Result<(), StoreError> {
        write_json(
            &self.data_dir.join(CHAIN_FILENAME),
            &ChainFile {
                blocks: self.blocks.clone(),
            },
        )
    }

    fn persist_validators(&self) -> Result<(), StoreError> {
        write_json(
            &self.data_dir.join(VALIDATORS_FILENAME),
            &ValidatorsFile {
                validators: self.validators.clone(),
            },
        )
    }
}

/// Point access to the store's key/value state file.
///
/// Every operation re-reads the backing file, so a handle observes writes
/// made through any other handle on the same store.
#[derive(Debug, Clone)]
pub struct StateHandle {
    path: PathBuf,
}

impl StateHandle {
    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let state: Map<String, Value> = read_json(&self.path)?;
        Ok(state.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut state: Map<String, Value> = read_json(&self.path)?;
        state.insert(key.to_owned(), value);
        write_json(&self.path, &state)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let state: Map<String, Value> = read_json(&self.path)?;
        Ok(state.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, encoded).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainport_common::Address;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_validator(address: &str) -> Validator {
        Validator::new(
            Address::parse(address).expect("address should parse"),
            1_000,
            0.5,
        )
        .expect("validator should be valid")
    }

    fn test_transaction() -> Transaction {
        Transaction {
            from: Address::parse("0xaa").expect("address should parse"),
            to: Address::parse("0xbb").expect("address should parse"),
            amount: 10,
            data: Default::default(),
        }
    }

    #[test]
    fn fresh_store_holds_only_genesis() {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open(dir.path()).expect("store should open");

        assert_eq!(store.height(), 1);
        let genesis = store.get_block(0).expect("genesis should exist");
        assert_eq!(genesis.number, 0);
        assert_eq!(genesis.transaction_count(), 0);
    }

    #[test]
    fn fresh_store_writes_current_schema_version() {
        let dir = TempDir::new().expect("tempdir");
        Store::open(dir.path()).expect("store should open");

        let raw = fs::read_to_string(dir.path().join(STORE_METADATA_FILENAME))
            .expect("metadata should exist");
        let metadata: StoreMetadata = serde_json::from_str(&raw).expect("metadata should parse");
        assert_eq!(metadata.schema_version, STORE_SCHEMA_VERSION);
    }

    #[test]
    fn appended_blocks_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let mut store = Store::open(dir.path()).expect("store should open");
            store
                .add_block(vec![test_transaction()])
                .expect("block should append");
            store.add_block(vec![]).expect("block should append");
        }

        let store = Store::open(dir.path()).expect("store should reopen");
        assert_eq!(store.height(), 3);
        let first = store.get_block(1).expect("block 1 should exist");
        assert_eq!(first.number, 1);
        assert_eq!(first.transaction_count(), 1);
    }

    #[test]
    fn rejects_duplicate_validator() {
        let dir = TempDir::new().expect("tempdir");
        let mut store = Store::open(dir.path()).expect("store should open");

        store
            .register_validator(test_validator("0x01"))
            .expect("first registration should succeed");
        let duplicate = store.register_validator(test_validator("0x01"));
        assert!(matches!(duplicate, Err(StoreError::DuplicateValidator(_))));
        assert_eq!(store.validators().len(), 1);
    }

    #[test]
    fn state_roundtrips_nested_values() {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open(dir.path()).expect("store should open");
        let handle = store
            .state_handle()
            .expect("probe should succeed")
            .expect("fresh store should expose state");

        let value = json!({"balance": 42, "meta": {"tags": ["a", "b"]}});
        handle.set("0xacc", value.clone()).expect("set should succeed");

        assert_eq!(handle.get("0xacc").expect("get should succeed"), Some(value));
        assert_eq!(handle.get("0xother").expect("get should succeed"), None);
    }

    #[test]
    fn state_writes_leave_other_keys_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open(dir.path()).expect("store should open");
        let handle = store
            .state_handle()
            .expect("probe should succeed")
            .expect("fresh store should expose state");

        handle.set("a", json!(1)).expect("set should succeed");
        handle.set("b", json!(2)).expect("set should succeed");
        handle.set("a", json!(3)).expect("set should succeed");

        assert_eq!(handle.get("b").expect("get should succeed"), Some(json!(2)));
        assert_eq!(handle.len().expect("len should succeed"), 2);
    }

    #[test]
    fn schema_v1_layout_has_no_state_handle() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join(STORE_METADATA_FILENAME),
            "{\"schema_version\": 1}",
        )
        .expect("metadata should write");

        let store = Store::open(dir.path()).expect("store should open");
        assert!(
            store
                .state_handle()
                .expect("probe should succeed")
                .is_none()
        );
        assert!(!dir.path().join(STATE_FILENAME).exists());
    }

    #[test]
    fn unsupported_schema_version_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join(STORE_METADATA_FILENAME),
            "{\"schema_version\": 99}",
        )
        .expect("metadata should write");

        assert!(matches!(
            Store::open(dir.path()),
            Err(StoreError::UnsupportedSchema(99))
        ));
    }

    #[test]
    fn corrupt_chain_file_is_reported_with_its_path() {
        let dir = TempDir::new().expect("tempdir");
        Store::open(dir.path()).expect("store should open");
        fs::write(dir.path().join(CHAIN_FILENAME), "not json").expect("chain should write");

        match Store::open(dir.path()) {
            Err(StoreError::Corrupt { path, .. }) => {
                assert!(path.ends_with(CHAIN_FILENAME));
            }
            other => panic!("expected corrupt chain error, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_state_file_fails_the_probe() {
        let dir = TempDir::new().expect("tempdir");
        let store = Store::open(dir.path()).expect("store should open");
        fs::write(dir.path().join(STATE_FILENAME), "{broken").expect("state should write");

        assert!(matches!(
            store.state_handle(),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
