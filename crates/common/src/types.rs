//! Implementation-neutral ledger types shared by the storage and migration
//! crates. These are the decoded shapes both chain implementations agree on;
//! neither side's on-disk encoding leaks into them.

use std::fmt::Display;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub type BlockNumber = u64;

/// A `0x`-prefixed account identifier.
///
/// Addresses are treated as opaque strings: the pipeline compares them for
/// equality and never interprets the hex payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address {0:?} is missing the 0x prefix")]
    MissingPrefix(String),
}

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if !raw.starts_with("0x") || raw.len() <= 2 {
            return Err(AddressError::MissingPrefix(raw.to_owned()));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value transfer with an opaque payload. In-block ordering is significant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub data: Bytes,
}

/// A block as the target chain stores it: a number and its ordered
/// transactions. Producer metadata carried by legacy snapshots is not part
/// of this type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: BlockNumber,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn genesis() -> Self {
        Self {
            number: 0,
            transactions: Vec::new(),
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

/// A staking participant. Membership is keyed by address; `reputation`
/// outside [0, 1] is rejected at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub stake: u64,
    pub reputation: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("reputation {0} is outside [0, 1]")]
    ReputationOutOfRange(f64),
}

impl Validator {
    pub fn new(address: Address, stake: u64, reputation: f64) -> Result<Self, ValidatorError> {
        if !(0.0..=1.0).contains(&reputation) || reputation.is_nan() {
            return Err(ValidatorError::ReputationOutOfRange(reputation));
        }
        Ok(Self {
            address,
            stake,
            reputation,
        })
    }
}
