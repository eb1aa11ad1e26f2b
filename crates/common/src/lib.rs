pub mod types;

pub use types::{Address, AddressError, Block, BlockNumber, Transaction, Validator, ValidatorError};
