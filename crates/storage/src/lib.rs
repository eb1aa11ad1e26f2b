pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{STORE_METADATA_FILENAME, STORE_SCHEMA_VERSION, StateHandle, Store};
