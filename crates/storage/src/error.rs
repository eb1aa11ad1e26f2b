use std::path::PathBuf;

use chainport_common::Address;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unsupported store schema version {0}")]
    UnsupportedSchema(u64),
    #[error("validator {0} is already registered")]
    DuplicateValidator(Address),
}
