use std::path::PathBuf;

use chainport_storage::StoreError;

/// Failure to decode a legacy snapshot file. An absent file is not an
/// error; the reader returns an empty collection for that.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("cannot read snapshot file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed snapshot file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("snapshot directory {0} does not exist")]
    MissingSnapshot(PathBuf),
    #[error("cannot copy {path}: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot encode staged state artifact: {0}")]
    StagedEncode(serde_json::Error),
    #[error("cannot write staged state artifact {path}: {source}")]
    StagedWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot encode migration report: {0}")]
    ReportEncode(serde_json::Error),
    #[error("cannot write migration report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}
