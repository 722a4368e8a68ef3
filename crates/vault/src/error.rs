// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use remote::RemoteError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Snapshot {snapshot_id} not found under {vault_path}/DB/")]
    SnapshotNotFound { vault_path: String, snapshot_id: u64 },

    #[error("No snapshots available under {vault_path}/DB/")]
    NoSnapshotsAvailable { vault_path: String },

    #[error("Invalid snapshot id {0}")]
    InvalidSnapshotId(i64),

    #[error("Timed out after {waited:?} waiting for snapshot {snapshot_id} under {vault_path}/DB/")]
    Timeout {
        vault_path: String,
        snapshot_id: u64,
        waited: Duration,
    },

    #[error("Transfer failed with status {status}: {body}")]
    TransferFailed { status: u16, body: String },

    #[error("Integrity mismatch for {what}: expected {expected}, computed {actual}")]
    IntegrityMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("Object size {size} exceeds the supported limit of {limit} bytes")]
    UnsupportedObjectSize { size: u64, limit: u64 },

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RemoteError> for VaultError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Status { status, body, .. } => Self::TransferFailed { status, body },
            not_found @ RemoteError::ObjectNotFound { .. } => Self::TransferFailed {
                status: 404,
                body: not_found.to_string(),
            },
            other => Self::Remote(other),
        }
    }
}

impl VaultError {
    pub(crate) fn mismatch(
        what: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            what: what.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
