// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::digest::Digests;
use remote::ObjectEntry;
use std::time::Duration;

/// One VaultDB snapshot object, enriched with digests as a transfer proceeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultDbDescriptor {
    pub blob_name: String,
    pub snapshot_id: u64,
    /// Store digest from the listing
    pub digest: String,
    /// Compressed size from the listing
    pub size_bytes: u64,
    /// Compressed bytes as downloaded
    pub download_digests: Option<Digests>,
    /// Decompressed catalog bytes
    pub content_digests: Option<Digests>,
    /// Compressed bytes as uploaded
    pub upload_digests: Option<Digests>,
}

impl VaultDbDescriptor {
    #[must_use]
    pub fn from_entry(entry: &ObjectEntry, snapshot_id: u64) -> Self {
        Self {
            blob_name: entry.name.clone(),
            snapshot_id,
            digest: entry.hash.clone(),
            size_bytes: entry.bytes,
            download_digests: None,
            content_digests: None,
            upload_digests: None,
        }
    }
}

/// `<vault-path>/DB/<snapshot-id>`, without zero padding
#[must_use]
pub fn vaultdb_object_name(vault_path: &str, snapshot_id: u64) -> String {
    format!("{}{snapshot_id}", crate::locator::db_prefix(vault_path))
}

/// Which snapshot a caller wants
///
/// Ids are signed so the `-1` "none" sentinel can be rejected before any
/// request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRequest {
    Exact(i64),
    Latest,
    /// The requested snapshot when listed, otherwise the latest
    ExactOrLatest(i64),
    /// Poll until the snapshot is listed
    WaitFor { snapshot_id: i64, timeout: Duration },
}
