// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! VaultDB and bundle transfer pipeline
//!
//! A Cloud Backup vault keeps its catalog (the VaultDB, a gzipped SQLite
//! file) as one object per snapshot and its data as numbered bundles:
//!
//! - `<vault-path>/DB/<snapshot-id>`
//! - `<vault-path>/BUNDLES/<bundle-id, 10 digits>`
//!
//! # Architecture
//!
//! - **digest**: incremental MD5/SHA-1 and case-insensitive comparison
//! - **transfer**: bounded-memory streaming download and upload with progress
//! - **locator**: snapshot resolution and polling
//! - **codec**: streaming gzip with digests on both sides
//! - **splitter**: segmented hashing for objects above 5 GiB
//! - **pipeline**: [`VaultDbPipeline`] tying them together
//!
//! Everything is synchronous. Parallelism across vaults is the caller's
//! business.
//!
//! # Usage
//!
//! ```no_run
//! # fn example(store: &dyn remote::BlobStore) -> Result<(), vault::VaultError> {
//! use vault::{SnapshotRequest, VaultDbPipeline};
//!
//! let pipeline = VaultDbPipeline::new(store, "cloudbackup");
//! let db = pipeline.download_vaultdb(
//!     "agent-vault",
//!     SnapshotRequest::Latest,
//!     std::path::Path::new("vault.db"),
//! )?;
//! assert!(db.content_digests.is_some());
//! # Ok(())
//! # }
//! ```

mod bundle;
mod codec;
mod digest;
mod error;
mod io;
mod locator;
mod pipeline;
mod progress;
mod splitter;
mod transfer;
mod vaultdb;

pub use bundle::{BundleDescriptor, bundle_object_name};
pub use codec::{CODEC_CHUNK_SIZE, CodecReport, compress, compress_file, decompress, decompress_file};
pub use digest::{Digests, HashingAccumulator, digests_match, normalize_digest, verify_digest};
pub use error::VaultError;
pub use io::{HashingReader, HashingWriter, read_chunk};
pub use locator::{
    Clock, DEFAULT_POLL_INTERVAL, ManualClock, Resolution, ResolutionKind, SystemClock, db_prefix,
    resolve_exact, resolve_latest, resolve_with_fallback, validate_snapshot_id, wait_for_snapshot,
};
pub use pipeline::{PipelineOptions, VaultDbPipeline};
pub use progress::{
    DEFAULT_BAR_COUNT, LogProgress, MAX_IO_BLOCK_SIZE, Meter, NoProgress, ProgressSink,
    TransferProgress,
};
pub use splitter::{
    LARGE_OBJECT_THRESHOLD, MAX_SEGMENTS, SEGMENT_SIZE, SPLIT_BLOCK_SIZE, SegmentConfig,
    SegmentedDigest, needs_segmenting, split_digest, split_file,
};
pub use transfer::{TransferOptions, TransferResult, download, hash_file, upload};
pub use vaultdb::{SnapshotRequest, VaultDbDescriptor, vaultdb_object_name};

pub type Result<T> = std::result::Result<T, VaultError>;
