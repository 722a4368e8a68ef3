// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! VaultDB and bundle transfers against one container
//!
//! Download: locate the snapshot, stream the compressed object to disk,
//! verify it against the store's digest (segmented above the large-object
//! threshold), then optionally decompress. Upload is the mirror image:
//! compress to scratch, stream with the compressed MD5 as `ETag`, and check
//! the acknowledgement.

use crate::bundle::BundleDescriptor;
use crate::codec::{compress_file, decompress_file};
use crate::digest::{Digests, normalize_digest, verify_digest};
use crate::io::HashingReader;
use crate::locator::{
    Clock, DEFAULT_POLL_INTERVAL, ResolutionKind, SystemClock, db_prefix, resolve_exact,
    resolve_latest, resolve_with_fallback, validate_snapshot_id, wait_for_snapshot,
};
use crate::splitter::{SegmentConfig, needs_segmenting, split_file};
use crate::transfer::{TransferOptions, TransferResult, download, upload};
use crate::vaultdb::{SnapshotRequest, VaultDbDescriptor, vaultdb_object_name};
use crate::{Result, VaultError};
use diagnostics::*;
use remote::{BlobStore, ObjectEntry, ObjectRef, RemoteError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Clone)]
pub struct PipelineOptions {
    pub transfer: TransferOptions,
    pub segments: SegmentConfig,
    /// Gunzip downloaded VaultDBs; when false the compressed object is kept
    pub decompress: bool,
    pub poll_interval: Duration,
    /// Scratch space for compressed uploads
    pub work_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            transfer: TransferOptions::default(),
            segments: SegmentConfig::default(),
            decompress: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            work_dir: std::env::temp_dir(),
        }
    }
}

pub struct VaultDbPipeline<'a> {
    store: &'a dyn BlobStore,
    container: String,
    options: PipelineOptions,
    clock: Arc<dyn Clock>,
}

impl<'a> VaultDbPipeline<'a> {
    pub fn new(store: &'a dyn BlobStore, container: impl Into<String>) -> Self {
        Self {
            store,
            container: container.into(),
            options: PipelineOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn object(&self, name: impl Into<String>) -> ObjectRef {
        ObjectRef::new(self.container.as_str(), name)
    }

    fn list_snapshots(&self, vault_path: &str) -> Result<Vec<ObjectEntry>> {
        Ok(self
            .store
            .list_objects(&self.container, Some(&db_prefix(vault_path)))?)
    }

    /// Resolve a snapshot request to a listed VaultDB object
    ///
    /// Invalid ids fail before the store is contacted.
    pub fn locate(&self, vault_path: &str, request: SnapshotRequest) -> Result<VaultDbDescriptor> {
        match request {
            SnapshotRequest::Latest => resolve_latest(&self.list_snapshots(vault_path)?, vault_path),
            SnapshotRequest::Exact(id) => {
                let id = validate_snapshot_id(id)?;
                resolve_exact(&self.list_snapshots(vault_path)?, vault_path, id)
            }
            SnapshotRequest::ExactOrLatest(id) => {
                let id = validate_snapshot_id(id)?;
                let resolution = resolve_with_fallback(&self.list_snapshots(vault_path)?, vault_path, id)?;
                if resolution.kind == ResolutionKind::FellBackToLatest {
                    let latest = resolution.descriptor.snapshot_id;
                    warn!("Snapshot {id} of {vault_path} not listed, using latest snapshot {latest}",
                        id: id, vault_path: vault_path, latest: latest);
                }
                Ok(resolution.descriptor)
            }
            SnapshotRequest::WaitFor { snapshot_id, timeout } => {
                let id = validate_snapshot_id(snapshot_id)?;
                wait_for_snapshot(
                    || self.list_snapshots(vault_path),
                    vault_path,
                    id,
                    timeout,
                    self.options.poll_interval,
                    self.clock.as_ref(),
                )
            }
        }
    }

    /// Download a VaultDB snapshot to `dest`
    ///
    /// With decompression on, `dest` receives the catalog and the returned
    /// descriptor carries both compressed and content digests. Otherwise
    /// `dest` receives the gzip stream. Nothing is written to `dest` unless
    /// the download verifies.
    pub fn download_vaultdb(
        &self,
        vault_path: &str,
        request: SnapshotRequest,
        dest: &Path,
    ) -> Result<VaultDbDescriptor> {
        let mut descriptor = self.locate(vault_path, request)?;
        let limit = self.options.segments.max_object_size;
        if descriptor.size_bytes > limit {
            return Err(VaultError::UnsupportedObjectSize {
                size: descriptor.size_bytes,
                limit,
            });
        }

        let object = self.object(descriptor.blob_name.as_str());
        let scratch = staging_file(dest, ".vaultdb-", ".gz")?;
        let result = download(self.store, &object, scratch.path(), &self.options.transfer)?;
        self.verify_download(&descriptor, &object, &result, scratch.path())?;

        if !self.options.decompress {
            publish(scratch, dest)?;
            descriptor.download_digests = Some(result.digests);
            log_descriptor("Downloaded", &descriptor);
            return Ok(descriptor);
        }

        let content = staging_file(dest, ".vaultdb-", ".db")?;
        let report = decompress_file(scratch.path(), content.path())?;
        verify_digest(
            &format!("compressed bytes of {object}"),
            &result.digests.md5,
            &report.compressed.md5,
        )?;
        publish(content, dest)?;
        descriptor.download_digests = Some(result.digests);
        descriptor.content_digests = Some(report.content);
        log_descriptor("Downloaded", &descriptor);
        Ok(descriptor)
    }

    fn verify_download(
        &self,
        descriptor: &VaultDbDescriptor,
        object: &ObjectRef,
        result: &TransferResult,
        path: &Path,
    ) -> Result<()> {
        // The GET ETag is authoritative; the listing hash covers stores that omit it
        let expected = result.remote_etag.as_deref().unwrap_or(&descriptor.digest);
        if !needs_segmenting(result.bytes, self.options.segments.threshold) {
            return verify_digest(&format!("download of {object}"), expected, &result.digests.md5);
        }

        let segmented = split_file(path, &self.options.segments)?;
        segmented.verify(expected)?;
        if let Some((container, prefix)) = result.manifest.as_deref().and_then(|m| m.split_once('/')) {
            let segments = self.store.list_objects(container, Some(prefix))?;
            segmented.verify_segments(&segments)?;
        }
        let count = segmented.segment_digests.len();
        debug!("Verified {object} as {count} segments", object: object.to_string(), count: count);
        Ok(())
    }

    /// Compress `db_path` and upload it as snapshot `snapshot_id`
    pub fn upload_vaultdb(&self, vault_path: &str, snapshot_id: i64, db_path: &Path) -> Result<VaultDbDescriptor> {
        let snapshot_id = validate_snapshot_id(snapshot_id)?;
        let scratch = tempfile::Builder::new()
            .prefix("vaultdb-")
            .suffix(".gz")
            .tempfile_in(&self.options.work_dir)?;
        let report = compress_file(db_path, scratch.path())?;

        let limit = self.options.segments.threshold;
        if report.compressed.bytes > limit {
            return Err(VaultError::UnsupportedObjectSize {
                size: report.compressed.bytes,
                limit,
            });
        }

        let name = vaultdb_object_name(vault_path, snapshot_id);
        let object = self.object(name.as_str());
        let result = upload(
            self.store,
            scratch.path(),
            &object,
            &self.options.transfer,
            Some(&report.compressed.md5),
        )?;

        let descriptor = VaultDbDescriptor {
            blob_name: name,
            snapshot_id,
            digest: result.remote_etag.unwrap_or_else(|| result.digests.md5.clone()),
            size_bytes: result.bytes,
            download_digests: None,
            content_digests: Some(report.content),
            upload_digests: Some(result.digests),
        };
        log_descriptor("Uploaded", &descriptor);
        Ok(descriptor)
    }

    /// Confirm the stored bundle carries the catalog's digest
    ///
    /// An MD5 is compared with the object's `ETag`. Store ETags are always
    /// MD5, so a SHA-1 is checked by hashing the body without keeping it.
    pub fn check_bundle_digest(&self, vault_path: &str, bundle: &BundleDescriptor) -> Result<()> {
        let object = self.object(bundle.object_name(vault_path));
        let what = format!("bundle {}", bundle.bundle_id);

        if normalize_digest(&bundle.digest).len() == 32 {
            let meta = self.store.head_object(&object)?;
            let etag = meta.etag.ok_or_else(|| {
                VaultError::Remote(RemoteError::MissingHeader {
                    url: object.to_string(),
                    header: "ETag",
                })
            })?;
            return verify_digest(&what, &bundle.digest, &etag);
        }

        let mut body = self.store.get_object(&object)?;
        let mut reader = HashingReader::new(&mut body.reader);
        let _ = io::copy(&mut reader, &mut io::sink())?;
        let (_, hasher) = reader.into_parts();
        check_bundle(&what, bundle, &hasher.finish())
    }

    /// Download a bundle and verify it against the catalog digest
    pub fn download_bundle(&self, vault_path: &str, bundle: &BundleDescriptor, dest: &Path) -> Result<Digests> {
        let object = self.object(bundle.object_name(vault_path));
        let what = format!("bundle {}", bundle.bundle_id);
        let scratch = staging_file(dest, ".bundle-", ".part")?;
        let result = download(self.store, &object, scratch.path(), &self.options.transfer)?;

        if let Some(etag) = &result.remote_etag {
            verify_digest(&format!("{what} store ETag"), etag, &result.digests.md5)?;
        }
        check_bundle(&what, bundle, &result.digests)?;
        publish(scratch, dest)?;

        let bytes = result.bytes;
        info!("Downloaded {what} ({bytes} bytes)", what: what, bytes: bytes);
        Ok(result.digests)
    }
}

fn check_bundle(what: &str, bundle: &BundleDescriptor, computed: &Digests) -> Result<()> {
    if computed.matches(&bundle.digest) {
        Ok(())
    } else {
        Err(VaultError::mismatch(
            what,
            normalize_digest(&bundle.digest),
            computed.counterpart(&bundle.digest),
        ))
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Scratch file beside `dest`, removed on drop unless published
fn staging_file(dest: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(parent_dir(dest))?)
}

/// Move verified bytes into place
fn publish(staged: NamedTempFile, dest: &Path) -> Result<()> {
    let _ = staged.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn log_descriptor(action: &str, descriptor: &VaultDbDescriptor) {
    let name = descriptor.blob_name.as_str();
    let snapshot = descriptor.snapshot_id;
    let size = descriptor.size_bytes;
    info!("{action} VaultDB {name} (snapshot {snapshot}, {size} bytes)",
        action: action, name: name, snapshot: snapshot, size: size);
}
