// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline tests against the in-memory blob store

use anyhow::Result;
use remote::{MemoryObjectStore, md5_hex};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use vault::{
    BundleDescriptor, Digests, ManualClock, PipelineOptions, ProgressSink, SegmentConfig,
    SnapshotRequest, TransferOptions, TransferProgress, VaultDbPipeline, VaultError, compress,
    split_digest,
};

const CONTAINER: &str = "cloudbackup";
const VAULT: &str = "agent-1/vault";

fn catalog_bytes(len: usize) -> Vec<u8> {
    let mut data = b"SQLite format 3\0".to_vec();
    data.extend((0..len).map(|i| (i % 199) as u8));
    data
}

/// Bytes gzip cannot shrink
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let _ = compress(Cursor::new(data), &mut out).unwrap();
    out
}

#[derive(Default)]
struct Recorder {
    bars: Mutex<Vec<u32>>,
    remaining_at_end: Mutex<Option<u64>>,
}

impl ProgressSink for Recorder {
    fn on_progress(&self, _label: &str, progress: &TransferProgress) {
        self.bars.lock().unwrap().push(progress.bars_completed());
    }

    fn on_complete(&self, _label: &str, progress: &TransferProgress) {
        *self.remaining_at_end.lock().unwrap() = Some(progress.bytes_remaining());
    }
}

#[test]
fn download_latest_decompresses_and_records_digests() -> Result<()> {
    let dir = tempdir()?;
    let catalog = catalog_bytes(100_000);
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/DB/3"), gzip(b"old"));
    store.insert(CONTAINER, &format!("{VAULT}/DB/12"), gzip(&catalog));
    store.insert(CONTAINER, &format!("{VAULT}/DB/junk"), b"ignored".to_vec());

    let recorder = Arc::new(Recorder::default());
    let options = PipelineOptions {
        transfer: TransferOptions::default().with_sink(recorder.clone()),
        ..PipelineOptions::default()
    };
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options);

    let dest = dir.path().join("vault.db");
    let db = pipeline.download_vaultdb(VAULT, SnapshotRequest::Latest, &dest)?;

    assert_eq!(db.snapshot_id, 12);
    assert_eq!(std::fs::read(&dest)?, catalog);
    assert_eq!(db.content_digests, Some(Digests::of(&catalog)));
    let download = db.download_digests.expect("download digests");
    assert!(download.matches(&db.digest));

    let bars = recorder.bars.lock().unwrap().clone();
    assert!(bars.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(bars.last().copied(), Some(50));
    assert_eq!(*recorder.remaining_at_end.lock().unwrap(), Some(0));

    // Only the catalog is left behind
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[test]
fn download_can_keep_compressed() -> Result<()> {
    let dir = tempdir()?;
    let packed = gzip(b"catalog");
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/DB/1"), packed.clone());

    let options = PipelineOptions {
        decompress: false,
        ..PipelineOptions::default()
    };
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options);
    let dest = dir.path().join("vault.db.gz");
    let db = pipeline.download_vaultdb(VAULT, SnapshotRequest::Exact(1), &dest)?;

    assert_eq!(std::fs::read(&dest)?, packed);
    assert!(db.content_digests.is_none());
    Ok(())
}

#[test]
fn corrupted_object_is_an_integrity_mismatch() -> Result<()> {
    let dir = tempdir()?;
    let store = MemoryObjectStore::new();
    store.insert_with_etag(
        CONTAINER,
        &format!("{VAULT}/DB/4"),
        gzip(b"catalog"),
        "0123456789abcdef0123456789abcdef",
    );

    let dest = dir.path().join("vault.db");
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);
    let err = pipeline
        .download_vaultdb(VAULT, SnapshotRequest::Exact(4), &dest)
        .unwrap_err();
    assert!(matches!(err, VaultError::IntegrityMismatch { .. }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    let keep = VaultDbPipeline::new(&store, CONTAINER).with_options(PipelineOptions {
        decompress: false,
        ..PipelineOptions::default()
    });
    let err = keep
        .download_vaultdb(VAULT, SnapshotRequest::Exact(4), &dest)
        .unwrap_err();
    assert!(matches!(err, VaultError::IntegrityMismatch { .. }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn exact_or_latest_falls_back() -> Result<()> {
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/DB/5"), gzip(b"five"));
    store.insert(CONTAINER, &format!("{VAULT}/DB/9"), gzip(b"nine"));
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);

    let fallback = pipeline.locate(VAULT, SnapshotRequest::ExactOrLatest(77))?;
    let latest = pipeline.locate(VAULT, SnapshotRequest::Latest)?;
    assert_eq!(fallback, latest);
    assert_eq!(pipeline.locate(VAULT, SnapshotRequest::ExactOrLatest(5))?.snapshot_id, 5);
    Ok(())
}

#[test]
fn negative_snapshot_fails_before_listing() {
    let store = MemoryObjectStore::new();
    // Any store call would fail with 500
    store.fail_with_status(Some(500));
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);

    for request in [
        SnapshotRequest::Exact(-1),
        SnapshotRequest::ExactOrLatest(-1),
        SnapshotRequest::WaitFor {
            snapshot_id: -1,
            timeout: Duration::from_secs(1),
        },
    ] {
        let err = pipeline.locate(VAULT, request).unwrap_err();
        assert!(matches!(err, VaultError::InvalidSnapshotId(-1)), "{request:?}");
    }
}

#[test]
fn wait_for_snapshot_times_out_on_manual_clock() {
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/DB/1"), gzip(b"one"));
    let clock = Arc::new(ManualClock::new());
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_clock(clock.clone());

    let err = pipeline
        .locate(
            VAULT,
            SnapshotRequest::WaitFor {
                snapshot_id: 2,
                timeout: Duration::from_millis(50),
            },
        )
        .unwrap_err();
    assert!(matches!(err, VaultError::Timeout { snapshot_id: 2, .. }));
    assert_eq!(clock.elapsed(), Duration::from_millis(50));
}

#[test]
fn listing_failure_is_transfer_failed() {
    let store = MemoryObjectStore::new();
    store.fail_with_status(Some(503));
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);
    let err = pipeline.locate(VAULT, SnapshotRequest::Latest).unwrap_err();
    assert!(matches!(err, VaultError::TransferFailed { status: 503, .. }));
}

#[test]
fn upload_then_download_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let catalog = catalog_bytes(50_000);
    let src = dir.path().join("vault.db");
    std::fs::write(&src, &catalog)?;

    let store = MemoryObjectStore::new();
    let options = PipelineOptions {
        work_dir: dir.path().to_path_buf(),
        ..PipelineOptions::default()
    };
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options);

    let uploaded = pipeline.upload_vaultdb(VAULT, 21, &src)?;
    assert_eq!(uploaded.blob_name, format!("{VAULT}/DB/21"));
    assert_eq!(uploaded.content_digests, Some(Digests::of(&catalog)));
    let sent = uploaded.upload_digests.clone().expect("upload digests");
    assert_eq!(store.last_put_etag(), Some(sent.md5.clone()));

    let dest = dir.path().join("restored.db");
    let downloaded = pipeline.download_vaultdb(VAULT, SnapshotRequest::Exact(21), &dest)?;
    assert_eq!(std::fs::read(&dest)?, catalog);
    assert_eq!(downloaded.download_digests, Some(sent));
    assert_eq!(downloaded.content_digests, uploaded.content_digests);
    Ok(())
}

#[test]
fn upload_with_wrong_acknowledgement_fails() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("vault.db");
    std::fs::write(&src, catalog_bytes(1000))?;

    let store = MemoryObjectStore::new();
    store.override_put_etag(Some("ffffffffffffffffffffffffffffffff"));
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);
    let err = pipeline.upload_vaultdb(VAULT, 1, &src).unwrap_err();
    assert!(matches!(err, VaultError::IntegrityMismatch { .. }));
    Ok(())
}

#[test]
fn upload_above_single_put_limit_is_refused() -> Result<()> {
    let dir = tempdir()?;
    let src = dir.path().join("vault.db");
    std::fs::write(&src, catalog_bytes(10_000))?;

    let store = MemoryObjectStore::new();
    let options = PipelineOptions {
        segments: SegmentConfig {
            threshold: 16,
            ..SegmentConfig::default()
        },
        ..PipelineOptions::default()
    };
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options);
    let err = pipeline.upload_vaultdb(VAULT, 1, &src).unwrap_err();
    assert!(matches!(err, VaultError::UnsupportedObjectSize { limit: 16, .. }));
    assert_eq!(store.put_count(), 0);
    Ok(())
}

#[test]
fn large_object_is_verified_by_segments() -> Result<()> {
    let dir = tempdir()?;
    let content = noise(6000);
    let packed = gzip(&content);
    let segments = SegmentConfig {
        segment_size: 1024,
        threshold: 2048,
        block_size: 100,
        max_object_size: 1_000_000,
    };
    let expected = split_digest(Cursor::new(&packed), segments.segment_size, segments.block_size)?;
    assert!(expected.segment_digests.len() > 2);

    let store = MemoryObjectStore::new();
    let name = format!("{VAULT}/DB/8");
    store.insert_with_etag(CONTAINER, &name, packed.clone(), &format!("\"{}\"", expected.composite_digest));
    store.set_manifest(CONTAINER, &name, "segments/agent-1/vault/DB/8/");
    for (i, chunk) in packed.chunks(1024).enumerate() {
        store.insert("segments", &format!("agent-1/vault/DB/8/{i:08}"), chunk.to_vec());
    }

    let options = PipelineOptions {
        segments: segments.clone(),
        ..PipelineOptions::default()
    };
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options.clone());
    let dest = dir.path().join("vault.db");
    let db = pipeline.download_vaultdb(VAULT, SnapshotRequest::Exact(8), &dest)?;
    assert_eq!(std::fs::read(&dest)?, content);
    assert_eq!(db.download_digests.map(|d| d.bytes), Some(packed.len() as u64));

    // A plain MD5 ETag does not match the composite
    store.insert_with_etag(CONTAINER, &name, packed.clone(), &md5_hex(&packed));
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options);
    let err = pipeline
        .download_vaultdb(VAULT, SnapshotRequest::Exact(8), &dest)
        .unwrap_err();
    assert!(matches!(err, VaultError::IntegrityMismatch { .. }));
    Ok(())
}

#[test]
fn object_above_ceiling_is_refused() {
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/DB/1"), vec![0u8; 64]);
    let options = PipelineOptions {
        segments: SegmentConfig {
            max_object_size: 63,
            ..SegmentConfig::default()
        },
        ..PipelineOptions::default()
    };
    let pipeline = VaultDbPipeline::new(&store, CONTAINER).with_options(options);
    let err = pipeline
        .download_vaultdb(VAULT, SnapshotRequest::Latest, std::path::Path::new("unused"))
        .unwrap_err();
    assert!(matches!(err, VaultError::UnsupportedObjectSize { size: 64, limit: 63 }));
}

#[test]
fn bundles_are_checked_and_downloaded() -> Result<()> {
    let dir = tempdir()?;
    let data = catalog_bytes(3000);
    let digests = Digests::of(&data);
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/BUNDLES/0000000042"), data.clone());
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);

    let by_md5 = BundleDescriptor::new(42, digests.md5.to_lowercase());
    let by_sha1 = BundleDescriptor::new(42, digests.sha1.to_lowercase());
    pipeline.check_bundle_digest(VAULT, &by_md5)?;
    pipeline.check_bundle_digest(VAULT, &by_sha1)?;

    let dest = dir.path().join("bundle");
    assert_eq!(pipeline.download_bundle(VAULT, &by_sha1, &dest)?, digests);
    assert_eq!(std::fs::read(&dest)?, data);

    let wrong = BundleDescriptor::new(42, "0".repeat(40));
    assert!(matches!(
        pipeline.check_bundle_digest(VAULT, &wrong).unwrap_err(),
        VaultError::IntegrityMismatch { .. }
    ));
    assert!(matches!(
        pipeline.download_bundle(VAULT, &wrong, &dest).unwrap_err(),
        VaultError::IntegrityMismatch { .. }
    ));

    let missing = BundleDescriptor::new(7, digests.md5);
    assert!(matches!(
        pipeline.check_bundle_digest(VAULT, &missing).unwrap_err(),
        VaultError::TransferFailed { status: 404, .. }
    ));
    Ok(())
}

#[test]
fn bundle_with_wrong_digest_is_not_written() -> Result<()> {
    let dir = tempdir()?;
    let data = catalog_bytes(500);
    let store = MemoryObjectStore::new();
    store.insert(CONTAINER, &format!("{VAULT}/BUNDLES/0000000008"), data);
    let pipeline = VaultDbPipeline::new(&store, CONTAINER);

    let dest = dir.path().join("bundle");
    let err = pipeline
        .download_bundle(VAULT, &BundleDescriptor::new(8, "f".repeat(40)), &dest)
        .unwrap_err();
    assert!(matches!(err, VaultError::IntegrityMismatch { .. }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}
